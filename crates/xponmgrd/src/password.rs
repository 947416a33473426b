//! PLOAM password rules and flows.
//!
//! A password reaches the daemon through the `Password` parameter of an
//! ANI's `TC.Authentication` object. After the change is committed to
//! the tree, the apply path validates it against the PON mode of the
//! ANI; only a valid password is forwarded to the vendor backend and
//! saved to the upgrade-persistent store. When an ANI instance is
//! created, any saved password is replayed through the regular
//! object-changed path so validation and forwarding run exactly as for
//! a fresh one.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, error, warn};

use xpon_dm::catalog::{HEX_PASSWORD_PARAM, PASSWORD_PARAM};
use xpon_dm::{path, DmError, DmResult, Value};

use crate::manager::XponManager;
use crate::pon_ctrl::InstanceArgs;

/// Longest ASCII password on a G-PON link.
pub const MAX_GPON_PASSWORD_LEN: usize = 10;

/// Longest ASCII password on the higher speed PON modes.
pub const MAX_XPON_PASSWORD_LEN: usize = 36;

/// PON operating mode of an ANI, as carried in its `PONMode` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PonMode {
    Unknown,
    Gpon,
    XgPon,
    NgPon2,
    XgsPon,
}

impl PonMode {
    /// Parses the data-model representation of a PON mode. Anything
    /// unrecognized reads as `Unknown`.
    pub fn from_dm(value: &str) -> PonMode {
        match value {
            "G-PON" => PonMode::Gpon,
            "XG-PON" => PonMode::XgPon,
            "NG-PON2" => PonMode::NgPon2,
            "XGS-PON" => PonMode::XgsPon,
            _ => PonMode::Unknown,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            PonMode::Unknown => "Unknown",
            PonMode::Gpon => "G-PON",
            PonMode::XgPon => "XG-PON",
            PonMode::NgPon2 => "NG-PON2",
            PonMode::XgsPon => "XGS-PON",
        }
    }

    fn max_ascii_len(self) -> usize {
        match self {
            PonMode::Gpon => MAX_GPON_PASSWORD_LEN,
            _ => MAX_XPON_PASSWORD_LEN,
        }
    }
}

impl fmt::Display for PonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates a password against the rules of a PON mode.
///
/// An empty password is always valid (it clears the stored one).
/// Hexadecimal passwords must consist of hex digits, have even length,
/// and match the mode's password size exactly. ASCII passwords may be
/// any length up to the mode's maximum.
pub fn check_password(password: &str, is_hex: bool, mode: PonMode) -> DmResult<()> {
    if password.is_empty() {
        return Ok(());
    }

    if is_hex {
        if password.len() % 2 != 0 {
            return Err(DmError::invalid_value(format!(
                "hex password has odd length {}",
                password.len()
            )));
        }
        if !password.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DmError::invalid_value(
                "hex password contains non-hex characters",
            ));
        }
    }

    if mode == PonMode::Unknown {
        return Err(DmError::invalid_value("PON mode is Unknown"));
    }

    let max_len = mode.max_ascii_len();
    if is_hex {
        let expected = 2 * max_len;
        if password.len() != expected {
            return Err(DmError::invalid_value(format!(
                "hex password on {} must be exactly {} digits, got {}",
                mode,
                expected,
                password.len()
            )));
        }
    } else if password.len() > max_len {
        return Err(DmError::invalid_value(format!(
            "password on {} is limited to {} characters, got {}",
            mode,
            max_len,
            password.len()
        )));
    }
    Ok(())
}

impl XponManager {
    /// Validates, forwards and persists the current password of an ANI.
    ///
    /// Runs after the `Password` or `HexadecimalPassword` parameter
    /// changed. An invalid password is logged and goes nowhere: the
    /// tree keeps the written value, hardware and the store keep the
    /// last valid one.
    pub(crate) async fn apply_password(&mut self, ani_path: &str) {
        let auth_path = path::authentication_path(ani_path);
        let Some(password) = self
            .tree
            .param(&auth_path, PASSWORD_PARAM)
            .and_then(|v| v.as_str().map(str::to_string))
        else {
            warn!("{}: cannot read password", auth_path);
            return;
        };

        let is_hex = if password.is_empty() {
            false
        } else {
            match self.is_hex_password(ani_path) {
                Ok(is_hex) => is_hex,
                Err(e) => {
                    warn!("{}: cannot determine password form: {}", ani_path, e);
                    return;
                }
            }
        };

        if !password.is_empty() {
            let mode = match self.ani_pon_mode(ani_path) {
                Ok(mode) => mode,
                Err(e) => {
                    warn!("{}: cannot determine PON mode: {}", ani_path, e);
                    return;
                }
            };
            if let Err(e) = check_password(&password, is_hex, mode) {
                error!("{}: invalid password, not forwarded: {}", ani_path, e);
                return;
            }
        }

        self.pon_ctrl.set_password(ani_path, &password, is_hex).await;
        // A failed save is logged by the store; the hardware already
        // has the password.
        self.password_store.set_password(ani_path, &password, is_hex);
    }

    /// Replays a saved password when an ANI instance appears.
    pub(crate) async fn restore_password(&mut self, ani_path: &str) {
        let Some((password, is_hex)) = self.password_store.get_password(ani_path) else {
            return;
        };
        debug!("{}: restoring saved password", ani_path);

        let mut parameters = BTreeMap::new();
        parameters.insert(PASSWORD_PARAM.to_string(), Value::String(password));
        if is_hex {
            parameters.insert(HEX_PASSWORD_PARAM.to_string(), Value::Bool(true));
        }
        let args = InstanceArgs {
            path: Some(path::authentication_path(ani_path)),
            parameters: Some(parameters),
            ..Default::default()
        };
        if let Err(e) = self.change_object(args).await {
            error!("{}: failed to restore saved password: {}", ani_path, e);
        }
    }
}
