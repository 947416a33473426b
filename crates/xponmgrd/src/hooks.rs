//! Parameter read hooks.
//!
//! Most parameters are served straight from the schema tree. Two
//! classes are special on read:
//!
//! - `LastChange` on an interface object is computed from the side
//!   table, never stored.
//! - Volatile parameters (every parameter of `ONUActivation`,
//!   `Transceiver` and `TC.Alarms`, plus interface `Status`) are
//!   fetched live from the vendor backend, with the stored value as
//!   fallback when the backend cannot answer.
//!
//! While an instance is being torn down (`ignore_param_reads`) every
//! read is served from the tree, so teardown triggers no backend
//! traffic.

use tracing::{debug, instrument, warn};
use xpon_dm::catalog::{self, ObjectId, LAST_CHANGE_PARAM, STATUS_PARAM};
use xpon_dm::path::{classify, strip_trailing_dot};
use xpon_dm::{DmError, DmResult, Value};

use crate::manager::XponManager;

/// True if reads of this parameter must ask the hardware.
fn is_volatile(id: ObjectId, name: &str) -> bool {
    match id {
        ObjectId::OnuActivation | ObjectId::Transceiver | ObjectId::TcAlarms => true,
        _ => id.is_interface() && name == STATUS_PARAM,
    }
}

impl XponManager {
    /// Reads one parameter value through the hook rules.
    #[instrument(skip(self))]
    pub(crate) async fn get_param(&mut self, path: &str, name: &str) -> DmResult<Value> {
        let path = strip_trailing_dot(path);
        let id = match classify(path) {
            Some(id) => id,
            // Root parameters and uncataloged paths.
            None => return self.stored_param(path, name),
        };
        if self.ignore_param_reads || self.tree.is_template(path) {
            return self.stored_param(path, name);
        }
        if id.is_interface() && name == LAST_CHANGE_PARAM {
            let secs = self
                .iface_state
                .get(path)
                .map(|state| state.last_change.elapsed().as_secs() as u32)
                .unwrap_or(0);
            return Ok(Value::Uint32(secs));
        }
        if is_volatile(id, name) && self.pon_ctrl.is_attached() {
            match self.pon_ctrl.get_param_values(path, &[name]).await {
                Ok(mut values) => match values.remove(name) {
                    Some(value) if Some(value.kind()) == catalog::param_kind(id, name) => {
                        return Ok(value)
                    }
                    Some(value) => warn!(
                        "{}.{}: backend returned kind {:?}, using stored value",
                        path,
                        name,
                        value.kind()
                    ),
                    None => warn!(
                        "{}.{}: backend reply misses the value, using stored value",
                        path, name
                    ),
                },
                Err(e) => debug!(
                    "{}.{}: backend read failed, using stored value: {}",
                    path, name, e
                ),
            }
        }
        self.stored_param(path, name)
    }

    fn stored_param(&self, path: &str, name: &str) -> DmResult<Value> {
        if let Some(value) = self.tree.param(path, name) {
            return Ok(value);
        }
        // Template objects store nothing; serve the declared default.
        if self.tree.is_template(path) {
            if let Some(kind) = classify(path).and_then(|id| catalog::param_kind(id, name)) {
                return Ok(kind.default_value());
            }
        }
        if !self.tree.object_exists(path) {
            return Err(DmError::object_not_found(path));
        }
        Err(DmError::invalid_value(format!(
            "{} has no parameter '{}'",
            path, name
        )))
    }

    /// Drops side state of a removed object and all its descendants.
    pub(crate) fn purge_side_state(&mut self, path: &str) {
        let prefix = format!("{}.", path);
        self.onu_marks.retain(|p| p != path && !p.starts_with(&prefix));
        self.iface_state
            .retain(|p, _| p != path && !p.starts_with(&prefix));
    }
}
