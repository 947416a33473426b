//! Reactions to committed tree changes.
//!
//! Every transaction result flows through [`XponManager::dispatch_changes`]
//! exactly once. This is where an `Enable` write turns into backend
//! traffic or a deferred-enable entry, a password edit reaches the
//! hardware and interface bookkeeping is kept current.

use tracing::debug;
use xpon_dm::catalog::{ObjectId, ENABLE_PARAM, HEX_PASSWORD_PARAM, PASSWORD_PARAM, STATUS_PARAM};
use xpon_dm::path::{ani_path_from_authentication, classify};
use xpon_dm::tree::{Change, ChangeSet};
use xpon_dm::Value;

use crate::manager::{InterfaceState, XponManager};

impl XponManager {
    /// Dispatches one committed change-set.
    ///
    /// Password changes are coalesced per ANI so a transaction touching
    /// both `Password` and `HexadecimalPassword` reaches the backend
    /// once, with the final values.
    pub(crate) async fn dispatch_changes(&mut self, changes: &ChangeSet) {
        let mut password_anis: Vec<String> = Vec::new();
        for change in &changes.changes {
            match change {
                Change::InstanceAdded { path } => {
                    if classify(path).is_some_and(|id| id.is_interface()) {
                        self.iface_state.insert(path.clone(), InterfaceState::new());
                    }
                }
                Change::InstanceRemoved { path } => self.purge_side_state(path),
                Change::ParamChanged { path, name, to, .. } => {
                    self.on_param_changed(path, name, to, &mut password_anis).await;
                }
            }
        }
        for ani_path in password_anis {
            self.apply_password(&ani_path).await;
        }
    }

    async fn on_param_changed(
        &mut self,
        path: &str,
        name: &str,
        to: &Value,
        password_anis: &mut Vec<String>,
    ) {
        let id = match classify(path) {
            Some(id) => id,
            None => return,
        };
        if name == ENABLE_PARAM && matches!(id, ObjectId::Onu | ObjectId::Ani) {
            let enable = to.as_bool().unwrap_or(false);
            if enable && id == ObjectId::Onu {
                debug!("{}: deferring enable", path);
                self.schedule_enable(path);
            } else {
                self.pon_ctrl.set_enable(path, enable).await;
            }
            self.enable_store.set_enabled(path, enable);
            if !enable {
                self.cancel_scheduled_enable(path);
            }
        } else if (name == PASSWORD_PARAM || name == HEX_PASSWORD_PARAM)
            && id == ObjectId::Authentication
        {
            if let Some(ani_path) = ani_path_from_authentication(path) {
                if !password_anis.contains(&ani_path) {
                    password_anis.push(ani_path);
                }
            }
        } else if name == STATUS_PARAM && id.is_interface() {
            self.iface_state
                .insert(path.to_string(), InterfaceState::new());
        }
    }
}
