//! Instance operations on the schema tree.
//!
//! These are the operations behind the backend callback surface:
//! validate the raw [`InstanceArgs`], run one transaction against the
//! tree and hand the committed change-set to the event dispatcher.
//! Parameter values travel best-effort (unknown or ill-typed entries
//! are skipped with a log), structural problems fail the whole
//! operation before anything is touched.

use std::collections::BTreeMap;

use tracing::{error, info, instrument, warn};
use xpon_dm::catalog::{self, ObjectId, ENABLE_PARAM, HEX_PASSWORD_PARAM, PON_MODE_PARAM, STATUS_PARAM};
use xpon_dm::path::{self, classify, strip_trailing_dot};
use xpon_dm::tree::{FSM_STATE_PARAM, ROOT_NAME};
use xpon_dm::{DmError, DmResult, Transaction, Value};

use crate::manager::XponManager;
use crate::password::PonMode;
use crate::pon_ctrl::{InstanceArgs, RootParameterArgs};
use crate::tables::{STATUS_DOWN, STATUS_UP};

/// Validated arguments of an instance add or remove.
#[derive(Debug)]
struct InstanceRequest {
    path: String,
    index: u32,
    keys: BTreeMap<String, Value>,
    parameters: BTreeMap<String, Value>,
}

impl InstanceRequest {
    fn from_args(args: InstanceArgs) -> DmResult<Self> {
        let path = match args.path.as_deref() {
            Some(p) if !p.is_empty() => strip_trailing_dot(p).to_string(),
            _ => return Err(DmError::missing_field("path")),
        };
        let index = match args.index {
            Some(index) if index != 0 => index,
            _ => return Err(DmError::missing_field("index")),
        };
        Ok(Self {
            path,
            index,
            keys: args.keys.unwrap_or_default(),
            parameters: args.parameters.unwrap_or_default(),
        })
    }
}

/// Validated arguments of an object update.
#[derive(Debug)]
struct ChangeRequest {
    path: String,
    /// Set when the target is a template instance rather than a
    /// singleton.
    index: Option<u32>,
    parameters: BTreeMap<String, Value>,
}

impl ChangeRequest {
    fn from_args(args: InstanceArgs) -> DmResult<Self> {
        let path = match args.path.as_deref() {
            Some(p) if !p.is_empty() => strip_trailing_dot(p).to_string(),
            _ => return Err(DmError::missing_field("path")),
        };
        let parameters = args
            .parameters
            .ok_or_else(|| DmError::missing_field("parameters"))?;
        Ok(Self {
            path,
            index: args.index.filter(|index| *index != 0),
            parameters,
        })
    }
}

/// Adds the well-formed subset of `parameters` to the transaction.
///
/// Names the object type does not declare and values of the wrong kind
/// are logged and skipped; the caller's operation proceeds with the
/// rest.
fn set_parameters(txn: &mut Transaction, id: ObjectId, parameters: &BTreeMap<String, Value>) {
    let type_name = catalog::info(id).name;
    for (name, value) in parameters {
        match catalog::param_kind(id, name) {
            None => warn!("{} has no parameter '{}', skipping", type_name, name),
            Some(kind) if kind != value.kind() => error!(
                "{}.{}: kind {:?} != expected {:?}, skipping",
                type_name,
                name,
                value.kind(),
                kind
            ),
            Some(_) => {
                txn.set_param(name, value.clone());
            }
        }
    }
}

impl XponManager {
    /// Creates a template instance reported by the hardware.
    #[instrument(skip(self, args))]
    pub(crate) async fn add_instance(&mut self, args: InstanceArgs) -> DmResult<()> {
        let req = InstanceRequest::from_args(args)?;
        let id = classify(&req.path).ok_or_else(|| DmError::unknown_object(&req.path))?;
        let info = catalog::info(id);
        let key_name = info
            .key_name
            .ok_or_else(|| DmError::invalid_value(format!("{} is not a template", req.path)))?;
        if !self.tree.is_template(&req.path) {
            return Err(DmError::object_not_found(&req.path));
        }
        if self.tree.instance_exists(&req.path, req.index) {
            return Err(DmError::InstanceExists {
                path: req.path.clone(),
                index: req.index,
            });
        }
        let key_value = req
            .keys
            .get(key_name)
            .cloned()
            .ok_or_else(|| DmError::missing_field(key_name))?;
        if let Some(max) = info.key_max_value {
            let value = key_value.as_u32().ok_or_else(|| {
                DmError::invalid_value(format!("key '{}' must be numeric", key_name))
            })?;
            if value > max {
                return Err(DmError::KeyOutOfRange {
                    name: key_name.to_string(),
                    value,
                    max,
                });
            }
        } else if key_value.as_str().is_none() {
            return Err(DmError::invalid_value(format!(
                "key '{}' must be a string",
                key_name
            )));
        }

        let concrete = path::instance_path(&req.path, req.index);
        let mut txn = Transaction::new();
        txn.select(&req.path)
            .add_instance_with_key(req.index, key_name, key_value);
        set_parameters(&mut txn, id, &req.parameters);
        let persisted_enable = info.has_rw_enable && self.enable_store.is_enabled(&concrete);
        if persisted_enable {
            txn.set_param(ENABLE_PARAM, Value::Bool(true));
        }
        let changes = txn.apply(&mut self.tree)?;
        info!("{}: instance added", concrete);
        self.dispatch_changes(&changes).await;

        if id == ObjectId::Onu {
            self.onu_marks.insert(concrete.clone());
        }
        // Values set while adding are initial and not part of the
        // change-set, so a persisted enable is handed on explicitly.
        if persisted_enable {
            if id == ObjectId::Onu {
                self.schedule_enable(&concrete);
            } else {
                self.pon_ctrl.set_enable(&concrete, true).await;
            }
        }
        if id == ObjectId::Ani {
            self.restore_password(&concrete).await;
        }
        Ok(())
    }

    /// Removes a template instance. Removing what is not there is a
    /// warned no-op.
    #[instrument(skip(self, args))]
    pub(crate) async fn remove_instance(&mut self, args: InstanceArgs) -> DmResult<()> {
        let req = InstanceRequest::from_args(args)?;
        let id = classify(&req.path).ok_or_else(|| DmError::unknown_object(&req.path))?;
        if catalog::info(id).key_name.is_none() {
            return Err(DmError::invalid_value(format!(
                "{} is not a template",
                req.path
            )));
        }
        if !self.tree.instance_exists(&req.path, req.index) {
            warn!("{}.{}: instance already absent", req.path, req.index);
            return Ok(());
        }

        let concrete = path::instance_path(&req.path, req.index);
        let mut txn = Transaction::new();
        txn.select(&req.path).del_instance(req.index);
        self.ignore_param_reads = true;
        let result = txn.apply(&mut self.tree);
        self.ignore_param_reads = false;
        let changes = result?;
        info!("{}: instance removed", concrete);
        self.dispatch_changes(&changes).await;
        Ok(())
    }

    /// Updates parameters of an existing object. A missing target is a
    /// warned no-op.
    #[instrument(skip(self, args))]
    pub(crate) async fn change_object(&mut self, args: InstanceArgs) -> DmResult<()> {
        let req = ChangeRequest::from_args(args)?;
        let concrete = match req.index {
            Some(index) => path::instance_path(&req.path, index),
            None => req.path.clone(),
        };
        let id = classify(&concrete).ok_or_else(|| DmError::unknown_object(&concrete))?;
        if !self.tree.object_exists(&concrete) || self.tree.is_template(&concrete) {
            warn!("{}: no such object, ignoring change", concrete);
            return Ok(());
        }

        let mut txn = Transaction::new();
        txn.select(&concrete);
        set_parameters(&mut txn, id, &req.parameters);
        // The first update of an ONU this daemon did not create runs
        // the persisted-enable check, exactly once per instance.
        let first_onu_contact = id == ObjectId::Onu && !self.onu_marks.contains(&concrete);
        if first_onu_contact && self.enable_store.is_enabled(&concrete) {
            txn.set_param(ENABLE_PARAM, Value::Bool(true));
        }
        let changes = txn.apply(&mut self.tree)?;
        if first_onu_contact {
            self.onu_marks.insert(concrete.clone());
        }
        self.dispatch_changes(&changes).await;
        Ok(())
    }

    /// Creates or updates an instance, whichever applies.
    #[instrument(skip(self, args))]
    pub(crate) async fn add_or_change_instance(&mut self, args: InstanceArgs) -> DmResult<()> {
        let template = match args.path.as_deref() {
            Some(p) if !p.is_empty() => strip_trailing_dot(p).to_string(),
            _ => return Err(DmError::missing_field("path")),
        };
        let index = match args.index {
            Some(index) if index != 0 => index,
            _ => return Err(DmError::missing_field("index")),
        };
        if self.tree.instance_exists(&template, index) {
            self.change_object(args).await
        } else {
            self.add_instance(args).await
        }
    }

    /// Reacts to an OMCI MIB reset of one ONU: interfaces report Down,
    /// GEM ports disappear.
    #[instrument(skip(self))]
    pub(crate) async fn reset_mib(&mut self, index: Option<u32>) -> DmResult<()> {
        let index = match index {
            Some(index) if index != 0 => index,
            _ => return Err(DmError::missing_field("index")),
        };
        let onu_template = catalog::info(ObjectId::Onu).generic_path;
        let onu_path = path::instance_path(onu_template, index);
        if !self.tree.instance_exists(onu_template, index) {
            warn!("{}: no such ONU, ignoring MIB reset", onu_path);
            return Ok(());
        }
        info!("{}: OMCI MIB reset", onu_path);

        let uni_template = format!("{}.EthernetUNI", onu_path);
        for uni_index in self.tree.instance_indexes(&uni_template) {
            let uni_path = path::instance_path(&uni_template, uni_index);
            let status = self.tree.param(&uni_path, STATUS_PARAM);
            if status.as_ref().and_then(|v| v.as_str()) != Some(STATUS_UP) {
                continue;
            }
            let mut txn = Transaction::new();
            txn.select(&uni_path)
                .set_param(STATUS_PARAM, Value::from(STATUS_DOWN));
            match txn.apply(&mut self.tree) {
                Ok(changes) => self.dispatch_changes(&changes).await,
                Err(e) => error!("{}: cannot mark interface down: {}", uni_path, e),
            }
        }

        let ani_template = format!("{}.ANI", onu_path);
        for ani_index in self.tree.instance_indexes(&ani_template) {
            let gem_template = format!(
                "{}.TC.GEM.Port",
                path::instance_path(&ani_template, ani_index)
            );
            for gem_index in self.tree.instance_indexes(&gem_template) {
                let args = InstanceArgs {
                    path: Some(gem_template.clone()),
                    index: Some(gem_index),
                    ..Default::default()
                };
                if let Err(e) = self.remove_instance(args).await {
                    error!("{}.{}: cannot remove GEM port: {}", gem_template, gem_index, e);
                }
            }
        }
        Ok(())
    }

    /// Updates one parameter on the schema root.
    ///
    /// `FsmState` is the only parameter the backend may write this way.
    #[instrument(skip(self, args))]
    pub(crate) async fn set_schema_parameter(&mut self, args: RootParameterArgs) -> DmResult<()> {
        let name = match args.name {
            Some(name) if !name.is_empty() => name,
            _ => return Err(DmError::missing_field("name")),
        };
        let value = args.value.ok_or_else(|| DmError::missing_field("value"))?;
        if name != FSM_STATE_PARAM {
            warn!("schema parameter '{}' is not writable by the backend", name);
            return Err(DmError::invalid_value(format!(
                "parameter '{}' is not writable",
                name
            )));
        }
        let mut txn = Transaction::new();
        txn.select(ROOT_NAME).set_param(&name, value);
        let changes = txn.apply(&mut self.tree)?;
        self.dispatch_changes(&changes).await;
        Ok(())
    }

    /// True if the ANI's password is flagged hexadecimal.
    pub(crate) fn is_hex_password(&self, ani_path: &str) -> DmResult<bool> {
        let auth_path = path::authentication_path(ani_path);
        self.tree
            .param(&auth_path, HEX_PASSWORD_PARAM)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| DmError::object_not_found(auth_path))
    }

    /// PON mode of an ANI, parsed from its `PONMode` parameter.
    pub(crate) fn ani_pon_mode(&self, ani_path: &str) -> DmResult<PonMode> {
        let value = self
            .tree
            .param(ani_path, PON_MODE_PARAM)
            .ok_or_else(|| DmError::object_not_found(ani_path))?;
        let text = value
            .as_str()
            .ok_or_else(|| DmError::invalid_value("PONMode is not a string"))?;
        Ok(PonMode::from_dm(text))
    }

    pub(crate) fn nr_of_ethernet_unis(&self, onu_path: &str) -> u32 {
        self.tree.instance_count(&format!("{}.EthernetUNI", onu_path))
    }

    pub(crate) fn nr_of_anis(&self, onu_path: &str) -> u32 {
        self.tree.instance_count(&format!("{}.ANI", onu_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pon_ctrl::mock::{MockBackend, MockState};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn attach_mock(mgr: &mut XponManager) -> Arc<Mutex<MockState>> {
        let backend = MockBackend::new();
        let handle = backend.handle();
        mgr.pon_ctrl.attach("mock".to_string(), Box::new(backend));
        handle
    }

    fn manager_with_store(dir: &TempDir) -> XponManager {
        let config = Config {
            reboot_persist_dir: Some(dir.path().to_path_buf()),
            upgrade_persist_dir: None,
            ..Config::default()
        };
        XponManager::new(config).unwrap()
    }

    fn onu_args(index: u32, name: &str) -> InstanceArgs {
        let mut keys = BTreeMap::new();
        keys.insert("Name".to_string(), Value::from(name));
        InstanceArgs {
            path: Some("XPON.ONU".to_string()),
            index: Some(index),
            keys: Some(keys),
            ..Default::default()
        }
    }

    fn child_args(template: &str, index: u32, name: &str) -> InstanceArgs {
        let mut keys = BTreeMap::new();
        keys.insert("Name".to_string(), Value::from(name));
        InstanceArgs {
            path: Some(template.to_string()),
            index: Some(index),
            keys: Some(keys),
            ..Default::default()
        }
    }

    async fn add_onu_with_ani(mgr: &mut XponManager) {
        mgr.add_instance(onu_args(1, "onu1")).await.unwrap();
        mgr.add_instance(child_args("XPON.ONU.1.ANI", 1, "ani1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_add_instance_materializes_subtree() {
        let mut mgr = XponManager::for_tests();
        mgr.add_instance(onu_args(1, "onu1")).await.unwrap();
        assert!(mgr.tree.instance_exists("XPON.ONU", 1));
        assert!(mgr.tree.is_template("XPON.ONU.1.ANI"));
        assert_eq!(
            mgr.tree.param("XPON.ONU.1", "Name"),
            Some(Value::from("onu1"))
        );
        assert!(mgr.onu_marks.contains("XPON.ONU.1"));
    }

    #[tokio::test]
    async fn test_add_instance_argument_validation() {
        let mut mgr = XponManager::for_tests();
        let err = mgr
            .add_instance(InstanceArgs::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DmError::MissingField { .. }));

        let mut args = onu_args(1, "onu1");
        args.index = Some(0);
        let err = mgr.add_instance(args).await.unwrap_err();
        assert!(matches!(err, DmError::MissingField { .. }));

        let mut args = onu_args(1, "onu1");
        args.path = Some("XPON.Widget".to_string());
        let err = mgr.add_instance(args).await.unwrap_err();
        assert!(matches!(err, DmError::UnknownObject { .. }));

        let mut args = onu_args(1, "onu1");
        args.keys = None;
        let err = mgr.add_instance(args).await.unwrap_err();
        assert!(matches!(err, DmError::MissingField { .. }));
    }

    #[tokio::test]
    async fn test_add_instance_rejects_duplicates() {
        let mut mgr = XponManager::for_tests();
        mgr.add_instance(onu_args(1, "onu1")).await.unwrap();
        let err = mgr.add_instance(onu_args(1, "again")).await.unwrap_err();
        assert!(matches!(err, DmError::InstanceExists { .. }));
    }

    #[tokio::test]
    async fn test_numeric_key_bound_is_inclusive() {
        let mut mgr = XponManager::for_tests();
        add_onu_with_ani(&mut mgr).await;
        let gem_template = "XPON.ONU.1.ANI.1.TC.GEM.Port";

        let mut keys = BTreeMap::new();
        keys.insert("PortID".to_string(), Value::Uint32(65534));
        mgr.add_instance(InstanceArgs {
            path: Some(gem_template.to_string()),
            index: Some(1),
            keys: Some(keys),
            ..Default::default()
        })
        .await
        .unwrap();

        let mut keys = BTreeMap::new();
        keys.insert("PortID".to_string(), Value::Uint32(65535));
        let err = mgr
            .add_instance(InstanceArgs {
                path: Some(gem_template.to_string()),
                index: Some(2),
                keys: Some(keys),
                ..Default::default()
            })
            .await
            .unwrap_err();
        match err {
            DmError::KeyOutOfRange { name, value, max } => {
                assert_eq!(name, "PortID");
                assert_eq!(value, 65535);
                assert_eq!(max, 65534);
            }
            other => panic!("expected KeyOutOfRange, got {other:?}"),
        }
        assert!(!mgr.tree.instance_exists(gem_template, 2));
    }

    #[tokio::test]
    async fn test_parameters_are_best_effort() {
        let mut mgr = XponManager::for_tests();
        let mut args = onu_args(1, "onu1");
        let mut parameters = BTreeMap::new();
        parameters.insert("Version".to_string(), Value::from("v7"));
        parameters.insert("Bogus".to_string(), Value::from("x"));
        parameters.insert("Enable".to_string(), Value::from("not a bool"));
        args.parameters = Some(parameters);

        mgr.add_instance(args).await.unwrap();

        assert_eq!(
            mgr.tree.param("XPON.ONU.1", "Version"),
            Some(Value::from("v7"))
        );
        // The ill-typed Enable was skipped, not applied.
        assert_eq!(
            mgr.tree.param("XPON.ONU.1", "Enable"),
            Some(Value::Bool(false))
        );
    }

    #[tokio::test]
    async fn test_remove_instance_is_idempotent() {
        let mut mgr = XponManager::for_tests();
        mgr.add_instance(onu_args(1, "onu1")).await.unwrap();

        let args = InstanceArgs {
            path: Some("XPON.ONU".to_string()),
            index: Some(1),
            ..Default::default()
        };
        mgr.remove_instance(args.clone()).await.unwrap();
        assert!(!mgr.tree.instance_exists("XPON.ONU", 1));
        // Once more: already absent, still Ok.
        mgr.remove_instance(args).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_instance_purges_side_state() {
        let mut mgr = XponManager::for_tests();
        add_onu_with_ani(&mut mgr).await;
        assert!(mgr.iface_state.contains_key("XPON.ONU.1.ANI.1"));

        mgr.remove_instance(InstanceArgs {
            path: Some("XPON.ONU".to_string()),
            index: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();

        assert!(mgr.onu_marks.is_empty());
        assert!(mgr.iface_state.is_empty());
        assert!(!mgr.ignore_param_reads);
    }

    #[tokio::test]
    async fn test_change_object_updates_parameters() {
        let mut mgr = XponManager::for_tests();
        mgr.add_instance(onu_args(1, "onu1")).await.unwrap();

        let mut parameters = BTreeMap::new();
        parameters.insert("Version".to_string(), Value::from("v2"));
        mgr.change_object(InstanceArgs {
            path: Some("XPON.ONU".to_string()),
            index: Some(1),
            parameters: Some(parameters),
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(
            mgr.tree.param("XPON.ONU.1", "Version"),
            Some(Value::from("v2"))
        );
    }

    #[tokio::test]
    async fn test_change_object_on_absent_target_is_benign() {
        let mut mgr = XponManager::for_tests();
        mgr.change_object(InstanceArgs {
            path: Some("XPON.ONU".to_string()),
            index: Some(3),
            parameters: Some(BTreeMap::new()),
            ..Default::default()
        })
        .await
        .unwrap();

        // Template path without an index is equally benign.
        mgr.change_object(InstanceArgs {
            path: Some("XPON.ONU".to_string()),
            parameters: Some(BTreeMap::new()),
            ..Default::default()
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_change_object_requires_parameters() {
        let mut mgr = XponManager::for_tests();
        let err = mgr
            .change_object(InstanceArgs {
                path: Some("XPON.ONU".to_string()),
                index: Some(1),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DmError::MissingField { .. }));
    }

    #[tokio::test]
    async fn test_first_onu_contact_runs_persisted_enable_check() {
        let dir = TempDir::new().unwrap();
        let mut mgr = manager_with_store(&dir);
        mgr.add_instance(onu_args(1, "onu1")).await.unwrap();
        mgr.enable_store.set_enabled("XPON.ONU.1", true);
        // Simulate an ONU this daemon has not touched yet.
        mgr.onu_marks.clear();

        let mut parameters = BTreeMap::new();
        parameters.insert("Version".to_string(), Value::from("v2"));
        mgr.change_object(InstanceArgs {
            path: Some("XPON.ONU".to_string()),
            index: Some(1),
            parameters: Some(parameters),
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(
            mgr.tree.param("XPON.ONU.1", "Enable"),
            Some(Value::Bool(true))
        );
        assert!(mgr.onu_marks.contains("XPON.ONU.1"));
        // The enable flowed into the deferred queue via dispatch.
        assert!(!mgr.enable_sched.is_empty());

        // A second change must not re-run the check.
        let mut txn = Transaction::new();
        txn.select("XPON.ONU.1")
            .set_param(ENABLE_PARAM, Value::Bool(false));
        txn.apply(&mut mgr.tree).unwrap();
        let mut parameters = BTreeMap::new();
        parameters.insert("Version".to_string(), Value::from("v3"));
        mgr.change_object(InstanceArgs {
            path: Some("XPON.ONU".to_string()),
            index: Some(1),
            parameters: Some(parameters),
            ..Default::default()
        })
        .await
        .unwrap();
        assert_eq!(
            mgr.tree.param("XPON.ONU.1", "Enable"),
            Some(Value::Bool(false))
        );
    }

    #[tokio::test]
    async fn test_add_with_persisted_enable_defers_the_onu() {
        let dir = TempDir::new().unwrap();
        let mut mgr = manager_with_store(&dir);
        attach_mock(&mut mgr);
        mgr.enable_store.set_enabled("XPON.ONU.1", true);

        mgr.add_instance(onu_args(1, "onu1")).await.unwrap();

        assert_eq!(
            mgr.tree.param("XPON.ONU.1", "Enable"),
            Some(Value::Bool(true))
        );
        assert!(!mgr.enable_sched.is_empty());
    }

    #[tokio::test]
    async fn test_add_or_change_converges() {
        let mut mgr = XponManager::for_tests();
        let mut args = onu_args(1, "onu1");
        let mut parameters = BTreeMap::new();
        parameters.insert("Version".to_string(), Value::from("v1"));
        args.parameters = Some(parameters);

        mgr.add_or_change_instance(args.clone()).await.unwrap();
        let mut args2 = args.clone();
        args2
            .parameters
            .as_mut()
            .unwrap()
            .insert("Version".to_string(), Value::from("v2"));
        mgr.add_or_change_instance(args2).await.unwrap();

        assert_eq!(mgr.tree.instance_indexes("XPON.ONU"), vec![1]);
        assert_eq!(
            mgr.tree.param("XPON.ONU.1", "Version"),
            Some(Value::from("v2"))
        );
    }

    #[tokio::test]
    async fn test_reset_mib_downs_interfaces_and_drops_gem_ports() {
        let mut mgr = XponManager::for_tests();
        add_onu_with_ani(&mut mgr).await;
        mgr.add_instance(child_args("XPON.ONU.1.EthernetUNI", 1, "uni1"))
            .await
            .unwrap();
        let mut keys = BTreeMap::new();
        keys.insert("PortID".to_string(), Value::Uint32(100));
        mgr.add_instance(InstanceArgs {
            path: Some("XPON.ONU.1.ANI.1.TC.GEM.Port".to_string()),
            index: Some(1),
            keys: Some(keys),
            ..Default::default()
        })
        .await
        .unwrap();
        let mut txn = Transaction::new();
        txn.select("XPON.ONU.1.EthernetUNI.1")
            .set_param(STATUS_PARAM, Value::from(STATUS_UP));
        txn.apply(&mut mgr.tree).unwrap();

        mgr.reset_mib(Some(1)).await.unwrap();

        assert_eq!(
            mgr.tree.param("XPON.ONU.1.EthernetUNI.1", "Status"),
            Some(Value::from(STATUS_DOWN))
        );
        assert!(mgr
            .tree
            .instance_indexes("XPON.ONU.1.ANI.1.TC.GEM.Port")
            .is_empty());
        // The ONU and its interfaces survive the reset.
        assert!(mgr.tree.instance_exists("XPON.ONU", 1));
        assert!(mgr.tree.instance_exists("XPON.ONU.1.EthernetUNI", 1));
    }

    #[tokio::test]
    async fn test_reset_mib_on_missing_onu_is_benign() {
        let mut mgr = XponManager::for_tests();
        mgr.reset_mib(Some(2)).await.unwrap();
        let err = mgr.reset_mib(None).await.unwrap_err();
        assert!(matches!(err, DmError::MissingField { .. }));
        let err = mgr.reset_mib(Some(0)).await.unwrap_err();
        assert!(matches!(err, DmError::MissingField { .. }));
    }

    #[tokio::test]
    async fn test_set_schema_parameter_accepts_fsm_state_only() {
        let mut mgr = XponManager::for_tests();
        mgr.set_schema_parameter(RootParameterArgs {
            name: Some("FsmState".to_string()),
            value: Some(Value::from("O5")),
        })
        .await
        .unwrap();
        assert_eq!(mgr.tree.param("XPON", "FsmState"), Some(Value::from("O5")));

        let err = mgr
            .set_schema_parameter(RootParameterArgs {
                name: Some("ModuleName".to_string()),
                value: Some(Value::from("evil")),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DmError::InvalidValue { .. }));

        let err = mgr
            .set_schema_parameter(RootParameterArgs {
                name: Some("FsmState".to_string()),
                value: Some(Value::Bool(true)),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DmError::Transaction { .. }));
    }

    #[tokio::test]
    async fn test_ani_helpers() {
        let mut mgr = XponManager::for_tests();
        add_onu_with_ani(&mut mgr).await;

        assert!(!mgr.is_hex_password("XPON.ONU.1.ANI.1").unwrap());
        assert_eq!(mgr.ani_pon_mode("XPON.ONU.1.ANI.1").unwrap(), PonMode::Unknown);

        let mut txn = Transaction::new();
        txn.select("XPON.ONU.1.ANI.1")
            .set_param(PON_MODE_PARAM, Value::from("G-PON"));
        txn.select("XPON.ONU.1.ANI.1.TC.Authentication")
            .set_param(HEX_PASSWORD_PARAM, Value::Bool(true));
        txn.apply(&mut mgr.tree).unwrap();

        assert!(mgr.is_hex_password("XPON.ONU.1.ANI.1").unwrap());
        assert_eq!(mgr.ani_pon_mode("XPON.ONU.1.ANI.1").unwrap(), PonMode::Gpon);

        assert_eq!(mgr.nr_of_ethernet_unis("XPON.ONU.1"), 0);
        assert_eq!(mgr.nr_of_anis("XPON.ONU.1"), 1);
    }

    #[tokio::test]
    async fn test_ani_add_restores_saved_password() {
        let dir = TempDir::new().unwrap();
        let mut mgr = manager_with_store(&dir);
        let handle = attach_mock(&mut mgr);
        mgr.password_store
            .set_password("XPON.ONU.1.ANI.1", "secret", false);

        mgr.add_instance(onu_args(1, "onu1")).await.unwrap();
        let mut args = child_args("XPON.ONU.1.ANI", 1, "ani1");
        let mut parameters = BTreeMap::new();
        parameters.insert(PON_MODE_PARAM.to_string(), Value::from("G-PON"));
        args.parameters = Some(parameters);
        mgr.add_instance(args).await.unwrap();

        assert_eq!(
            mgr.tree
                .param("XPON.ONU.1.ANI.1.TC.Authentication", "Password"),
            Some(Value::from("secret"))
        );
        let passwords = handle.lock().unwrap().password_calls();
        assert_eq!(
            passwords,
            vec![("XPON.ONU.1.ANI.1".to_string(), "secret".to_string(), false)]
        );
    }

    #[tokio::test]
    async fn test_onu_lifecycle_end_to_end() {
        let mut mgr = XponManager::for_tests();
        let handle = attach_mock(&mut mgr);

        mgr.add_instance(onu_args(1, "onu1")).await.unwrap();
        mgr.add_instance(child_args("XPON.ONU.1.EthernetUNI", 1, "uni1"))
            .await
            .unwrap();
        let mut args = child_args("XPON.ONU.1.ANI", 1, "ani1");
        let mut parameters = BTreeMap::new();
        parameters.insert(PON_MODE_PARAM.to_string(), Value::from("G-PON"));
        args.parameters = Some(parameters);
        mgr.add_instance(args).await.unwrap();

        // Operator enables the ONU: deferred, then released by the tick.
        let mut parameters = BTreeMap::new();
        parameters.insert(ENABLE_PARAM.to_string(), Value::Bool(true));
        mgr.change_object(InstanceArgs {
            path: Some("XPON.ONU".to_string()),
            index: Some(1),
            parameters: Some(parameters),
            ..Default::default()
        })
        .await
        .unwrap();
        assert!(!mgr.enable_sched.is_empty());
        mgr.enable_tick().await;
        assert_eq!(
            handle.lock().unwrap().enable_calls(),
            vec![("XPON.ONU.1".to_string(), true)]
        );

        mgr.remove_instance(InstanceArgs {
            path: Some("XPON.ONU".to_string()),
            index: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
        assert!(!mgr.tree.instance_exists("XPON.ONU", 1));
        assert!(mgr.onu_marks.is_empty());
        assert!(mgr.iface_state.is_empty());
    }
}
