//! Daemon state and startup.
//!
//! [`XponManager`] owns everything the daemon mutates: the schema tree,
//! the backend gateway, the persistence stores, the deferred-enable
//! queue and the discovery queue. The instance operations, the change
//! dispatcher and the timer ticks live in sibling modules as further
//! `impl XponManager` blocks, so each concern stays in its own file
//! while the state stays in one place.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tracing::{error, info, instrument, warn};
use xpon_dm::tree::{MODULE_ERROR_PARAM, MODULE_NAME_PARAM, MODULE_VERSION_PARAM, ROOT_NAME};
use xpon_dm::{catalog, DmResult, SchemaTree, Transaction, Value};

use crate::config::Config;
use crate::discovery::Discovery;
use crate::enable::EnableScheduler;
use crate::module::BackendRegistry;
use crate::persist::{EnableStore, PasswordStore};
use crate::pon_ctrl::PonCtrl;

/// Runtime side state of one interface object (EthernetUNI or ANI
/// instance).
#[derive(Debug, Clone)]
pub(crate) struct InterfaceState {
    /// When `Status` last changed. `LastChange` reads report the
    /// seconds elapsed since this point.
    pub(crate) last_change: Instant,
}

impl InterfaceState {
    pub(crate) fn new() -> Self {
        Self {
            last_change: Instant::now(),
        }
    }
}

/// The daemon's application state.
pub struct XponManager {
    pub(crate) config: Config,
    pub(crate) tree: SchemaTree,
    pub(crate) pon_ctrl: PonCtrl,
    pub(crate) enable_store: EnableStore,
    pub(crate) password_store: PasswordStore,
    /// ONU instances whose persisted-enable check already ran. At most
    /// one entry per ONU instance lifetime.
    pub(crate) onu_marks: HashSet<String>,
    /// Per interface instance: Status change bookkeeping.
    pub(crate) iface_state: HashMap<String, InterfaceState>,
    pub(crate) enable_sched: EnableScheduler,
    pub(crate) discovery: Discovery,
    /// Suppresses volatile parameter reads while an instance is being
    /// torn down.
    pub(crate) ignore_param_reads: bool,
}

impl XponManager {
    /// Builds the manager: catalog self-check, empty tree, stores.
    ///
    /// The vendor backend is attached later by [`XponManager::start`];
    /// a catalog inconsistency is the only fatal condition here.
    pub fn new(config: Config) -> DmResult<Self> {
        catalog::self_check()?;
        let enable_store = EnableStore::new(config.reboot_persist_dir.as_deref());
        let password_store = PasswordStore::new(
            config.upgrade_persist_dir.as_deref(),
            config.reboot_persist_dir.as_deref(),
        );
        let discovery = Discovery::new(config.max_onus);
        Ok(Self {
            config,
            tree: SchemaTree::new(),
            pon_ctrl: PonCtrl::new(),
            enable_store,
            password_store,
            onu_marks: HashSet::new(),
            iface_state: HashMap::new(),
            enable_sched: EnableScheduler::new(),
            discovery,
            ignore_param_reads: false,
        })
    }

    /// Attaches the vendor backend and kicks off startup reconciliation.
    ///
    /// A missing or ambiguous backend leaves the daemon running in a
    /// degraded state: the schema stays available, `XPON.ModuleError`
    /// is raised and nothing reaches the hardware.
    #[instrument(skip(self, registry))]
    pub async fn start(&mut self, registry: &BackendRegistry) {
        match registry.select(&self.config.backend) {
            Ok(selected) => {
                self.pon_ctrl
                    .attach(selected.name.clone(), selected.backend);
                self.set_vendor_module(&selected.name, &selected.version);
            }
            Err(e) => {
                error!("no usable vendor backend: {}", e);
                self.set_module_error();
                return;
            }
        }
        self.pon_ctrl.set_max_onus(self.config.max_onus).await;
        self.start_discovery();
        info!("manager started");
    }

    /// Records the selected vendor module on the schema root.
    pub(crate) fn set_vendor_module(&mut self, name: &str, version: &str) {
        let mut txn = Transaction::new();
        txn.select(ROOT_NAME)
            .set_param(MODULE_NAME_PARAM, Value::from(name))
            .set_param(MODULE_VERSION_PARAM, Value::from(version));
        if let Err(e) = txn.apply(&mut self.tree) {
            error!("failed to record vendor module '{}': {}", name, e);
        }
    }

    /// Raises `XPON.ModuleError` on the schema root.
    pub(crate) fn set_module_error(&mut self) {
        warn!("running without a vendor backend");
        let mut txn = Transaction::new();
        txn.select(ROOT_NAME)
            .set_param(MODULE_ERROR_PARAM, Value::Bool(true));
        if let Err(e) = txn.apply(&mut self.tree) {
            error!("failed to raise ModuleError: {}", e);
        }
    }

    /// True if vendor-backend startup failed.
    pub fn module_error(&self) -> bool {
        self.tree
            .param(ROOT_NAME, MODULE_ERROR_PARAM)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Earliest armed timer deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.enable_sched.next_deadline(),
            self.discovery.next_deadline(),
            self.discovery.next_sweep_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }
}

#[cfg(test)]
impl XponManager {
    /// Manager with disabled stores and no backend attached.
    pub(crate) fn for_tests() -> Self {
        let config = Config {
            reboot_persist_dir: None,
            upgrade_persist_dir: None,
            ..Config::default()
        };
        Self::new(config).unwrap()
    }
}
