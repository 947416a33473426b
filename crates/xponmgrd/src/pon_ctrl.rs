//! Vendor backend gateway.
//!
//! All traffic towards PON hardware goes through [`PonBackend`], the
//! trait a vendor backend implements, and [`PonCtrl`], the daemon-side
//! wrapper that tolerates running without a backend. Notifications in
//! the other direction arrive as [`BackendEvent`] values on the daemon
//! channel.
//!
//! The gateway itself never touches the data model. Commands carry
//! generic template paths (`XPON.ONU.x.ANI`) plus an instance index;
//! mapping backend replies onto tree instances is the caller's job.

use std::collections::BTreeMap;
use std::os::fd::RawFd;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error};

use xpon_dm::{DmResult, Value};

/// Errors produced by backend calls.
#[derive(Debug, Error)]
pub enum BackendError {
    /// No vendor backend is loaded.
    #[error("no vendor backend loaded")]
    Unavailable,

    /// A backend call was answered with a failure.
    #[error("backend call '{function}' failed: {reason}")]
    CallFailed { function: String, reason: String },

    /// A backend reply does not have the promised shape.
    #[error("backend call '{function}' returned a bad reply: {reason}")]
    BadReply { function: String, reason: String },
}

impl BackendError {
    pub fn call_failed(function: impl Into<String>, reason: impl Into<String>) -> Self {
        BackendError::CallFailed {
            function: function.into(),
            reason: reason.into(),
        }
    }

    pub fn bad_reply(function: impl Into<String>, reason: impl Into<String>) -> Self {
        BackendError::BadReply {
            function: function.into(),
            reason: reason.into(),
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Parameters and key parameters reported by the backend for one
/// object or instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectContent {
    pub parameters: BTreeMap<String, Value>,
    pub keys: BTreeMap<String, Value>,
}

/// Interface a vendor backend implements.
///
/// Paths passed to these methods are generic template paths, with the
/// instance index carried separately where one applies.
#[async_trait]
pub trait PonBackend: Send {
    /// Returns the instance indexes known to the hardware for a
    /// template, as a comma separated string (`"1,2"`). An empty
    /// string means no instances.
    async fn get_instances(&mut self, path: &str) -> BackendResult<String>;

    /// Returns parameter and key values for one object. `index` is 0
    /// for singleton objects.
    async fn get_object_content(&mut self, path: &str, index: u32)
        -> BackendResult<ObjectContent>;

    /// Returns current values for specific parameters of the object at
    /// `path`.
    async fn get_param_values(
        &mut self,
        path: &str,
        names: &[&str],
    ) -> BackendResult<BTreeMap<String, Value>>;

    /// Enables or disables the object at `path`.
    async fn set_enable(&mut self, path: &str, enable: bool) -> BackendResult<()>;

    /// Forwards a PLOAM password for the ANI at `ani_path`.
    async fn set_password(
        &mut self,
        ani_path: &str,
        password: &str,
        is_hex: bool,
    ) -> BackendResult<()>;

    /// Tells the backend how many ONU instances the data model accepts.
    async fn set_max_onus(&mut self, max_onus: u32) -> BackendResult<()>;

    /// Lets the backend service a file descriptor it asked the daemon
    /// to watch.
    async fn handle_file_descriptor(&mut self, fd: RawFd) -> BackendResult<()>;
}

/// Instance operation arguments as delivered by the backend.
///
/// Which fields are required depends on the operation. Validation
/// happens in the instance operations, not here.
#[derive(Debug, Clone, Default)]
pub struct InstanceArgs {
    /// Template or object path, concrete or generic.
    pub path: Option<String>,
    /// Instance index, absent or 0 when the target is not an instance.
    pub index: Option<u32>,
    /// Key parameter values for instance creation.
    pub keys: Option<BTreeMap<String, Value>>,
    /// Non-key parameter values.
    pub parameters: Option<BTreeMap<String, Value>>,
}

/// Root parameter update as delivered by the backend.
#[derive(Debug, Clone, Default)]
pub struct RootParameterArgs {
    pub name: Option<String>,
    pub value: Option<Value>,
}

/// Notification from the vendor backend to the daemon.
///
/// The variants map 1:1 onto the callback surface the daemon publishes
/// to backends: each one ends up in the corresponding instance
/// operation on the manager.
#[derive(Debug)]
pub enum BackendEvent {
    /// Hardware created an instance.
    InstanceAdded(InstanceArgs),
    /// Hardware removed an instance.
    InstanceRemoved(InstanceArgs),
    /// Parameter values of an existing object changed.
    ObjectChanged(InstanceArgs),
    /// Create-or-update for an instance the backend cannot tell apart.
    AddOrChangeInstance(InstanceArgs),
    /// An OMCI MIB reset was seen for an ONU.
    OmciResetMib { index: Option<u32> },
    /// Update of a parameter on the schema root object.
    SetSchemaParameter(RootParameterArgs),
    /// Read of a single parameter value, answered over `reply`.
    GetParamValue {
        path: String,
        name: String,
        reply: oneshot::Sender<DmResult<Value>>,
    },
    /// Start watching a backend file descriptor for readability.
    WatchFdStart { fd: RawFd },
    /// Stop watching a backend file descriptor.
    WatchFdStop { fd: RawFd },
}

/// Sender half handed to backend implementations for calling back into
/// the daemon.
pub type BackendCalls = tokio::sync::mpsc::Sender<BackendEvent>;

/// Daemon-side backend handle.
///
/// Every call checks that a backend is attached. Command style calls
/// (`set_enable`, `set_password`, `set_max_onus`,
/// `handle_file_descriptor`) log failures and carry on. Query style
/// calls propagate failure so the caller can drop the branch it was
/// reconciling.
pub struct PonCtrl {
    backend: Option<Box<dyn PonBackend>>,
    name: Option<String>,
}

impl PonCtrl {
    pub fn new() -> Self {
        Self {
            backend: None,
            name: None,
        }
    }

    /// Attaches the loaded vendor backend.
    pub fn attach(&mut self, name: String, backend: Box<dyn PonBackend>) {
        debug!("attaching vendor backend '{}'", name);
        self.name = Some(name);
        self.backend = Some(backend);
    }

    pub fn is_attached(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn backend_mut(&mut self) -> BackendResult<&mut Box<dyn PonBackend>> {
        self.backend.as_mut().ok_or(BackendError::Unavailable)
    }

    /// Asks the hardware which instances exist under a template.
    pub async fn get_instances(&mut self, path: &str) -> BackendResult<String> {
        debug!("get_instances({})", path);
        self.backend_mut()?.get_instances(path).await
    }

    /// Asks the hardware for the content of one object.
    pub async fn get_object_content(
        &mut self,
        path: &str,
        index: u32,
    ) -> BackendResult<ObjectContent> {
        debug!("get_object_content({}, index={})", path, index);
        self.backend_mut()?.get_object_content(path, index).await
    }

    /// Asks the hardware for current values of specific parameters.
    pub async fn get_param_values(
        &mut self,
        path: &str,
        names: &[&str],
    ) -> BackendResult<BTreeMap<String, Value>> {
        debug!("get_param_values({}, {})", path, names.join(","));
        self.backend_mut()?.get_param_values(path, names).await
    }

    /// Forwards an enable or disable of `path` to the hardware.
    pub async fn set_enable(&mut self, path: &str, enable: bool) {
        debug!("set_enable({}, {})", path, enable);
        let result = match self.backend_mut() {
            Ok(backend) => backend.set_enable(path, enable).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!("{}: failed to set enable={}: {}", path, enable, e);
        }
    }

    /// Forwards a PLOAM password to the hardware.
    pub async fn set_password(&mut self, ani_path: &str, password: &str, is_hex: bool) {
        debug!("set_password({}, is_hex={})", ani_path, is_hex);
        let result = match self.backend_mut() {
            Ok(backend) => backend.set_password(ani_path, password, is_hex).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!("{}: failed to forward password: {}", ani_path, e);
        }
    }

    /// Passes the ONU instance limit to the backend.
    pub async fn set_max_onus(&mut self, max_onus: u32) {
        debug!("set_max_onus({})", max_onus);
        let result = match self.backend_mut() {
            Ok(backend) => backend.set_max_onus(max_onus).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!("failed to pass max_onus={} to backend: {}", max_onus, e);
        }
    }

    /// Lets the backend service a watched file descriptor.
    pub async fn handle_file_descriptor(&mut self, fd: RawFd) {
        debug!("handle_file_descriptor({})", fd);
        let result = match self.backend_mut() {
            Ok(backend) => backend.handle_file_descriptor(fd).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!("failed to service backend fd {}: {}", fd, e);
        }
    }
}

impl Default for PonCtrl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted in-memory backend for tests.

    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};

    /// One recorded call into the mock backend.
    #[derive(Debug, Clone, PartialEq)]
    pub enum BackendCall {
        GetInstances { path: String },
        GetObjectContent { path: String, index: u32 },
        GetParamValues { path: String, names: String },
        SetEnable { path: String, enable: bool },
        SetPassword { ani_path: String, password: String, is_hex: bool },
        SetMaxOnus(u32),
        HandleFd(RawFd),
    }

    #[derive(Debug, Default)]
    pub struct MockState {
        /// Calls in arrival order.
        pub calls: Vec<BackendCall>,
        /// Scripted `get_instances` replies, keyed by path.
        pub indexes: HashMap<String, String>,
        /// Scripted `get_object_content` replies, keyed by (path, index).
        pub contents: HashMap<(String, u32), ObjectContent>,
        /// Scripted `get_param_values` replies, keyed by
        /// (path, comma separated names).
        pub params: HashMap<(String, String), BTreeMap<String, Value>>,
        /// Method names that fail when called.
        pub fail_calls: HashSet<&'static str>,
    }

    impl MockState {
        pub fn enable_calls(&self) -> Vec<(String, bool)> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    BackendCall::SetEnable { path, enable } => Some((path.clone(), *enable)),
                    _ => None,
                })
                .collect()
        }

        pub fn password_calls(&self) -> Vec<(String, String, bool)> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    BackendCall::SetPassword {
                        ani_path,
                        password,
                        is_hex,
                    } => Some((ani_path.clone(), password.clone(), *is_hex)),
                    _ => None,
                })
                .collect()
        }
    }

    /// Backend whose replies are scripted through shared [`MockState`].
    #[derive(Debug, Default)]
    pub struct MockBackend {
        state: Arc<Mutex<MockState>>,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Backend sharing an existing state, for factory closures.
        pub fn with_state(state: Arc<Mutex<MockState>>) -> Self {
            Self { state }
        }

        /// Handle for scripting replies and inspecting recorded calls
        /// after the backend was attached.
        pub fn handle(&self) -> Arc<Mutex<MockState>> {
            Arc::clone(&self.state)
        }
    }

    #[async_trait]
    impl PonBackend for MockBackend {
        async fn get_instances(&mut self, path: &str) -> BackendResult<String> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(BackendCall::GetInstances {
                path: path.to_string(),
            });
            if state.fail_calls.contains("get_instances") {
                return Err(BackendError::call_failed("get_instances", "scripted failure"));
            }
            state
                .indexes
                .get(path)
                .cloned()
                .ok_or_else(|| BackendError::bad_reply("get_instances", "missing 'indexes'"))
        }

        async fn get_object_content(
            &mut self,
            path: &str,
            index: u32,
        ) -> BackendResult<ObjectContent> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(BackendCall::GetObjectContent {
                path: path.to_string(),
                index,
            });
            if state.fail_calls.contains("get_object_content") {
                return Err(BackendError::call_failed(
                    "get_object_content",
                    "scripted failure",
                ));
            }
            state
                .contents
                .get(&(path.to_string(), index))
                .cloned()
                .ok_or_else(|| {
                    BackendError::call_failed("get_object_content", "no scripted content")
                })
        }

        async fn get_param_values(
            &mut self,
            path: &str,
            names: &[&str],
        ) -> BackendResult<BTreeMap<String, Value>> {
            let names = names.join(",");
            let mut state = self.state.lock().unwrap();
            state.calls.push(BackendCall::GetParamValues {
                path: path.to_string(),
                names: names.clone(),
            });
            if state.fail_calls.contains("get_param_values") {
                return Err(BackendError::call_failed(
                    "get_param_values",
                    "scripted failure",
                ));
            }
            state
                .params
                .get(&(path.to_string(), names))
                .cloned()
                .ok_or_else(|| BackendError::bad_reply("get_param_values", "missing 'parameters'"))
        }

        async fn set_enable(&mut self, path: &str, enable: bool) -> BackendResult<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(BackendCall::SetEnable {
                path: path.to_string(),
                enable,
            });
            if state.fail_calls.contains("set_enable") {
                return Err(BackendError::call_failed("set_enable", "scripted failure"));
            }
            Ok(())
        }

        async fn set_password(
            &mut self,
            ani_path: &str,
            password: &str,
            is_hex: bool,
        ) -> BackendResult<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(BackendCall::SetPassword {
                ani_path: ani_path.to_string(),
                password: password.to_string(),
                is_hex,
            });
            if state.fail_calls.contains("set_password") {
                return Err(BackendError::call_failed("set_password", "scripted failure"));
            }
            Ok(())
        }

        async fn set_max_onus(&mut self, max_onus: u32) -> BackendResult<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(BackendCall::SetMaxOnus(max_onus));
            if state.fail_calls.contains("set_max_onus") {
                return Err(BackendError::call_failed("set_max_onus", "scripted failure"));
            }
            Ok(())
        }

        async fn handle_file_descriptor(&mut self, fd: RawFd) -> BackendResult<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(BackendCall::HandleFd(fd));
            if state.fail_calls.contains("handle_file_descriptor") {
                return Err(BackendError::call_failed(
                    "handle_file_descriptor",
                    "scripted failure",
                ));
            }
            Ok(())
        }
    }
}
