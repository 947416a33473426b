//! Vendor backend registry.
//!
//! The daemon itself is vendor neutral: everything hardware specific sits
//! behind the [`PonBackend`] trait. Integrators register one factory per
//! vendor backend and the daemon selects exactly one of them at startup by
//! matching the configured name pattern against the registered names. A
//! failed selection does not abort the daemon; it keeps serving the schema
//! in a degraded state with the root `ModuleError` parameter raised.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::info;

use crate::pon_ctrl::{BackendError, PonBackend};

/// Why no vendor backend could be put in service.
#[derive(Error, Debug)]
pub enum ModuleLoadError {
    /// No registered backend name starts with the configured pattern.
    #[error("no vendor backend matches \"{pattern}\"")]
    NoMatch { pattern: String },

    /// More than one registered backend name starts with the configured
    /// pattern, so the choice would be arbitrary.
    #[error("multiple vendor backends match \"{pattern}\": {candidates}")]
    Ambiguous { pattern: String, candidates: String },

    /// The selected backend's factory refused to produce an instance.
    #[error("vendor backend \"{name}\" failed to initialize")]
    Init {
        name: String,
        #[source]
        source: BackendError,
    },
}

/// Factory producing a ready-to-use backend instance.
pub type BackendFactory =
    Box<dyn Fn() -> Result<Box<dyn PonBackend>, BackendError> + Send>;

struct BackendEntry {
    version: String,
    factory: BackendFactory,
}

/// The vendor backend a [`BackendRegistry`] selection produced.
pub struct SelectedBackend {
    /// Registered name, reported through the root `ModuleName` parameter.
    pub name: String,
    /// Backend version, reported through the root `ModuleVersion` parameter.
    pub version: String,
    pub backend: Box<dyn PonBackend>,
}

impl std::fmt::Debug for SelectedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedBackend")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// The set of vendor backends available to this build.
#[derive(Default)]
pub struct BackendRegistry {
    entries: BTreeMap<String, BackendEntry>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a vendor backend under `name`. Registering the same name
    /// twice replaces the earlier entry.
    pub fn register<F>(&mut self, name: &str, version: &str, factory: F)
    where
        F: Fn() -> Result<Box<dyn PonBackend>, BackendError> + Send + 'static,
    {
        self.entries.insert(
            name.to_string(),
            BackendEntry {
                version: version.to_string(),
                factory: Box::new(factory),
            },
        );
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Selects the single backend whose name starts with `pattern` and
    /// instantiates it.
    ///
    /// The empty pattern matches every registered backend, so it only
    /// succeeds when exactly one is available.
    pub fn select(&self, pattern: &str) -> Result<SelectedBackend, ModuleLoadError> {
        let candidates: Vec<(&str, &BackendEntry)> = self
            .entries
            .iter()
            .filter(|(name, _)| name.starts_with(pattern))
            .map(|(name, entry)| (name.as_str(), entry))
            .collect();
        match candidates.as_slice() {
            [] => Err(ModuleLoadError::NoMatch {
                pattern: pattern.to_string(),
            }),
            [(name, entry)] => {
                let backend = (entry.factory)().map_err(|source| ModuleLoadError::Init {
                    name: name.to_string(),
                    source,
                })?;
                info!(backend = %name, version = %entry.version, "selected vendor backend");
                Ok(SelectedBackend {
                    name: name.to_string(),
                    version: entry.version.clone(),
                    backend,
                })
            }
            multiple => Err(ModuleLoadError::Ambiguous {
                pattern: pattern.to_string(),
                candidates: multiple
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}
