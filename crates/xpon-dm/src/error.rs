//! Error types for data-model operations.
//!
//! All errors implement `std::error::Error` via `thiserror`. Callers decide
//! at the nearest meaningful boundary whether a failure aborts the operation
//! or degrades to a logged no-op.

use std::io;
use thiserror::Error;

/// Result type alias for data-model operations.
pub type DmResult<T> = Result<T, DmError>;

/// Errors that can occur while operating on the XPON data model.
#[derive(Debug, Error)]
pub enum DmError {
    /// A required request field is missing or empty.
    #[error("Missing or invalid field '{field}' in request")]
    MissingField {
        /// Name of the offending field.
        field: String,
    },

    /// The path does not map to any cataloged object type.
    #[error("Unknown object type for path '{path}'")]
    UnknownObject {
        /// The path that failed to classify.
        path: String,
    },

    /// The addressed object does not exist in the tree.
    #[error("Object not found: {path}")]
    ObjectNotFound {
        /// The missing object path.
        path: String,
    },

    /// An instance with the requested index already exists.
    #[error("Instance {path}.{index} already exists")]
    InstanceExists {
        /// Template path.
        path: String,
        /// Requested instance index.
        index: u32,
    },

    /// The addressed instance does not exist.
    #[error("Instance {path}.{index} does not exist")]
    InstanceNotFound {
        /// Template path.
        path: String,
        /// Requested instance index.
        index: u32,
    },

    /// A numeric key value exceeds the declared maximum.
    #[error("Key '{name}' value {value} above max {max}")]
    KeyOutOfRange {
        /// Key parameter name.
        name: String,
        /// Supplied value.
        value: u32,
        /// Declared maximum.
        max: u32,
    },

    /// A supplied value has the wrong shape for its target.
    #[error("Invalid value: {reason}")]
    InvalidValue {
        /// What was wrong.
        reason: String,
    },

    /// A transaction step failed validation; the tree is unchanged.
    #[error("Transaction failed: {reason}")]
    Transaction {
        /// What failed.
        reason: String,
    },

    /// The compiled-in object catalog is inconsistent.
    #[error("Catalog self-check failed: {reason}")]
    Catalog {
        /// What the check found.
        reason: String,
    },

    /// Filesystem access failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// The file involved.
        path: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl DmError {
    /// Creates a missing-field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates an unknown-object error.
    pub fn unknown_object(path: impl Into<String>) -> Self {
        Self::UnknownObject { path: path.into() }
    }

    /// Creates an object-not-found error.
    pub fn object_not_found(path: impl Into<String>) -> Self {
        Self::ObjectNotFound { path: path.into() }
    }

    /// Creates an instance-not-found error.
    pub fn instance_not_found(path: impl Into<String>, index: u32) -> Self {
        Self::InstanceNotFound {
            path: path.into(),
            index,
        }
    }

    /// Creates an invalid-value error.
    pub fn invalid_value(reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            reason: reason.into(),
        }
    }

    /// Creates a transaction error.
    pub fn transaction(reason: impl Into<String>) -> Self {
        Self::Transaction {
            reason: reason.into(),
        }
    }

    /// Creates an I/O error.
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true if this error means the target simply was not there.
    ///
    /// Remove and update operations treat these as benign (idempotent
    /// no-op with a warning); add operations treat them as hard failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DmError::ObjectNotFound { .. } | DmError::InstanceNotFound { .. }
        )
    }
}
