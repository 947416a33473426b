//! Typed parameter values.
//!
//! Every parameter in the XPON data model carries one of a small set of
//! value kinds declared by the object catalog. [`Value`] is the runtime
//! representation; [`ParamKind`] is the compile-time declaration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a data-model parameter, as declared in the object catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKind {
    /// Boolean parameter ("Enable", alarm flags, ...).
    Bool,
    /// Free-form string parameter ("Status", "Version", ...).
    String,
    /// Comma-separated list carried as a string ("ANIs").
    CsvString,
    /// Unsigned 32-bit parameter ("LastChange", "ONUID", ...).
    Uint32,
    /// Signed 32-bit parameter ("RxPower", "Temperature", ...).
    Int32,
}

impl ParamKind {
    /// The value a parameter of this kind starts out with.
    pub fn default_value(self) -> Value {
        match self {
            ParamKind::Bool => Value::Bool(false),
            ParamKind::String => Value::String(String::new()),
            ParamKind::CsvString => Value::CsvString(String::new()),
            ParamKind::Uint32 => Value::Uint32(0),
            ParamKind::Int32 => Value::Int32(0),
        }
    }
}

/// A parameter value in the XPON data model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    String(String),
    CsvString(String),
    Uint32(u32),
    Int32(i32),
}

impl Value {
    /// The kind this value belongs to.
    pub fn kind(&self) -> ParamKind {
        match self {
            Value::Bool(_) => ParamKind::Bool,
            Value::String(_) => ParamKind::String,
            Value::CsvString(_) => ParamKind::CsvString,
            Value::Uint32(_) => ParamKind::Uint32,
            Value::Int32(_) => ParamKind::Int32,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the text of a `String` or `CsvString` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::CsvString(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Uint32(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::String(s) | Value::CsvString(s) => write!(f, "{}", s),
            Value::Uint32(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Uint32(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}
