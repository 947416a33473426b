//! XPON Management Daemon
//!
//! Maintains the TR-181 XPON data model for an optical network unit and
//! keeps it in sync with the PON hardware through a pluggable vendor
//! backend. The daemon owns the schema tree, defers ONU enables until
//! the interface objects are discovered, reconciles the model with the
//! hardware at startup and carries enables and PLOAM passwords across
//! reboots and image upgrades.

pub mod config;
pub mod daemon;
mod discovery;
mod dm_ops;
mod enable;
mod events;
mod fdwatch;
mod hooks;
pub mod manager;
pub mod module;
mod password;
mod persist;
pub mod pon_ctrl;
pub mod tables;

pub use manager::XponManager;
pub use module::{BackendRegistry, ModuleLoadError, SelectedBackend};
pub use pon_ctrl::{
    BackendCalls, BackendError, BackendEvent, BackendResult, InstanceArgs, ObjectContent,
    PonBackend, RootParameterArgs,
};
