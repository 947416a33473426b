//! TR-181 XPON data-model support library.
//!
//! Shared building blocks for the XPON manager daemon:
//!
//! - **Object catalog**: static descriptions of the managed object types
//!   below `XPON.` (templates, key parameters, key bounds, parameter
//!   tables), see [`catalog`].
//! - **Path handling**: instance-path to generic-path conversion and
//!   catalog classification, see [`path`].
//! - **Schema tree**: the in-memory object hierarchy with atomic
//!   transactions and change reporting, see [`tree`].
//! - **Values**: the typed parameter values the tree stores, see
//!   [`value`].
//! - **Errors**: the [`DmError`] type all operations return.
//!
//! # Example
//!
//! ```ignore
//! use xpon_dm::{SchemaTree, Transaction, Value};
//!
//! let mut tree = SchemaTree::new();
//! let mut txn = Transaction::new();
//! txn.select("XPON.ONU")
//!     .add_instance_with_key(1, "Name", Value::from("onu1"));
//! let changes = txn.apply(&mut tree)?;
//! assert!(tree.object_exists("XPON.ONU.1.ANI"));
//! ```

pub mod catalog;
pub mod error;
pub mod path;
pub mod tree;
pub mod value;

pub use catalog::{ObjectId, ObjectInfo, ParamInfo};
pub use error::{DmError, DmResult};
pub use tree::{Change, ChangeSet, SchemaTree, Transaction};
pub use value::{ParamKind, Value};
