//! In-memory schema tree with transactional mutation.
//!
//! The tree holds the XPON object hierarchy the daemon manages: the root
//! container, template objects, their instances and the singleton children
//! below them. Structure is not free-form: creating an instance of a
//! cataloged template materializes the subtree skeleton its generic path
//! family declares, so "XPON.ONU.1.ANI.1" always owns its TC singletons
//! and its GEM-port and Transceiver templates.
//!
//! All mutation goes through [`Transaction`]: an ordered op list applied
//! against a working copy of the tree. The tree is replaced only when
//! every step succeeded; a failed apply leaves it untouched. A successful
//! apply reports a [`ChangeSet`] the caller dispatches to its
//! change handlers. Parameters written while an instance is being created
//! count as initial state, not as changes.

use crate::catalog::{self, ObjectId, ObjectInfo};
use crate::error::{DmError, DmResult};
use crate::path::WILDCARD;
use crate::value::{ParamKind, Value};
use log::warn;
use std::collections::BTreeMap;

/// Name of the root container.
pub const ROOT_NAME: &str = "XPON";

/// Root parameter recording the selected vendor module.
pub const MODULE_NAME_PARAM: &str = "ModuleName";

/// Root parameter recording the selected vendor module's version.
pub const MODULE_VERSION_PARAM: &str = "ModuleVersion";

/// Root parameter flagging a vendor-module startup failure.
pub const MODULE_ERROR_PARAM: &str = "ModuleError";

/// Root parameter mirroring the vendor state machine.
pub const FSM_STATE_PARAM: &str = "FsmState";

#[derive(Debug, Clone)]
enum Node {
    Object(ObjectNode),
    Template(TemplateNode),
}

#[derive(Debug, Clone, Default)]
struct ObjectNode {
    params: BTreeMap<String, Value>,
    /// Set on instances; the key parameter is read-only after creation.
    key_name: Option<String>,
    children: BTreeMap<String, Node>,
}

#[derive(Debug, Clone, Default)]
struct TemplateNode {
    instances: BTreeMap<u32, ObjectNode>,
}

/// One observed mutation of the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    InstanceAdded { path: String },
    InstanceRemoved { path: String },
    ParamChanged {
        path: String,
        name: String,
        from: Value,
        to: Value,
    },
}

/// The mutations one committed transaction performed, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub changes: Vec<Change>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// The XPON object tree.
#[derive(Debug, Clone)]
pub struct SchemaTree {
    root: ObjectNode,
}

impl Default for SchemaTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaTree {
    /// Builds the empty tree: the root container with its module
    /// parameters and the ONU template.
    pub fn new() -> Self {
        let mut root = ObjectNode::default();
        root.params
            .insert(MODULE_NAME_PARAM.to_string(), Value::String(String::new()));
        root.params
            .insert(MODULE_VERSION_PARAM.to_string(), Value::String(String::new()));
        root.params
            .insert(MODULE_ERROR_PARAM.to_string(), Value::Bool(false));
        root.params
            .insert(FSM_STATE_PARAM.to_string(), Value::String(String::new()));
        materialize_children(&mut root, ROOT_NAME);
        SchemaTree { root }
    }

    fn resolve(&self, path: &str) -> Option<Resolved<'_>> {
        let mut segments = path.split('.');
        if segments.next()? != ROOT_NAME {
            return None;
        }
        let mut current = &self.root;
        let mut segments = segments.peekable();
        while let Some(segment) = segments.next() {
            match current.children.get(segment)? {
                Node::Object(obj) => current = obj,
                Node::Template(template) => match segments.next() {
                    None => return Some(Resolved::Template(template)),
                    Some(index_segment) => {
                        let index: u32 = index_segment.parse().ok()?;
                        current = template.instances.get(&index)?;
                    }
                },
            }
        }
        Some(Resolved::Object(current))
    }

    fn resolve_object_mut(&mut self, path: &str) -> Option<&mut ObjectNode> {
        let mut segments = path.split('.');
        if segments.next()? != ROOT_NAME {
            return None;
        }
        let mut current = &mut self.root;
        while let Some(segment) = segments.next() {
            match current.children.get_mut(segment)? {
                Node::Object(obj) => current = obj,
                Node::Template(template) => {
                    let index: u32 = segments.next()?.parse().ok()?;
                    current = template.instances.get_mut(&index)?;
                }
            }
        }
        Some(current)
    }

    fn resolve_template_mut(&mut self, path: &str) -> Option<&mut TemplateNode> {
        // Walk to the parent object, then step into the final segment.
        let (parent_path, last) = path.rsplit_once('.')?;
        let parent = self.resolve_object_mut(parent_path)?;
        match parent.children.get_mut(last)? {
            Node::Template(template) => Some(template),
            Node::Object(_) => None,
        }
    }

    /// True if the path addresses an existing object, instance or
    /// template.
    pub fn object_exists(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }

    /// True if the path addresses a template object.
    pub fn is_template(&self, path: &str) -> bool {
        matches!(self.resolve(path), Some(Resolved::Template(_)))
    }

    /// True if the template has an instance with the given index.
    pub fn instance_exists(&self, template_path: &str, index: u32) -> bool {
        match self.resolve(template_path) {
            Some(Resolved::Template(template)) => template.instances.contains_key(&index),
            _ => false,
        }
    }

    /// Number of instances of a template; 0 when the template is absent.
    pub fn instance_count(&self, template_path: &str) -> u32 {
        match self.resolve(template_path) {
            Some(Resolved::Template(template)) => template.instances.len() as u32,
            _ => {
                warn!("{} not found", template_path);
                0
            }
        }
    }

    /// The instance indexes of a template, ascending.
    pub fn instance_indexes(&self, template_path: &str) -> Vec<u32> {
        match self.resolve(template_path) {
            Some(Resolved::Template(template)) => template.instances.keys().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// Reads a parameter value stored in the tree.
    pub fn param(&self, path: &str, name: &str) -> Option<Value> {
        match self.resolve(path)? {
            Resolved::Object(obj) => obj.params.get(name).cloned(),
            Resolved::Template(_) => None,
        }
    }
}

enum Resolved<'a> {
    Object(&'a ObjectNode),
    Template(&'a TemplateNode),
}

/// Creates the node for a new instance of a cataloged template type.
fn new_instance(info: &'static ObjectInfo, key: Option<(String, Value)>) -> ObjectNode {
    let mut node = ObjectNode::default();
    for param in info.params {
        node.params
            .insert(param.name.to_string(), param.kind.default_value());
    }
    if let Some((name, value)) = key {
        node.key_name = Some(name.clone());
        node.params.insert(name, value);
    }
    let base = format!("{}.{}", info.generic_path, WILDCARD);
    materialize_children(&mut node, &base);
    node
}

/// Creates the node for a singleton child, defaults plus its own subtree.
fn new_singleton(info: &'static ObjectInfo) -> ObjectNode {
    let mut node = ObjectNode::default();
    for param in info.params {
        node.params
            .insert(param.name.to_string(), param.kind.default_value());
    }
    materialize_children(&mut node, info.generic_path);
    node
}

/// Creates the structural children an object with generic base path
/// `base` owns: every catalog entry directly below it (no wildcard in
/// the remainder) becomes a singleton or an empty template, with plain
/// containers for dotted intermediates such as "TC" and "GEM".
fn materialize_children(node: &mut ObjectNode, base: &str) {
    for info in catalog::OBJECT_INFO.iter() {
        let Some(rest) = info.generic_path.strip_prefix(base) else {
            continue;
        };
        let Some(rest) = rest.strip_prefix('.') else {
            continue;
        };
        if rest.is_empty() || rest.split('.').any(|s| s == WILDCARD) {
            continue;
        }
        place_child(node, rest, info);
    }
}

fn place_child(node: &mut ObjectNode, rest: &str, info: &'static ObjectInfo) {
    let segments: Vec<&str> = rest.split('.').collect();
    let mut current = node;
    for segment in &segments[..segments.len() - 1] {
        let child = current
            .children
            .entry(segment.to_string())
            .or_insert_with(|| Node::Object(ObjectNode::default()));
        current = match child {
            Node::Object(obj) => obj,
            Node::Template(_) => {
                warn!("{}: '{}' collides with a template", info.generic_path, segment);
                return;
            }
        };
    }
    let last = segments[segments.len() - 1].to_string();
    let child = if info.key_name.is_some() {
        Node::Template(TemplateNode::default())
    } else {
        Node::Object(new_singleton(info))
    };
    current.children.insert(last, child);
}

#[derive(Debug, Clone)]
enum TxnOp {
    Select {
        path: String,
    },
    AddInstance {
        index: u32,
        key_name: Option<String>,
        key_value: Option<Value>,
    },
    SetParam {
        name: String,
        value: Value,
    },
    DelInstance {
        index: u32,
    },
}

#[derive(Debug, Clone)]
enum Cursor {
    Object { path: String },
    Template { path: String },
}

/// An ordered list of tree mutations applied atomically.
///
/// `select` positions the cursor; `add_instance*` moves it into the new
/// instance so following `set_param` calls target it, the way the host
/// runtime's transactions behave.
#[derive(Debug, Default)]
pub struct Transaction {
    ops: Vec<TxnOp>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Positions the cursor on an object or template path.
    pub fn select(&mut self, path: impl Into<String>) -> &mut Self {
        self.ops.push(TxnOp::Select { path: path.into() });
        self
    }

    /// Adds an instance (keyless template) at `index` under the selected
    /// template and moves the cursor into it.
    pub fn add_instance(&mut self, index: u32) -> &mut Self {
        self.ops.push(TxnOp::AddInstance {
            index,
            key_name: None,
            key_value: None,
        });
        self
    }

    /// Adds an instance at `index` with its key parameter and moves the
    /// cursor into it.
    pub fn add_instance_with_key(
        &mut self,
        index: u32,
        key_name: impl Into<String>,
        key_value: Value,
    ) -> &mut Self {
        self.ops.push(TxnOp::AddInstance {
            index,
            key_name: Some(key_name.into()),
            key_value: Some(key_value),
        });
        self
    }

    /// Writes a parameter on the object under the cursor.
    pub fn set_param(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.ops.push(TxnOp::SetParam {
            name: name.into(),
            value,
        });
        self
    }

    /// Deletes the instance at `index` under the selected template.
    pub fn del_instance(&mut self, index: u32) -> &mut Self {
        self.ops.push(TxnOp::DelInstance { index });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Applies the transaction. On success the tree holds all mutations
    /// and the returned change set lists them; on failure the tree is
    /// unchanged.
    pub fn apply(self, tree: &mut SchemaTree) -> DmResult<ChangeSet> {
        let mut work = tree.clone();
        let mut changes = ChangeSet::default();
        let mut added_paths: Vec<String> = Vec::new();
        let mut cursor: Option<Cursor> = None;

        for op in self.ops {
            match op {
                TxnOp::Select { path } => {
                    cursor = Some(match work.resolve(&path) {
                        Some(Resolved::Object(_)) => Cursor::Object { path },
                        Some(Resolved::Template(_)) => Cursor::Template { path },
                        None => {
                            return Err(DmError::transaction(format!(
                                "select '{}': not found",
                                path
                            )))
                        }
                    });
                }
                TxnOp::AddInstance {
                    index,
                    key_name,
                    key_value,
                } => {
                    let template_path = match &cursor {
                        Some(Cursor::Template { path }) => path.clone(),
                        _ => {
                            return Err(DmError::transaction(
                                "add_instance without a selected template",
                            ))
                        }
                    };
                    if index == 0 {
                        return Err(DmError::transaction("instance index 0 is reserved"));
                    }
                    let id = crate::path::classify(&template_path).ok_or_else(|| {
                        DmError::unknown_object(template_path.clone())
                    })?;
                    let info = catalog::info(id);
                    let key = validate_key(info, key_name, key_value)?;
                    let instance_path = format!("{}.{}", template_path, index);
                    let template = work
                        .resolve_template_mut(&template_path)
                        .ok_or_else(|| DmError::object_not_found(template_path.clone()))?;
                    if template.instances.contains_key(&index) {
                        return Err(DmError::InstanceExists {
                            path: template_path,
                            index,
                        });
                    }
                    template.instances.insert(index, new_instance(info, key));
                    changes.changes.push(Change::InstanceAdded {
                        path: instance_path.clone(),
                    });
                    added_paths.push(instance_path.clone());
                    cursor = Some(Cursor::Object {
                        path: instance_path,
                    });
                }
                TxnOp::SetParam { name, value } => {
                    let object_path = match &cursor {
                        Some(Cursor::Object { path }) => path.clone(),
                        _ => {
                            return Err(DmError::transaction(
                                "set_param without a selected object",
                            ))
                        }
                    };
                    let object = work
                        .resolve_object_mut(&object_path)
                        .ok_or_else(|| DmError::object_not_found(object_path.clone()))?;
                    if object.key_name.as_deref() == Some(name.as_str()) {
                        return Err(DmError::transaction(format!(
                            "key '{}' of {} is read-only",
                            name, object_path
                        )));
                    }
                    let current = object.params.get_mut(&name).ok_or_else(|| {
                        DmError::transaction(format!(
                            "{} has no parameter '{}'",
                            object_path, name
                        ))
                    })?;
                    if current.kind() != value.kind() {
                        return Err(DmError::transaction(format!(
                            "{}.{}: kind {:?} != expected {:?}",
                            object_path,
                            name,
                            value.kind(),
                            current.kind()
                        )));
                    }
                    let from = current.clone();
                    *current = value.clone();
                    let initial = added_paths
                        .iter()
                        .any(|p| object_path == *p || object_path.starts_with(&format!("{}.", p)));
                    if from != value && !initial {
                        changes.changes.push(Change::ParamChanged {
                            path: object_path,
                            name,
                            from,
                            to: value,
                        });
                    }
                }
                TxnOp::DelInstance { index } => {
                    let template_path = match &cursor {
                        Some(Cursor::Template { path }) => path.clone(),
                        _ => {
                            return Err(DmError::transaction(
                                "del_instance without a selected template",
                            ))
                        }
                    };
                    let template = work
                        .resolve_template_mut(&template_path)
                        .ok_or_else(|| DmError::object_not_found(template_path.clone()))?;
                    if template.instances.remove(&index).is_none() {
                        return Err(DmError::instance_not_found(template_path, index));
                    }
                    changes.changes.push(Change::InstanceRemoved {
                        path: format!("{}.{}", template_path, index),
                    });
                }
            }
        }

        *tree = work;
        Ok(changes)
    }
}

fn validate_key(
    info: &'static ObjectInfo,
    key_name: Option<String>,
    key_value: Option<Value>,
) -> DmResult<Option<(String, Value)>> {
    match (info.key_name, key_name, key_value) {
        (None, None, _) => Ok(None),
        (None, Some(name), _) => Err(DmError::transaction(format!(
            "{} has no key, got '{}'",
            info.name, name
        ))),
        (Some(expected), Some(name), Some(value)) => {
            if name != expected {
                return Err(DmError::transaction(format!(
                    "{}: key '{}' != expected '{}'",
                    info.name, name, expected
                )));
            }
            let expected_kind = if info.key_max_value.is_some() {
                ParamKind::Uint32
            } else {
                ParamKind::String
            };
            if value.kind() != expected_kind {
                return Err(DmError::transaction(format!(
                    "{}: key '{}' kind {:?} != expected {:?}",
                    info.name,
                    name,
                    value.kind(),
                    expected_kind
                )));
            }
            Ok(Some((name, value)))
        }
        (Some(expected), _, _) => Err(DmError::transaction(format!(
            "{}: key '{}' is required",
            info.name, expected
        ))),
    }
}
