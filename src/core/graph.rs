//! Purpose: Describe the externally owned target graph as probe-able capabilities.
//! Exports: `Node`, `NodeRef`, `Value`, `PropertyInfo`, `PropertyType`, capability traits.
//! Role: The only view the engine has of graph nodes; no closed type hierarchy.
//! Invariants: Capability probes are side-effect free and default to "absent".
//! Invariants: `Value::Node` clones share the underlying node (reference semantics).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::core::error::{Error, ErrorKind};

/// Shared, mutable handle to a node. Cloning shares the node.
pub type NodeRef = Rc<RefCell<dyn Node>>;

/// Wraps a concrete node into a shared handle.
pub fn node_ref<N: Node + 'static>(node: N) -> NodeRef {
    Rc::new(RefCell::new(node))
}

/// Reference equality between two handles, ignoring vtable metadata.
pub fn same_node(a: &NodeRef, b: &NodeRef) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

#[derive(Debug, PartialEq, Eq)]
pub struct EnumType {
    pub name: &'static str,
    pub members: &'static [&'static str],
}

impl EnumType {
    pub fn position(&self, member: &str) -> Option<usize> {
        self.members
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(member))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnumValue {
    pub ty: &'static EnumType,
    pub index: usize,
}

impl EnumValue {
    pub fn member(&self) -> &'static str {
        self.ty.members.get(self.index).copied().unwrap_or("?")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertyType {
    Bool,
    Int,
    Float,
    Text,
    Enum(&'static EnumType),
    /// Any node; the string is the declared type name (`Object` accepts every node).
    Object(String),
}

impl PropertyType {
    pub fn display_name(&self) -> &str {
        match self {
            PropertyType::Bool => "bool",
            PropertyType::Int => "i64",
            PropertyType::Float => "f64",
            PropertyType::Text => "String",
            PropertyType::Enum(ty) => ty.name,
            PropertyType::Object(name) => name,
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, PropertyType::Object(_))
    }

    /// Whether `value` may be stored in a property of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (PropertyType::Bool, Value::Bool(_))
            | (PropertyType::Int, Value::Int(_))
            | (PropertyType::Float, Value::Float(_) | Value::Int(_))
            | (PropertyType::Text, Value::Text(_)) => true,
            (PropertyType::Enum(ty), Value::Enum(value)) => *ty == value.ty,
            (PropertyType::Object(_), Value::Null) => true,
            (PropertyType::Object(declared), Value::Node(node)) => {
                declared == "Object" || node.borrow().type_name() == declared
            }
            _ => false,
        }
    }
}

/// A public, non-indexed instance property.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyInfo {
    pub name: String,
    pub ty: PropertyType,
    pub writable: bool,
}

impl PropertyInfo {
    pub fn new(name: impl Into<String>, ty: PropertyType, writable: bool) -> Self {
        Self {
            name: name.into(),
            ty,
            writable,
        }
    }
}

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Enum(EnumValue),
    Node(NodeRef),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_node(&self) -> Option<&NodeRef> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    /// Canonical literal text for scalar values; `None` for nodes.
    pub fn literal_text(&self) -> Option<String> {
        match self {
            Value::Null => Some("null".to_string()),
            Value::Bool(value) => Some(value.to_string()),
            Value::Int(value) => Some(value.to_string()),
            Value::Float(value) => Some(value.to_string()),
            Value::Text(value) => Some(value.clone()),
            Value::Enum(value) => Some(value.member().to_string()),
            Value::Node(_) => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Node(node) => match node.try_borrow() {
                Ok(node) => write!(f, "Node(<{}>)", node.type_name()),
                Err(_) => write!(f, "Node(<borrowed>)"),
            },
            other => write!(f, "{}", other.literal_text().unwrap_or_default()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Node(a), Value::Node(b)) => same_node(a, b),
            _ => false,
        }
    }
}

/// A graph node. Property names passed to `get`/`set` are the exact names
/// reported by `properties`; case-insensitive matching happens in the resolver.
pub trait Node {
    fn type_name(&self) -> &str;

    fn properties(&self) -> Vec<PropertyInfo>;

    fn get(&self, property: &str) -> Result<Value, Error>;

    fn set(&mut self, property: &str, value: Value) -> Result<(), Error>;

    fn as_named(&self) -> Option<&dyn Named> {
        None
    }

    fn as_named_mut(&mut self) -> Option<&mut dyn Named> {
        None
    }

    fn as_job_manager(&self) -> Option<&dyn JobManager> {
        None
    }

    fn as_job(&self) -> Option<&dyn Job> {
        None
    }

    fn as_job_mut(&mut self) -> Option<&mut dyn Job> {
        None
    }

    fn as_tool_container(&self) -> Option<&dyn ToolContainer> {
        None
    }

    fn as_tool_container_mut(&mut self) -> Option<&mut dyn ToolContainer> {
        None
    }

    fn as_indexable(&self) -> Option<&dyn Indexable> {
        None
    }

    fn as_iterable(&self) -> Option<&dyn Iterable> {
        None
    }

    fn as_script_host(&self) -> Option<&dyn ScriptHost> {
        None
    }

    fn as_script_host_mut(&mut self) -> Option<&mut dyn ScriptHost> {
        None
    }
}

pub trait Named {
    fn name(&self) -> String;
    fn set_name(&mut self, name: &str);
}

/// A manager of named jobs, visited by count.
pub trait JobManager {
    fn job_count(&self) -> usize;
    fn job(&self, index: usize) -> Option<NodeRef>;
}

/// A job with a single visual-processing slot.
pub trait Job {
    fn vision_tool(&self) -> Option<NodeRef>;
    /// Returns the slot contents, installing an empty tool group when vacant.
    fn vision_tool_or_default(&mut self) -> NodeRef;
}

/// Tool groups and tool blocks: an ordered child-tool sequence.
pub trait ToolContainer {
    fn tools(&self) -> Vec<NodeRef>;
    fn add_tool(&mut self, tool: NodeRef);
}

/// Random-access collection.
pub trait Indexable {
    fn len(&self) -> usize;
    fn item(&self, index: usize) -> Option<Value>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collection reachable only by iteration.
pub trait Iterable {
    fn items(&self) -> Box<dyn Iterator<Item = Value> + '_>;
}

/// Read/write script source used for custom behaviour.
pub trait ScriptHost {
    /// `None` when this host carries no script support at all.
    fn script_source(&self) -> Option<String>;
    fn set_script_source(&mut self, source: String) -> Result<(), Error>;
}

/// Helper for `Node::get` implementations rejecting unknown names.
pub fn unknown_property(type_name: &str, property: &str) -> Error {
    Error::new(ErrorKind::PathNotFound)
        .with_message(format!("type '{type_name}' has no property '{property}'"))
}

/// Helper for `Node::set` implementations rejecting read-only names.
pub fn read_only_property(type_name: &str, property: &str) -> Error {
    Error::new(ErrorKind::ReadOnlyProperty)
        .with_message(format!("property '{type_name}.{property}' is read-only"))
}

/// Helper for `Node::set` implementations rejecting mistyped values.
pub fn mismatched_value(property: &PropertyInfo, value: &Value) -> Error {
    Error::new(ErrorKind::TypeConversion).with_message(format!(
        "value {value:?} is not assignable to '{}' ({})",
        property.name,
        property.ty.display_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    static MODE: EnumType = EnumType {
        name: "Mode",
        members: &["Fast", "Accurate"],
    };

    struct Leaf;

    impl Node for Leaf {
        fn type_name(&self) -> &str {
            "Leaf"
        }

        fn properties(&self) -> Vec<PropertyInfo> {
            Vec::new()
        }

        fn get(&self, property: &str) -> Result<Value, Error> {
            Err(unknown_property("Leaf", property))
        }

        fn set(&mut self, property: &str, _value: Value) -> Result<(), Error> {
            Err(unknown_property("Leaf", property))
        }
    }

    #[test]
    fn enum_members_match_case_insensitively() {
        assert_eq!(MODE.position("accurate"), Some(1));
        assert_eq!(MODE.position("slow"), None);
    }

    #[test]
    fn property_types_accept_matching_values() {
        assert!(PropertyType::Float.accepts(&Value::Int(3)));
        assert!(!PropertyType::Int.accepts(&Value::Float(3.0)));
        assert!(PropertyType::Enum(&MODE).accepts(&Value::Enum(EnumValue { ty: &MODE, index: 0 })));
        assert!(PropertyType::Object("Leaf".into()).accepts(&Value::Node(node_ref(Leaf))));
        assert!(!PropertyType::Object("Image".into()).accepts(&Value::Node(node_ref(Leaf))));
        assert!(PropertyType::Object("Object".into()).accepts(&Value::Node(node_ref(Leaf))));
    }

    #[test]
    fn node_values_compare_by_identity() {
        let a = node_ref(Leaf);
        let b = node_ref(Leaf);
        assert_eq!(Value::Node(a.clone()), Value::Node(a.clone()));
        assert_ne!(Value::Node(a), Value::Node(b));
    }

    #[test]
    fn capabilities_default_to_absent() {
        let leaf = Leaf;
        assert!(leaf.as_named().is_none());
        assert!(leaf.as_tool_container().is_none());
        assert!(leaf.as_script_host().is_none());
    }
}
