//! Purpose: Resolve dotted, optionally indexed paths against graph nodes.
//! Exports: `resolve`, `Resolved`, `find_property`.
//! Role: Pure navigation shared by get, set and link resolution.
//! Invariants: Resolution runs left to right and fails closed on the first bad segment.
//! Invariants: An indexed final segment yields an object, never a property handle.

use std::fmt;

use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::graph::{NodeRef, PropertyInfo, Value};

/// Terminal of a successful resolution.
#[derive(Clone)]
pub enum Resolved {
    /// The root itself, or an indexed element.
    Object(Value),
    /// A property on `owner`.
    Property { owner: NodeRef, property: PropertyInfo },
}

impl Resolved {
    /// Reads the addressed value: the property's value, or the object itself.
    pub fn read(&self) -> Result<Value, Error> {
        match self {
            Resolved::Object(value) => Ok(value.clone()),
            Resolved::Property { owner, property } => owner.borrow().get(&property.name),
        }
    }

    pub fn property(&self) -> Option<&PropertyInfo> {
        match self {
            Resolved::Object(_) => None,
            Resolved::Property { property, .. } => Some(property),
        }
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolved::Object(value) => f.debug_tuple("Object").field(value).finish(),
            Resolved::Property { property, .. } => f
                .debug_struct("Property")
                .field("property", &property.name)
                .finish_non_exhaustive(),
        }
    }
}

/// Case-insensitive lookup of a public property on `node`.
pub fn find_property(node: &NodeRef, name: &str) -> Option<PropertyInfo> {
    node.borrow()
        .properties()
        .into_iter()
        .find(|property| property.name.eq_ignore_ascii_case(name))
}

pub fn resolve(root: &NodeRef, path: &str) -> Result<Resolved, Error> {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == "." {
        return Ok(Resolved::Object(Value::Node(root.clone())));
    }

    let segments: Vec<&str> = trimmed.split('.').filter(|part| !part.is_empty()).collect();
    if segments.is_empty() {
        return Ok(Resolved::Object(Value::Node(root.clone())));
    }

    let mut current = root.clone();
    let last = segments.len() - 1;
    for (position, segment) in segments.iter().enumerate() {
        if let Some((name, index)) = split_indexed(segment) {
            let element = indexed_element(&current, name, index)
                .ok_or_else(|| not_found(path, segment))?;
            if position == last {
                return Ok(Resolved::Object(element));
            }
            current = match element {
                Value::Node(node) => node,
                _ => return Err(not_found(path, segment)),
            };
            continue;
        }

        let property = find_property(&current, segment).ok_or_else(|| not_found(path, segment))?;
        if position == last {
            return Ok(Resolved::Property {
                owner: current,
                property,
            });
        }
        let next = current
            .borrow()
            .get(&property.name)
            .map_err(|_| not_found(path, segment))?;
        current = match next {
            Value::Node(node) => node,
            _ => return Err(not_found(path, segment)),
        };
    }

    Ok(Resolved::Object(Value::Node(current)))
}

fn split_indexed(segment: &str) -> Option<(&str, &str)> {
    if !segment.ends_with(']') {
        return None;
    }
    let open = segment.find('[')?;
    Some((&segment[..open], &segment[open + 1..segment.len() - 1]))
}

fn indexed_element(current: &NodeRef, name: &str, raw_index: &str) -> Option<Value> {
    let index: usize = raw_index.trim().parse().ok()?;
    let property = find_property(current, name)?;
    let collection = current.borrow().get(&property.name).ok()?;
    let collection = collection.as_node()?.clone();
    let collection = collection.borrow();

    let found = if let Some(indexable) = collection.as_indexable() {
        if index < indexable.len() {
            indexable.item(index)
        } else {
            None
        }
    } else if let Some(iterable) = collection.as_iterable() {
        iterable.items().nth(index)
    } else {
        None
    };

    found.filter(|value| !value.is_null())
}

fn not_found(path: &str, segment: &str) -> Error {
    debug!(path, segment, "path segment did not resolve");
    Error::new(ErrorKind::PathNotFound)
        .with_message(format!("Path '{path}' not found on target tool."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::{
        Indexable, Iterable, Node, PropertyType, node_ref, same_node, unknown_property,
    };

    struct Bag {
        items: Vec<NodeRef>,
    }

    impl Node for Bag {
        fn type_name(&self) -> &str {
            "Bag"
        }

        fn properties(&self) -> Vec<PropertyInfo> {
            Vec::new()
        }

        fn get(&self, property: &str) -> Result<Value, Error> {
            Err(unknown_property("Bag", property))
        }

        fn set(&mut self, property: &str, _value: Value) -> Result<(), Error> {
            Err(unknown_property("Bag", property))
        }

        fn as_iterable(&self) -> Option<&dyn Iterable> {
            Some(self)
        }
    }

    impl Iterable for Bag {
        fn items(&self) -> Box<dyn Iterator<Item = Value> + '_> {
            Box::new(self.items.iter().cloned().map(Value::Node))
        }
    }

    struct List {
        items: Vec<NodeRef>,
    }

    impl Node for List {
        fn type_name(&self) -> &str {
            "List"
        }

        fn properties(&self) -> Vec<PropertyInfo> {
            vec![PropertyInfo::new("Count", PropertyType::Int, false)]
        }

        fn get(&self, property: &str) -> Result<Value, Error> {
            match property {
                "Count" => Ok(Value::Int(self.items.len() as i64)),
                _ => Err(unknown_property("List", property)),
            }
        }

        fn set(&mut self, property: &str, _value: Value) -> Result<(), Error> {
            Err(unknown_property("List", property))
        }

        fn as_indexable(&self) -> Option<&dyn Indexable> {
            Some(self)
        }
    }

    impl Indexable for List {
        fn len(&self) -> usize {
            self.items.len()
        }

        fn item(&self, index: usize) -> Option<Value> {
            self.items.get(index).cloned().map(Value::Node)
        }
    }

    struct Thing {
        threshold: i64,
        child: Option<NodeRef>,
        children: NodeRef,
        bag: NodeRef,
    }

    impl Thing {
        fn new(children: Vec<NodeRef>) -> Self {
            Self {
                threshold: 7,
                child: None,
                bag: node_ref(Bag {
                    items: children.clone(),
                }),
                children: node_ref(List { items: children }),
            }
        }
    }

    impl Node for Thing {
        fn type_name(&self) -> &str {
            "Thing"
        }

        fn properties(&self) -> Vec<PropertyInfo> {
            vec![
                PropertyInfo::new("Threshold", PropertyType::Int, true),
                PropertyInfo::new("Child", PropertyType::Object("Thing".into()), true),
                PropertyInfo::new("Children", PropertyType::Object("List".into()), false),
                PropertyInfo::new("Bag", PropertyType::Object("Bag".into()), false),
            ]
        }

        fn get(&self, property: &str) -> Result<Value, Error> {
            match property {
                "Threshold" => Ok(Value::Int(self.threshold)),
                "Child" => Ok(self.child.clone().map(Value::Node).unwrap_or(Value::Null)),
                "Children" => Ok(Value::Node(self.children.clone())),
                "Bag" => Ok(Value::Node(self.bag.clone())),
                _ => Err(unknown_property("Thing", property)),
            }
        }

        fn set(&mut self, property: &str, value: Value) -> Result<(), Error> {
            match (property, value) {
                ("Threshold", Value::Int(value)) => {
                    self.threshold = value;
                    Ok(())
                }
                _ => Err(unknown_property("Thing", property)),
            }
        }
    }

    fn tree() -> (NodeRef, NodeRef, NodeRef) {
        let first = node_ref(Thing::new(Vec::new()));
        let second = node_ref(Thing::new(Vec::new()));
        let root = node_ref(Thing::new(vec![first.clone(), second.clone()]));
        (root, first, second)
    }

    #[test]
    fn root_paths_resolve_to_the_root_object() {
        let (root, _, _) = tree();
        for path in ["", ".", "  "] {
            match resolve(&root, path).expect("resolves") {
                Resolved::Object(Value::Node(node)) => assert!(same_node(&node, &root)),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn plain_segment_yields_property_handle_case_insensitively() {
        let (root, _, _) = tree();
        let resolved = resolve(&root, "threshold").expect("resolves");
        assert_eq!(resolved.property().map(|p| p.name.as_str()), Some("Threshold"));
        assert_eq!(resolved.read().expect("read"), Value::Int(7));
    }

    #[test]
    fn stray_separators_are_ignored() {
        let (root, _, _) = tree();
        let resolved = resolve(&root, "..Children[1]..Threshold").expect("resolves");
        assert_eq!(resolved.read().expect("read"), Value::Int(7));
    }

    #[test]
    fn indexed_final_segment_returns_the_element_object() {
        let (root, first, _) = tree();
        match resolve(&root, "Children[0]").expect("resolves") {
            Resolved::Object(Value::Node(node)) => assert!(same_node(&node, &first)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn iterable_collections_are_scanned_linearly() {
        let (root, _, second) = tree();
        match resolve(&root, "Bag[1]").expect("resolves") {
            Resolved::Object(Value::Node(node)) => assert!(same_node(&node, &second)),
            other => panic!("unexpected {other:?}"),
        }
        assert!(resolve(&root, "Bag[2]").is_err());
    }

    #[test]
    fn failures_are_uniform_path_not_found() {
        let (root, _, _) = tree();
        for path in [
            "Children[99]",
            "Children[x]",
            "Missing",
            "Child.Threshold",
            "Threshold.Deeper",
            "Missing[0]",
            "Threshold[0]",
        ] {
            let err = resolve(&root, path).expect_err(path);
            assert_eq!(err.kind(), ErrorKind::PathNotFound, "{path}");
        }
    }
}
