//! Purpose: Apply literal values or cross-reference links to resolved properties.
//! Exports: `set`, `Assigned`, `LINK_SIGIL`.
//! Role: Mutation step of `vpp_set_property`; persistence is injected by the caller.
//! Invariants: Writability is checked before any conversion or link resolution.
//! Invariants: Links assign the source reference itself, never a copy.
//! Invariants: Success is reported only after persistence succeeds; no rollback.

use tracing::debug;

use crate::core::convert::convert_literal;
use crate::core::error::{Error, ErrorKind};
use crate::core::graph::Value;
use crate::core::path::{self, Resolved};
use crate::core::registry::Registry;

pub const LINK_SIGIL: char = '@';

#[derive(Clone, Debug, PartialEq)]
pub enum Assigned {
    /// Linked to the value found at `source` (`<node>.<path>`).
    Link { source: String },
    /// Literal converted to the property's declared type.
    Literal(Value),
}

/// Assigns `raw` to the property addressed by `target`, then runs `persist`.
///
/// `path` is only used to label errors.
pub fn set(
    registry: &Registry,
    target: &Resolved,
    path: &str,
    raw: &str,
    persist: impl FnOnce() -> Result<(), Error>,
) -> Result<Assigned, Error> {
    let (owner, property) = match target {
        Resolved::Property { owner, property } if property.writable => (owner, property),
        _ => {
            return Err(Error::new(ErrorKind::ReadOnlyProperty)
                .with_message(format!("Property '{path}' is read-only or invalid.")));
        }
    };

    let assigned = match raw.strip_prefix(LINK_SIGIL) {
        Some(source) => {
            let value = read_link_source(registry, source)?;
            owner.borrow_mut().set(&property.name, value)?;
            Assigned::Link {
                source: source.to_string(),
            }
        }
        None => {
            let value = convert_literal(raw, &property.ty)?;
            owner.borrow_mut().set(&property.name, value.clone())?;
            Assigned::Literal(value)
        }
    };
    debug!(property = %property.name, ?assigned, "property assigned");

    persist()?;
    Ok(assigned)
}

/// Reads the value a link source (`<node>[.<path>]`) points at.
pub fn read_link_source(registry: &Registry, source: &str) -> Result<Value, Error> {
    let (source_name, source_path) = source.split_once('.').unwrap_or((source, ""));
    let source_node = registry.lookup(source_name).ok_or_else(|| {
        Error::new(ErrorKind::NodeNotFound)
            .with_message(format!("Source tool '{source_name}' not found for linking."))
    })?;
    let resolved = path::resolve(&source_node, source_path).map_err(|_| {
        Error::new(ErrorKind::PathNotFound).with_message(format!(
            "Source property '{source_path}' not found on '{source_name}'."
        ))
    })?;
    resolved.read()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::{
        EnumType, Named, Node, NodeRef, PropertyInfo, PropertyType, mismatched_value, node_ref,
        read_only_property, same_node, unknown_property,
    };
    use std::cell::Cell;

    static SPEED: EnumType = EnumType {
        name: "Speed",
        members: &["Slow", "Fast"],
    };

    struct Image;

    impl Node for Image {
        fn type_name(&self) -> &str {
            "Image"
        }

        fn properties(&self) -> Vec<PropertyInfo> {
            Vec::new()
        }

        fn get(&self, property: &str) -> Result<Value, Error> {
            Err(unknown_property("Image", property))
        }

        fn set(&mut self, property: &str, _value: Value) -> Result<(), Error> {
            Err(unknown_property("Image", property))
        }
    }

    struct Tool {
        name: String,
        threshold: Value,
        speed: Value,
        input: Value,
        output: Value,
    }

    impl Tool {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                threshold: Value::Int(0),
                speed: Value::Null,
                input: Value::Null,
                output: Value::Node(node_ref(Image)),
            }
        }
    }

    impl Node for Tool {
        fn type_name(&self) -> &str {
            "Tool"
        }

        fn properties(&self) -> Vec<PropertyInfo> {
            vec![
                PropertyInfo::new("Threshold", PropertyType::Int, true),
                PropertyInfo::new("Speed", PropertyType::Enum(&SPEED), true),
                PropertyInfo::new("Input", PropertyType::Object("Image".into()), true),
                PropertyInfo::new("Output", PropertyType::Object("Image".into()), false),
            ]
        }

        fn get(&self, property: &str) -> Result<Value, Error> {
            match property {
                "Threshold" => Ok(self.threshold.clone()),
                "Speed" => Ok(self.speed.clone()),
                "Input" => Ok(self.input.clone()),
                "Output" => Ok(self.output.clone()),
                _ => Err(unknown_property("Tool", property)),
            }
        }

        fn set(&mut self, property: &str, value: Value) -> Result<(), Error> {
            let info = self
                .properties()
                .into_iter()
                .find(|info| info.name == property)
                .ok_or_else(|| unknown_property("Tool", property))?;
            if !info.writable {
                return Err(read_only_property("Tool", property));
            }
            if !info.ty.accepts(&value) {
                return Err(mismatched_value(&info, &value));
            }
            match property {
                "Threshold" => self.threshold = value,
                "Speed" => self.speed = value,
                _ => self.input = value,
            }
            Ok(())
        }

        fn as_named(&self) -> Option<&dyn Named> {
            Some(self)
        }
    }

    impl Named for Tool {
        fn name(&self) -> String {
            self.name.clone()
        }

        fn set_name(&mut self, name: &str) {
            self.name = name.to_string();
        }
    }

    fn setup() -> (Registry, NodeRef, NodeRef) {
        let a = node_ref(Tool::new("A"));
        let b = node_ref(Tool::new("B"));
        let mut registry = Registry::new();
        registry.insert_first("A", a.clone());
        registry.insert_first("B", b.clone());
        (registry, a, b)
    }

    #[test]
    fn literal_set_converts_and_persists_once() {
        let (registry, a, _) = setup();
        let saves = Cell::new(0);
        let target = path::resolve(&a, "threshold").expect("path");
        let assigned = set(&registry, &target, "threshold", "5", || {
            saves.set(saves.get() + 1);
            Ok(())
        })
        .expect("set");
        assert_eq!(assigned, Assigned::Literal(Value::Int(5)));
        assert_eq!(saves.get(), 1);
        assert_eq!(target.read().expect("read"), Value::Int(5));

        let target = path::resolve(&a, "Speed").expect("path");
        set(&registry, &target, "Speed", "fast", || Ok(())).expect("enum");
        assert_eq!(
            target.read().expect("read").literal_text().as_deref(),
            Some("Fast")
        );
    }

    #[test]
    fn link_assigns_the_same_reference() {
        let (registry, a, b) = setup();
        let target = path::resolve(&a, "Input").expect("path");
        let assigned = set(&registry, &target, "Input", "@b.Output", || Ok(())).expect("link");
        assert_eq!(
            assigned,
            Assigned::Link {
                source: "b.Output".into()
            }
        );

        let input = a.borrow().get("Input").expect("input");
        let output = b.borrow().get("Output").expect("output");
        assert!(same_node(
            input.as_node().expect("node"),
            output.as_node().expect("node")
        ));
    }

    #[test]
    fn read_only_and_root_targets_are_rejected_before_conversion() {
        let (registry, a, _) = setup();
        let saves = Cell::new(0);
        for path in ["Output", "."] {
            let target = path::resolve(&a, path).expect("path");
            let err = set(&registry, &target, path, "not-a-number", || {
                saves.set(saves.get() + 1);
                Ok(())
            })
            .expect_err(path);
            assert_eq!(err.kind(), ErrorKind::ReadOnlyProperty);
            assert!(err.to_string().contains("read-only or invalid"));
        }
        assert_eq!(saves.get(), 0);
    }

    #[test]
    fn conversion_and_link_failures_are_reported() {
        let (registry, a, _) = setup();
        let target = path::resolve(&a, "Threshold").expect("path");
        let err = set(&registry, &target, "Threshold", "abc", || Ok(())).expect_err("convert");
        assert_eq!(err.kind(), ErrorKind::TypeConversion);

        let target = path::resolve(&a, "Input").expect("path");
        let err = set(&registry, &target, "Input", "@Nope.Output", || Ok(())).expect_err("node");
        assert_eq!(err.kind(), ErrorKind::NodeNotFound);
        let err = set(&registry, &target, "Input", "@B.Missing", || Ok(())).expect_err("path");
        assert_eq!(err.kind(), ErrorKind::PathNotFound);
        let err = set(&registry, &target, "Input", "@B.Threshold", || Ok(())).expect_err("type");
        assert_eq!(err.kind(), ErrorKind::TypeConversion);
    }

    #[test]
    fn persistence_failure_is_surfaced_after_mutation() {
        let (registry, a, _) = setup();
        let target = path::resolve(&a, "Threshold").expect("path");
        let err = set(&registry, &target, "Threshold", "9", || {
            Err(Error::new(ErrorKind::Persistence).with_message("disk full"))
        })
        .expect_err("save");
        assert_eq!(err.kind(), ErrorKind::Persistence);
        // In-memory state already changed.
        assert_eq!(target.read().expect("read"), Value::Int(9));
    }
}
