//! Purpose: Render a bounded-depth table of a node's public properties.
//! Exports: `dump`, `render_value`, `DEFAULT_MAX_DEPTH`.
//! Role: Diagnostic view returned by `get` when a path lands on an object.
//! Invariants: Never fails on a single property; read errors render as `<Err>`.
//! Invariants: Recursion happens only through allowlisted parameter properties.

use std::fmt::Write as _;

use crate::core::graph::{NodeRef, PropertyInfo, Value};

pub const DEFAULT_MAX_DEPTH: usize = 1;

const RULE_WIDTH: usize = 60;
const SKIPPED_SUFFIX: &str = "Changed";
const SKIPPED_NAMES: &[&str] = &["Tag", "Parent"];
const NESTED_NAMES: &[&str] = &["RunParams", "Operator", "Operators"];

pub fn dump(node: &NodeRef, max_depth: usize) -> String {
    let mut out = String::new();
    let type_name = node.borrow().type_name().to_string();
    let rule = "-".repeat(RULE_WIDTH);
    let _ = writeln!(out, "[Structure: {type_name}]");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "{:<35} | {:<15} | {}", "Property Name", "Type", "Value/Detail");
    let _ = writeln!(out, "{rule}");
    append_rows(&mut out, node, 0, max_depth);
    out
}

fn append_rows(out: &mut String, node: &NodeRef, depth: usize, max_depth: usize) {
    if depth > max_depth {
        return;
    }
    let mut properties: Vec<PropertyInfo> = node
        .borrow()
        .properties()
        .into_iter()
        .filter(|property| !is_skipped(&property.name))
        .collect();
    properties.sort_by(|a, b| a.name.cmp(&b.name));

    let indent = "  ".repeat(depth);
    for property in properties {
        let read = node.borrow().get(&property.name);
        let detail = match &read {
            Ok(value) => render_value(value, &property),
            Err(_) => "<Err>".to_string(),
        };
        let label = format!("{indent}{}", property.name);
        let _ = writeln!(
            out,
            "{label:<35} | {:<15} | {detail}",
            property.ty.display_name()
        );

        if depth < max_depth && NESTED_NAMES.contains(&property.name.as_str()) {
            if let Ok(Value::Node(child)) = read {
                append_rows(out, &child, depth + 1, max_depth);
            }
        }
    }
}

/// One-cell rendering: literal text, element count, or type placeholder.
pub fn render_value(value: &Value, property: &PropertyInfo) -> String {
    if let Some(text) = value.literal_text() {
        return text;
    }
    let Value::Node(node) = value else {
        return String::new();
    };
    let Ok(borrowed) = node.try_borrow() else {
        return "<Err>".to_string();
    };
    if let Some(indexable) = borrowed.as_indexable() {
        return format!("[Count={}]", indexable.len());
    }
    if let Some(iterable) = borrowed.as_iterable() {
        return format!("[Count={}]", iterable.items().count());
    }
    format!("<{}>", property.ty.display_name())
}

fn is_skipped(name: &str) -> bool {
    name.ends_with(SKIPPED_SUFFIX) || SKIPPED_NAMES.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{Error, ErrorKind};
    use crate::core::graph::{Indexable, Node, PropertyType, node_ref, unknown_property};

    struct Params {
        gain: f64,
        inner: Option<NodeRef>,
    }

    impl Node for Params {
        fn type_name(&self) -> &str {
            "Params"
        }

        fn properties(&self) -> Vec<PropertyInfo> {
            vec![
                PropertyInfo::new("Gain", PropertyType::Float, true),
                PropertyInfo::new("RunParams", PropertyType::Object("Params".into()), false),
            ]
        }

        fn get(&self, property: &str) -> Result<Value, Error> {
            match property {
                "Gain" => Ok(Value::Float(self.gain)),
                "RunParams" => Ok(self.inner.clone().map(Value::Node).unwrap_or(Value::Null)),
                _ => Err(unknown_property("Params", property)),
            }
        }

        fn set(&mut self, property: &str, _value: Value) -> Result<(), Error> {
            Err(unknown_property("Params", property))
        }
    }

    struct Items(usize);

    impl Node for Items {
        fn type_name(&self) -> &str {
            "Items"
        }

        fn properties(&self) -> Vec<PropertyInfo> {
            Vec::new()
        }

        fn get(&self, property: &str) -> Result<Value, Error> {
            Err(unknown_property("Items", property))
        }

        fn set(&mut self, property: &str, _value: Value) -> Result<(), Error> {
            Err(unknown_property("Items", property))
        }

        fn as_indexable(&self) -> Option<&dyn Indexable> {
            Some(self)
        }
    }

    impl Indexable for Items {
        fn len(&self) -> usize {
            self.0
        }

        fn item(&self, _index: usize) -> Option<Value> {
            None
        }
    }

    struct Sample {
        run_params: NodeRef,
        items: NodeRef,
    }

    impl Node for Sample {
        fn type_name(&self) -> &str {
            "Sample"
        }

        fn properties(&self) -> Vec<PropertyInfo> {
            vec![
                PropertyInfo::new("Zeta", PropertyType::Text, true),
                PropertyInfo::new("Alpha", PropertyType::Int, true),
                PropertyInfo::new("Broken", PropertyType::Int, false),
                PropertyInfo::new("Parent", PropertyType::Object("Sample".into()), false),
                PropertyInfo::new("Tag", PropertyType::Text, true),
                PropertyInfo::new("NameChanged", PropertyType::Bool, false),
                PropertyInfo::new("Items", PropertyType::Object("Items".into()), false),
                PropertyInfo::new("Image", PropertyType::Object("CogImage".into()), true),
                PropertyInfo::new("Other", PropertyType::Object("Params".into()), false),
                PropertyInfo::new("RunParams", PropertyType::Object("Params".into()), false),
            ]
        }

        fn get(&self, property: &str) -> Result<Value, Error> {
            match property {
                "Zeta" => Ok(Value::Text("z".into())),
                "Alpha" => Ok(Value::Int(1)),
                "Broken" => Err(Error::new(ErrorKind::Internal)),
                "Items" => Ok(Value::Node(self.items.clone())),
                "Image" => Ok(Value::Null),
                "Other" | "RunParams" => Ok(Value::Node(self.run_params.clone())),
                _ => Err(unknown_property("Sample", property)),
            }
        }

        fn set(&mut self, property: &str, _value: Value) -> Result<(), Error> {
            Err(unknown_property("Sample", property))
        }
    }

    fn sample() -> NodeRef {
        let deepest = node_ref(Params {
            gain: 9.0,
            inner: None,
        });
        let run_params = node_ref(Params {
            gain: 0.5,
            inner: Some(deepest),
        });
        node_ref(Sample {
            run_params,
            items: node_ref(Items(3)),
        })
    }

    #[test]
    fn header_names_runtime_type_and_rows_are_sorted() {
        let report = dump(&sample(), DEFAULT_MAX_DEPTH);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], "[Structure: Sample]");
        assert_eq!(lines[1], "-".repeat(60));
        assert!(lines[2].starts_with("Property Name"));

        let names: Vec<&str> = lines[4..]
            .iter()
            .filter(|line| !line.starts_with(' '))
            .map(|line| line.split(" | ").next().unwrap_or("").trim())
            .collect();
        assert_eq!(
            names,
            vec!["Alpha", "Broken", "Image", "Items", "Other", "RunParams", "Zeta"]
        );
    }

    #[test]
    fn values_render_by_kind() {
        let report = dump(&sample(), DEFAULT_MAX_DEPTH);
        assert!(report.contains(&format!("{:<35} | {:<15} | 1", "Alpha", "i64")));
        assert!(report.contains("| <Err>"));
        assert!(report.contains("| [Count=3]"));
        assert!(report.contains(&format!("{:<35} | {:<15} | null", "Image", "CogImage")));
        assert!(report.contains("| <Params>"));
        assert!(!report.contains("Tag "));
        assert!(!report.contains("NameChanged"));
    }

    #[test]
    fn nested_rows_only_for_allowlisted_names_within_depth() {
        let report = dump(&sample(), DEFAULT_MAX_DEPTH);
        let nested: Vec<&str> = report.lines().filter(|line| line.starts_with("  ")).collect();
        // RunParams expands one level; its own RunParams does not expand further.
        assert_eq!(nested.len(), 2);
        assert!(nested[0].starts_with("  Gain"));
        assert!(nested[0].ends_with("| 0.5"));

        let flat = dump(&sample(), 0);
        assert!(!flat.lines().any(|line| line.starts_with("  ")));
    }
}
