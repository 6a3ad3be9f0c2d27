//! Purpose: Generic parameterised vision tool driven by a static `ToolDef`.
//! Exports: `ToolDef`, `FieldDef`, `FieldKind`, `Initial`, `Tool`, `RunParams`.
//! Role: Every leaf tool type in the catalog is an instance of `Tool`.
//! Invariants: Property order and types come from the definition, never from data.
//! Invariants: `set` enforces writability and declared type before storing.

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::error::Error;
use crate::core::graph::{
    EnumType, EnumValue, Named, Node, NodeRef, PropertyInfo, PropertyType, Value,
    mismatched_value, node_ref, read_only_property, unknown_property,
};
use crate::model::nodes::{IMAGE_TYPE, Image};
use crate::model::share;

#[derive(Debug)]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    Text,
    Enum(&'static EnumType),
    Image,
}

impl FieldKind {
    pub fn property_type(&self) -> PropertyType {
        match self {
            FieldKind::Bool => PropertyType::Bool,
            FieldKind::Int => PropertyType::Int,
            FieldKind::Float => PropertyType::Float,
            FieldKind::Text => PropertyType::Text,
            FieldKind::Enum(ty) => PropertyType::Enum(*ty),
            FieldKind::Image => PropertyType::Object(IMAGE_TYPE.to_string()),
        }
    }
}

/// Value a field starts with on construction.
#[derive(Debug)]
pub enum Initial {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(&'static str),
    Enum(usize),
    Image { width: i64, height: i64 },
}

#[derive(Debug)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    pub writable: bool,
    pub initial: Initial,
}

impl FieldDef {
    pub fn info(&self) -> PropertyInfo {
        PropertyInfo::new(self.name, self.kind.property_type(), self.writable)
    }

    fn initial_value(&self) -> Value {
        match (&self.initial, &self.kind) {
            (Initial::Null, _) => Value::Null,
            (Initial::Bool(value), _) => Value::Bool(*value),
            (Initial::Int(value), _) => Value::Int(*value),
            (Initial::Float(value), _) => Value::Float(*value),
            (Initial::Text(value), _) => Value::Text((*value).to_string()),
            (Initial::Enum(index), FieldKind::Enum(ty)) => Value::Enum(EnumValue {
                ty: *ty,
                index: *index,
            }),
            (Initial::Enum(_), _) => Value::Null,
            (Initial::Image { width, height }, _) => {
                Value::Node(node_ref(Image::new(*width, *height)))
            }
        }
    }
}

#[derive(Debug)]
pub struct ToolDef {
    pub type_name: &'static str,
    /// Unit the type ships in, e.g. `Cognex.VisionPro.Blob`.
    pub unit: &'static str,
    pub fields: &'static [FieldDef],
    pub run_params: &'static [FieldDef],
}

impl ToolDef {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.unit, self.type_name)
    }

    pub fn instantiate(&'static self) -> NodeRef {
        node_ref(Tool::new(self))
    }

    fn run_params_type(&self) -> String {
        format!("{}RunParams", self.type_name)
    }
}

/// Typed values keyed by a static field list.
struct Fields {
    defs: &'static [FieldDef],
    values: Vec<Value>,
}

impl Fields {
    fn new(defs: &'static [FieldDef]) -> Self {
        Self {
            defs,
            values: defs.iter().map(FieldDef::initial_value).collect(),
        }
    }

    fn infos(&self) -> impl Iterator<Item = PropertyInfo> + '_ {
        self.defs.iter().map(FieldDef::info)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.defs.iter().position(|def| def.name == name)
    }

    fn get(&self, name: &str) -> Option<Value> {
        self.position(name).map(|slot| self.values[slot].clone())
    }

    /// `Ok(false)` when no field has this name.
    fn set(&mut self, owner: &str, name: &str, value: Value) -> Result<bool, Error> {
        let Some(slot) = self.position(name) else {
            return Ok(false);
        };
        let def = &self.defs[slot];
        if !def.writable {
            return Err(read_only_property(owner, name));
        }
        let info = def.info();
        if !info.ty.accepts(&value) {
            return Err(mismatched_value(&info, &value));
        }
        self.values[slot] = match (&def.kind, value) {
            (FieldKind::Float, Value::Int(value)) => Value::Float(value as f64),
            (_, value) => value,
        };
        Ok(true)
    }
}

/// Nested run-parameter set exposed as `RunParams`.
pub struct RunParams {
    type_name: String,
    fields: Fields,
}

impl Node for RunParams {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn properties(&self) -> Vec<PropertyInfo> {
        self.fields.infos().collect()
    }

    fn get(&self, property: &str) -> Result<Value, Error> {
        self.fields
            .get(property)
            .ok_or_else(|| unknown_property(&self.type_name, property))
    }

    fn set(&mut self, property: &str, value: Value) -> Result<(), Error> {
        if self.fields.set(&self.type_name, property, value)? {
            Ok(())
        } else {
            Err(unknown_property(&self.type_name, property))
        }
    }
}

pub struct Tool {
    def: &'static ToolDef,
    name: String,
    fields: Fields,
    run_params: Option<Rc<RefCell<RunParams>>>,
}

impl Tool {
    pub fn new(def: &'static ToolDef) -> Self {
        let run_params = (!def.run_params.is_empty()).then(|| {
            Rc::new(RefCell::new(RunParams {
                type_name: def.run_params_type(),
                fields: Fields::new(def.run_params),
            }))
        });
        Self {
            def,
            name: format!("{}1", def.type_name),
            fields: Fields::new(def.fields),
            run_params,
        }
    }

    pub fn def(&self) -> &'static ToolDef {
        self.def
    }
}

impl Node for Tool {
    fn type_name(&self) -> &str {
        self.def.type_name
    }

    fn properties(&self) -> Vec<PropertyInfo> {
        let mut properties = vec![PropertyInfo::new("Name", PropertyType::Text, true)];
        properties.extend(self.fields.infos());
        if self.run_params.is_some() {
            properties.push(PropertyInfo::new(
                "RunParams",
                PropertyType::Object(self.def.run_params_type()),
                false,
            ));
        }
        properties
    }

    fn get(&self, property: &str) -> Result<Value, Error> {
        match property {
            "Name" => Ok(Value::Text(self.name.clone())),
            "RunParams" => self
                .run_params
                .as_ref()
                .map(|params| Value::Node(share(params)))
                .ok_or_else(|| unknown_property(self.def.type_name, property)),
            _ => self
                .fields
                .get(property)
                .ok_or_else(|| unknown_property(self.def.type_name, property)),
        }
    }

    fn set(&mut self, property: &str, value: Value) -> Result<(), Error> {
        match property {
            "Name" => match value {
                Value::Text(name) => {
                    self.name = name;
                    Ok(())
                }
                other => Err(mismatched_value(
                    &PropertyInfo::new("Name", PropertyType::Text, true),
                    &other,
                )),
            },
            "RunParams" if self.run_params.is_some() => {
                Err(read_only_property(self.def.type_name, property))
            }
            _ => {
                if self.fields.set(self.def.type_name, property, value)? {
                    Ok(())
                } else {
                    Err(unknown_property(self.def.type_name, property))
                }
            }
        }
    }

    fn as_named(&self) -> Option<&dyn Named> {
        Some(self)
    }

    fn as_named_mut(&mut self) -> Option<&mut dyn Named> {
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
