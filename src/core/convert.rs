//! Purpose: Best-effort text-to-value conversion for literal property assignments.
//! Exports: `convert_literal`, `ConversionError`.
//! Role: Used by the mutation engine and by the store when restoring saved values.
//! Invariants: Converters run in a fixed order: enum member, bool, int, float, text.
//! Invariants: Object-typed properties never accept literal text.
use std::fmt;

use crate::core::error::{Error, ErrorKind};
use crate::core::graph::{EnumValue, PropertyType, Value};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConversionError {
    UnknownEnumMember { ty: &'static str, raw: String },
    InvalidBool(String),
    InvalidInt(String),
    InvalidFloat(String),
    NotLiteral { ty: String },
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionError::UnknownEnumMember { ty, raw } => {
                write!(f, "'{raw}' is not a member of {ty}")
            }
            ConversionError::InvalidBool(raw) => write!(f, "'{raw}' is not a valid boolean"),
            ConversionError::InvalidInt(raw) => write!(f, "'{raw}' is not a valid integer"),
            ConversionError::InvalidFloat(raw) => write!(f, "'{raw}' is not a valid number"),
            ConversionError::NotLiteral { ty } => {
                write!(f, "values of type {ty} cannot be set from text")
            }
        }
    }
}

impl std::error::Error for ConversionError {}

impl From<ConversionError> for Error {
    fn from(err: ConversionError) -> Self {
        Error::new(ErrorKind::TypeConversion).with_message(err.to_string())
    }
}

/// Converts `raw` into a value assignable to `ty`. Converters are tried in
/// order: enum by member name, boolean, integer, float, string passthrough.
pub fn convert_literal(raw: &str, ty: &PropertyType) -> Result<Value, ConversionError> {
    match ty {
        PropertyType::Enum(enum_type) => enum_type
            .position(raw.trim())
            .map(|index| {
                Value::Enum(EnumValue {
                    ty: *enum_type,
                    index,
                })
            })
            .ok_or_else(|| ConversionError::UnknownEnumMember {
                ty: enum_type.name,
                raw: raw.to_string(),
            }),
        PropertyType::Bool => parse_bool(raw)
            .map(Value::Bool)
            .ok_or_else(|| ConversionError::InvalidBool(raw.to_string())),
        PropertyType::Int => raw
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| ConversionError::InvalidInt(raw.to_string())),
        PropertyType::Float => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(Value::Float)
            .ok_or_else(|| ConversionError::InvalidFloat(raw.to_string())),
        PropertyType::Text => Ok(Value::Text(raw.to_string())),
        PropertyType::Object(name) => Err(ConversionError::NotLiteral { ty: name.clone() }),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Some(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
