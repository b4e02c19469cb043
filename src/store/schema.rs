use crate::{MapError, Result};
use serde::{Deserialize, Serialize};

/// Value kind of a schema column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Real,
    Integer,
    String,
    Date,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::Real => write!(f, "real"),
            FieldKind::Integer => write!(f, "integer"),
            FieldKind::String => write!(f, "string"),
            FieldKind::Date => write!(f, "date"),
        }
    }
}

/// A typed attribute value. `Date` carries unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Real(f64),
    Integer(i64),
    String(String),
    Date(i64),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Real(_) => FieldKind::Real,
            FieldValue::Integer(_) => FieldKind::Integer,
            FieldValue::String(_) => FieldKind::String,
            FieldValue::Date(_) => FieldKind::Date,
        }
    }
}

/// A schema column: name, display alias, value kind, nullability and an
/// optional default applied when an inserted record leaves the field unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub alias: String,
    pub kind: FieldKind,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<FieldValue>,
}

fn default_nullable() -> bool {
    true
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
            kind,
            nullable: true,
            default: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, value: FieldValue) -> Self {
        self.default = Some(value);
        self
    }
}

/// Validates a field sequence: names must be unique and non-empty, and a
/// field's default must agree with its kind.
pub fn validate_fields(fields: &[Field]) -> Result<()> {
    let mut seen = crate::prelude::HashSet::default();
    for field in fields {
        if field.name.is_empty() {
            return Err(MapError::InvalidSchema("empty field name".to_string()));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(MapError::InvalidSchema(format!(
                "duplicate field name {:?}",
                field.name
            )));
        }
        if let Some(default) = &field.default {
            if default.kind() != field.kind {
                return Err(MapError::InvalidSchema(format!(
                    "field {:?} is {} but its default is {}",
                    field.name,
                    field.kind,
                    default.kind()
                )));
            }
        }
    }
    Ok(())
}
