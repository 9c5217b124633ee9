//! Record validator
//!
//! The only place payload shape is enforced. A payload is accepted when it is
//! a JSON object carrying every field of [`REQUIRED_FIELDS`] with a value of
//! the declared kind; anything else is rejected as a whole. `id` and
//! `timestamp` are filled in only when absent.

use std::fmt;

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{error::ValidationError, record::Record};

/// Semantic type expected for a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Any JSON number
    Number,
    /// Non-negative integer
    Count,
    /// JSON string
    Text,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Number => write!(f, "number"),
            FieldKind::Count => write!(f, "non-negative integer"),
            FieldKind::Text => write!(f, "string"),
        }
    }
}

impl FieldKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::Number => value.is_number(),
            FieldKind::Count => value.as_u64().is_some(),
            FieldKind::Text => value.is_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

/// Fields every accepted payload must carry
pub const REQUIRED_FIELDS: [FieldSpec; 12] = [
    field("total_ram", FieldKind::Number),
    field("ram_free", FieldKind::Number),
    field("ram_used", FieldKind::Number),
    field("ram_percent", FieldKind::Number),
    field("cpu_used_percent", FieldKind::Number),
    field("cpu_free_percent", FieldKind::Number),
    field("processes_running", FieldKind::Count),
    field("processes_total", FieldKind::Count),
    field("processes_sleeping", FieldKind::Count),
    field("processes_zombie", FieldKind::Count),
    field("processes_stopped", FieldKind::Count),
    field("hour", FieldKind::Text),
];

/// Keys that only exist on the wire towards the destination
pub const DELIVERY_FIELDS: [&str; 2] = ["api", "load_balancer"];

/// Validate a raw payload and turn it into a [`Record`]
pub fn validate(payload: Value) -> Result<Record, ValidationError> {
    let Value::Object(mut map) = payload else {
        return Err(ValidationError::NotAnObject);
    };

    let missing: Vec<&'static str> = REQUIRED_FIELDS
        .iter()
        .filter(|spec| !map.contains_key(spec.name))
        .map(|spec| spec.name)
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingFields(missing));
    }

    for spec in &REQUIRED_FIELDS {
        if !spec.kind.accepts(&map[spec.name]) {
            return Err(ValidationError::WrongType {
                field: spec.name,
                expected: spec.kind,
            });
        }
    }

    assign_if_absent(&mut map, "id", || Uuid::new_v4().to_string())?;
    assign_if_absent(&mut map, "timestamp", || Utc::now().to_rfc3339())?;

    for key in DELIVERY_FIELDS {
        map.remove(key);
    }

    Ok(serde_json::from_value(Value::Object(map))?)
}

/// Parse a JSON body and validate it
pub fn validate_str(body: &str) -> Result<Record, ValidationError> {
    validate(serde_json::from_str(body)?)
}

fn assign_if_absent(
    map: &mut Map<String, Value>,
    key: &'static str,
    default: impl FnOnce() -> String,
) -> Result<(), ValidationError> {
    match map.get(key) {
        None | Some(Value::Null) => {
            map.insert(key.to_string(), Value::String(default()));
            Ok(())
        }
        Some(Value::String(_)) => Ok(()),
        Some(_) => Err(ValidationError::WrongType {
            field: key,
            expected: FieldKind::Text,
        }),
    }
}
