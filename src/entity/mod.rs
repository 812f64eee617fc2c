//! Target entity model for the sync consumer.
//!
//! Inbound change events carry a flat JSON object. [`EntitySchema`] decides
//! which keys are persisted and how each value is coerced into a column.
//! Keys outside the schema are dropped and reported back to the caller.

use serde_json::{Map, Value};

use crate::outbox::codec::PayloadError;

/// Comment recorded when a create event targets an existing natural key.
pub const CONFLICT_COMMENT: &str = "User already exists in DB.";

/// Storage kind of an entity column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Boolean,
}

#[derive(Debug, Clone, Copy)]
pub struct EntityColumn {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn text(name: &'static str) -> EntityColumn {
    EntityColumn {
        name,
        kind: ColumnKind::Text,
    }
}

const fn boolean(name: &'static str) -> EntityColumn {
    EntityColumn {
        name,
        kind: ColumnKind::Boolean,
    }
}

/// Table layout of a synced entity.
#[derive(Debug)]
pub struct EntitySchema {
    pub table: &'static str,
    /// Unique business key, always a text column.
    pub natural_key: &'static str,
    pub columns: &'static [EntityColumn],
}

/// The `user_detail` table kept in sync from the identity service.
pub static USER_DETAIL: EntitySchema = EntitySchema {
    table: "user_detail",
    natural_key: "username",
    columns: &[
        text("password"),
        text("last_login"),
        boolean("is_superuser"),
        text("username"),
        text("first_name"),
        text("last_name"),
        text("email"),
        boolean("is_staff"),
        boolean("is_active"),
        text("date_joined"),
        text("user_type"),
        text("middle_name"),
        text("gender"),
        text("phone_no"),
        text("password_to_know"),
        text("profile_img"),
        text("session"),
        text("semester"),
        text("stream"),
        text("course"),
        text("dob"),
        text("nationality"),
        text("address"),
        boolean("is_deleted"),
        text("registered_on"),
        text("updated_at"),
        text("deleted_at"),
    ],
};

/// A typed column value; `None` maps to SQL NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnValue {
    Text(Option<String>),
    Boolean(Option<bool>),
}

impl From<ColumnValue> for sea_query::Value {
    fn from(value: ColumnValue) -> Self {
        match value {
            ColumnValue::Text(v) => v.into(),
            ColumnValue::Boolean(v) => v.into(),
        }
    }
}

/// Entity field values keyed by natural key.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRow {
    pub natural_key: String,
    /// Persisted columns in schema order, natural key included.
    pub values: Vec<(&'static str, ColumnValue)>,
}

impl EntityRow {
    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.values
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
    }

    /// Text value of a column, if present and non-null.
    pub fn text(&self, column: &str) -> Option<&str> {
        match self.get(column) {
            Some(ColumnValue::Text(Some(v))) => Some(v.as_str()),
            _ => None,
        }
    }
}

/// Result of mapping a payload onto a schema.
#[derive(Debug)]
pub struct MappedPayload {
    pub row: EntityRow,
    /// Payload keys with no matching column.
    pub dropped: Vec<String>,
}

impl EntitySchema {
    pub fn column(&self, name: &str) -> Option<&EntityColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Map a decoded payload onto the schema's columns.
    ///
    /// Only keys present in the payload become values, so the row doubles as
    /// a partial update.
    pub fn map_payload(&self, payload: &Map<String, Value>) -> Result<MappedPayload, PayloadError> {
        let natural_key = match payload.get(self.natural_key) {
            Some(Value::String(key)) if !key.is_empty() => key.clone(),
            _ => return Err(PayloadError::MissingNaturalKey(self.natural_key.to_string())),
        };

        let mut values = Vec::new();
        let mut dropped = Vec::new();
        for (key, value) in payload {
            match self.column(key) {
                Some(column) => values.push((column.name, coerce(column, value)?)),
                None => dropped.push(key.clone()),
            }
        }
        values.sort_by_key(|(name, _)| self.position(name));

        Ok(MappedPayload {
            row: EntityRow {
                natural_key,
                values,
            },
            dropped,
        })
    }

    fn position(&self, name: &str) -> usize {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .unwrap_or(usize::MAX)
    }
}

fn coerce(column: &EntityColumn, value: &Value) -> Result<ColumnValue, PayloadError> {
    match column.kind {
        ColumnKind::Text => Ok(ColumnValue::Text(match value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })),
        ColumnKind::Boolean => match value {
            Value::Null => Ok(ColumnValue::Boolean(None)),
            other => flag(other)
                .map(|b| ColumnValue::Boolean(Some(b)))
                .ok_or_else(|| PayloadError::InvalidField {
                    field: column.name.to_string(),
                    value: other.to_string(),
                }),
        },
    }
}

/// Interpret a boolean-like JSON value.
///
/// Booleans map directly, numbers are true when non-zero, and the strings
/// `true`, `1`, `yes`, `y`, `t` (any case) are true while `false`, `0`, `no`,
/// `n`, `f` and the empty string are false. Anything else is not a flag.
pub fn flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_f64().is_some_and(|f| f != 0.0)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "t" => Some(true),
            "false" | "0" | "no" | "n" | "f" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Record of a create event that collided with an existing entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictLog {
    /// JSON text of the payload as received, after field stripping.
    pub raw_payload: String,
    pub comment: String,
    pub exchange_name: String,
    pub message_id: Option<String>,
    /// RFC 3339, assigned by the store.
    pub timestamp: String,
}

impl ConflictLog {
    pub fn new(
        raw_payload: impl Into<String>,
        exchange_name: impl Into<String>,
        message_id: Option<String>,
    ) -> Self {
        Self {
            raw_payload: raw_payload.into(),
            comment: CONFLICT_COMMENT.to_string(),
            exchange_name: exchange_name.into(),
            message_id,
            timestamp: String::new(),
        }
    }
}

/// Outcome of a create event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    Conflict,
}
