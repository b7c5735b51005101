//! Parameter templates for a gun type.

use crate::errors::{InventoryError, InventoryResult};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{FromRow, types::Json};

/// A stored preset.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Preset {
    pub id: i64,

    pub name: String,

    /// Gun type the preset applies to.
    pub gun_type: String,

    /// Arbitrary JSON parameters, `{}` when none were given.
    pub parameters: Json<Value>,

    pub description: Option<String>,

    pub created_at: NaiveDateTime,
}

/// Caller-supplied fields for a new preset.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PresetDraft {
    pub name: Option<String>,
    pub gun_type: Option<String>,
    pub parameters: Option<Value>,
    pub description: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

/// A validated preset ready to be written.
#[derive(Clone, Debug, PartialEq)]
pub struct NewPreset {
    pub name: String,
    pub gun_type: String,
    pub parameters: Value,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
}

impl PresetDraft {
    pub fn new(name: impl Into<String>, gun_type: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            gun_type: Some(gun_type.into()),
            ..Self::default()
        }
    }

    /// Both `name` and `gun_type` must be present and non-blank.
    pub fn validate(self) -> InventoryResult<NewPreset> {
        let name = required(self.name, "name")?;
        let gun_type = required(self.gun_type, "gun_type")?;
        Ok(NewPreset {
            name,
            gun_type,
            parameters: self.parameters.unwrap_or_else(|| Value::Object(Map::new())),
            description: self.description,
            created_at: self.created_at.unwrap_or_else(|| Local::now().naive_local()),
        })
    }
}

fn required(value: Option<String>, field: &str) -> InventoryResult<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(InventoryError::validation(format!("preset {field} is required"))),
    }
}
