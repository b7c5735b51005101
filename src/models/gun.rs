//! Represents a welding gun, one row of equipment metadata.

use crate::errors::{InventoryError, InventoryResult};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{collections::BTreeMap, fmt, str::FromStr};

/// Operational status of a gun.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum GunStatus {
    #[default]
    Active,
    Maintenance,
    Inactive,
    Scrap,
}

impl GunStatus {
    pub const ALL: [GunStatus; 4] = [
        GunStatus::Active,
        GunStatus::Maintenance,
        GunStatus::Inactive,
        GunStatus::Scrap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GunStatus::Active => "active",
            GunStatus::Maintenance => "maintenance",
            GunStatus::Inactive => "inactive",
            GunStatus::Scrap => "scrap",
        }
    }
}

impl fmt::Display for GunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GunStatus {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GunStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                InventoryError::validation(format!(
                    "status `{s}` must be one of active, maintenance, inactive, scrap"
                ))
            })
    }
}

/// A persisted gun record.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Gun {
    /// Database-assigned identifier.
    pub id: i64,

    /// Display name, never empty.
    pub name: String,

    /// Free-form gun type (spot, arc, laser...).
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub gun_type: Option<String>,

    pub model: Option<String>,

    /// Unique across all guns when present.
    pub serial_number: Option<String>,

    pub status: GunStatus,

    pub location: Option<String>,

    /// Date of the last maintenance, kept as entered.
    pub last_maintenance: Option<String>,

    pub notes: Option<String>,

    pub created_at: NaiveDateTime,

    /// Set on every full-record update.
    pub updated_at: Option<NaiveDateTime>,

    /// Username of the caller that created the record.
    pub created_by: Option<String>,
}

/// Caller-supplied fields for creating or replacing a gun.
///
/// Nothing here is trusted; [`GunDraft::validate`] turns it into a [`NewGun`].
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct GunDraft {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub gun_type: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub status: Option<GunStatus>,
    pub location: Option<String>,
    pub last_maintenance: Option<String>,
    pub notes: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub created_by: Option<String>,
}

/// A validated gun ready to be written.
#[derive(Clone, Debug, PartialEq)]
pub struct NewGun {
    pub name: String,
    pub gun_type: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub status: GunStatus,
    pub location: Option<String>,
    pub last_maintenance: Option<String>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub created_by: Option<String>,
}

impl GunDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Apply defaults and reject drafts without a name.
    ///
    /// `status` falls back to `active`, `created_at` to the current local time.
    pub fn validate(self) -> InventoryResult<NewGun> {
        let name = match self.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(InventoryError::validation("gun name is required")),
        };

        Ok(NewGun {
            name,
            gun_type: self.gun_type,
            model: self.model,
            serial_number: self.serial_number,
            status: self.status.unwrap_or_default(),
            location: self.location,
            last_maintenance: self.last_maintenance,
            notes: self.notes,
            created_at: self.created_at.unwrap_or_else(|| Local::now().naive_local()),
            created_by: self.created_by,
        })
    }
}

impl From<&Gun> for GunDraft {
    fn from(gun: &Gun) -> Self {
        Self {
            name: Some(gun.name.clone()),
            gun_type: gun.gun_type.clone(),
            model: gun.model.clone(),
            serial_number: gun.serial_number.clone(),
            status: Some(gun.status),
            location: gun.location.clone(),
            last_maintenance: gun.last_maintenance.clone(),
            notes: gun.notes.clone(),
            created_at: Some(gun.created_at),
            created_by: gun.created_by.clone(),
        }
    }
}

/// Aggregate counts computed on read.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Statistics {
    pub total: i64,
    pub status_distribution: BTreeMap<String, i64>,
    pub type_distribution: BTreeMap<String, i64>,
}

impl Statistics {
    /// Number of guns currently in `status`; zero when none.
    pub fn count(&self, status: GunStatus) -> i64 {
        self.status_distribution
            .get(status.as_str())
            .copied()
            .unwrap_or(0)
    }
}
