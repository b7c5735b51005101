//! Represents an account allowed to use the inventory.

use crate::errors::{InventoryError, InventoryResult};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// Role of an account. Only admins may change records.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl FromStr for Role {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(InventoryError::validation(format!(
                "role `{other}` must be admin or user"
            ))),
        }
    }
}

/// A stored account.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct User {
    pub id: i64,

    /// Unique login name.
    pub username: String,

    /// `None` marks an account that logs in without a password.
    #[serde(skip_serializing)]
    pub password: Option<String>,

    pub role: Role,

    pub full_name: Option<String>,

    pub email: Option<String>,

    pub created_at: NaiveDateTime,
}

impl User {
    /// Full name, falling back to the username for legacy rows.
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.username)
    }
}

/// Fields for creating an account.
#[derive(Clone, Debug, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub password: Option<String>,
    pub role: Role,
    pub full_name: String,
    pub email: String,
    pub created_at: NaiveDateTime,
}

impl NewUser {
    /// Build an account, defaulting `full_name` to the username and `email` to empty.
    pub fn new(
        username: impl Into<String>,
        password: Option<String>,
        role: Role,
        full_name: Option<String>,
        email: Option<String>,
    ) -> InventoryResult<Self> {
        let username = username.into();
        if username.trim().is_empty() {
            return Err(InventoryError::validation("username is required"));
        }
        Ok(Self {
            full_name: full_name.unwrap_or_else(|| username.clone()),
            email: email.unwrap_or_default(),
            username,
            password,
            role,
            created_at: Local::now().naive_local(),
        })
    }
}
