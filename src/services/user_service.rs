//! Account lookup, authentication and the admin gate.
//!
//! Authentication has exactly one rule: an account stored without a password
//! is unlocked only when the caller supplies no password at all; every other
//! account needs an exact password match.

use crate::{
    errors::{InventoryError, InventoryResult, is_unique_violation},
    models::user::{NewUser, User},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

const USER_COLUMNS: &str = "id, username, password, role, full_name, email, created_at";

#[derive(Clone)]
pub struct UserService {
    pub db: Arc<SqlitePool>,
}

impl UserService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Return the account for `username` if `password` unlocks it.
    pub async fn authenticate(
        &self,
        username: &str,
        password: Option<&str>,
    ) -> InventoryResult<Option<User>> {
        let Some(user) = self.get_by_username(username).await? else {
            warn!(username, "login denied: unknown user");
            return Ok(None);
        };

        let granted = match (user.password.as_deref(), password) {
            (None, None) => true,
            (Some(stored), Some(given)) => stored == given,
            _ => false,
        };

        if granted {
            info!(username, role = ?user.role, "login granted");
            Ok(Some(user))
        } else {
            warn!(username, "login denied: bad credentials");
            Ok(None)
        }
    }

    pub async fn get_by_username(&self, username: &str) -> InventoryResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(&*self.db)
        .await?;
        Ok(user)
    }

    /// All accounts ordered by username.
    pub async fn list(&self) -> InventoryResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY username"
        ))
        .fetch_all(&*self.db)
        .await?;
        Ok(users)
    }

    /// Create an account on behalf of `actor`, who must be an admin.
    pub async fn create(&self, actor: &User, user: NewUser) -> InventoryResult<User> {
        require_admin(actor, "create users")?;

        let created = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, password, role, full_name, email, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.username)
        .bind(&user.password)
        .bind(user.role)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(user.created_at)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                InventoryError::ConstraintViolation(format!(
                    "username `{}` is already taken",
                    user.username
                ))
            } else {
                InventoryError::Sqlx(err)
            }
        })?;

        info!(username = %created.username, by = %actor.username, "user created");
        Ok(created)
    }

    /// Fill `full_name` from the username wherever it is missing.
    pub async fn backfill_full_names(&self) -> InventoryResult<u64> {
        let result = sqlx::query("UPDATE users SET full_name = username WHERE full_name IS NULL")
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Fail with `PermissionDenied` unless `user` is an admin.
pub fn require_admin(user: &User, action: &str) -> InventoryResult<()> {
    if user.role.is_admin() {
        Ok(())
    } else {
        Err(InventoryError::PermissionDenied {
            user: user.username.clone(),
            action: action.to_string(),
        })
    }
}
