//! Error taxonomy shared by the record store, the bundler and the catalog.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("constraint violated: {0}")]
    ConstraintViolation(String),
    #[error("gun `{0}` not found")]
    GunNotFound(i64),
    #[error("bundle `{0}` not found")]
    BundleNotFound(String),
    #[error("preset `{0}` not found")]
    PresetNotFound(i64),
    #[error("user `{0}` not found")]
    UserNotFound(String),
    #[error("unsupported attachment kind `{0}`")]
    InvalidKind(String),
    #[error("bundle folder `{0}` already exists")]
    BundleAlreadyExists(String),
    #[error("user `{user}` is not allowed to {action}")]
    PermissionDenied { user: String, action: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}

impl InventoryError {
    /// Shortcut for a validation failure.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for every "no matching entity" variant.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::GunNotFound(_)
                | Self::PresetNotFound(_)
                | Self::BundleNotFound(_)
                | Self::UserNotFound(_)
        )
    }

    /// True when the failure came from the database, the filesystem or a codec.
    pub fn is_io_failure(&self) -> bool {
        matches!(
            self,
            Self::Sqlx(_) | Self::Io(_) | Self::Json(_) | Self::Zip(_)
        )
    }
}

pub type InventoryResult<T> = Result<T, InventoryError>;

/// Return true if SQLx error indicates a unique constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// Turn a failed `spawn_blocking` join into an I/O error.
pub(crate) fn join_failure(err: tokio::task::JoinError) -> InventoryError {
    InventoryError::Io(io::Error::new(io::ErrorKind::Other, err))
}
