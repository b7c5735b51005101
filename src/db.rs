//! Database bootstrap: connecting, schema creation and first-run data.

use crate::errors::InventoryResult;
use chrono::Local;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{fs, path::Path, str::FromStr};

const INIT_SQL: &str = include_str!("../migrations/0001_init.sql");

/// Open a pool for `database_url`, creating the file and its directory if needed.
pub async fn connect(database_url: &str) -> InventoryResult<SqlitePool> {
    tracing::debug!("Connecting using raw URL => {}", database_url);

    let db_path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Run the embedded schema statement by statement. Safe to repeat.
pub async fn run_migrations(db: &SqlitePool) -> InventoryResult<()> {
    let statements = INIT_SQL
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}

/// Insert the first-run accounts when no user exists yet, and the sample
/// guns when asked to and the table is empty.
pub async fn seed_defaults(db: &SqlitePool, with_samples: bool) -> InventoryResult<()> {
    let now = Local::now().naive_local();

    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(db)
        .await?;
    if users == 0 {
        let defaults: [(&str, Option<&str>, &str, &str, &str); 3] = [
            ("system", Some("manager"), "admin", "系统管理员", "admin@welding.com"),
            ("administrator", None, "admin", "Administrator", ""),
            ("user", Some("user123"), "user", "普通用户", "user@welding.com"),
        ];
        for (username, password, role, full_name, email) in defaults {
            sqlx::query(
                "INSERT INTO users (username, password, role, full_name, email, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(username)
            .bind(password)
            .bind(role)
            .bind(full_name)
            .bind(email)
            .bind(now)
            .execute(db)
            .await?;
        }
        tracing::info!("Seeded {} default users", defaults.len());
    }

    if !with_samples {
        return Ok(());
    }

    let guns: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM guns")
        .fetch_one(db)
        .await?;
    if guns == 0 {
        let samples = [
            ("GUN-001", "点焊枪", "DW-100", "SN001", "active", "生产线A", "2024-01-15", "正常使用"),
            ("GUN-002", "弧焊枪", "HW-200", "SN002", "maintenance", "维修车间", "2023-12-20", "需要维护"),
            ("GUN-003", "激光焊枪", "LW-300", "SN003", "active", "实验室", "2024-02-10", "高精度"),
        ];
        for (name, gun_type, model, serial, status, location, last_maintenance, notes) in samples {
            sqlx::query(
                "INSERT INTO guns (name, type, model, serial_number, status, location,
                                   last_maintenance, notes, created_at, created_by)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'system')",
            )
            .bind(name)
            .bind(gun_type)
            .bind(model)
            .bind(serial)
            .bind(status)
            .bind(location)
            .bind(last_maintenance)
            .bind(notes)
            .bind(now)
            .execute(db)
            .await?;
        }
        tracing::info!("Seeded {} sample guns", samples.len());
    }

    Ok(())
}
