//! Database initialization
//!
//! Opens (creating if needed) the corpus database and makes sure every table
//! the training pipeline touches exists. All steps are idempotent.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open or create the database file and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets the builders read while the fingerprint calculator writes
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database (each connection would otherwise
/// see its own empty database)
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_records_table(pool).await?;
    create_annotations_table(pool).await?;
    create_annotation_targets_table(pool).await?;
    create_text_blocks_table(pool).await?;
    create_watermarks_table(pool).await?;
    create_models_table(pool).await?;
    Ok(())
}

/// Records with their free text and (once computed) text fingerprint
pub async fn create_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            record_id INTEGER PRIMARY KEY,
            text TEXT NOT NULL DEFAULT '',
            curated INTEGER NOT NULL DEFAULT 1,
            fingerprint TEXT,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_records_missing_fingerprint
        ON records(record_id) WHERE fingerprint IS NULL
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Direct annotations applied to records
pub async fn create_annotations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS annotations (
            record_id INTEGER NOT NULL REFERENCES records(record_id) ON DELETE CASCADE,
            ordinal INTEGER NOT NULL,
            prop_uri TEXT NOT NULL,
            value_uri TEXT NOT NULL,
            group_path TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY (record_id, ordinal)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// (property, value) → target id; grows monotonically
pub async fn create_annotation_targets_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS annotation_targets (
            target_id INTEGER PRIMARY KEY AUTOINCREMENT,
            prop_uri TEXT NOT NULL,
            value_uri TEXT NOT NULL,
            UNIQUE (prop_uri, value_uri)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Text block → id; grows monotonically
pub async fn create_text_blocks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS text_blocks (
            block_id INTEGER PRIMARY KEY AUTOINCREMENT,
            block TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Per-family watermark counters
pub async fn create_watermarks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS watermarks (
            family TEXT PRIMARY KEY,
            value INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// One model (or blank sentinel) per (family, target)
pub async fn create_models_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS models (
            family TEXT NOT NULL,
            target_id INTEGER NOT NULL,
            watermark INTEGER NOT NULL,
            is_blank INTEGER NOT NULL DEFAULT 0,
            is_explicit INTEGER NOT NULL DEFAULT 0,
            fingerprints TEXT NOT NULL DEFAULT '[]',
            contributions TEXT NOT NULL DEFAULT '[]',
            calibration_low REAL NOT NULL DEFAULT 0,
            calibration_high REAL NOT NULL DEFAULT 0,
            roc_auc REAL NOT NULL DEFAULT 0,
            built_at TEXT NOT NULL,
            PRIMARY KEY (family, target_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
