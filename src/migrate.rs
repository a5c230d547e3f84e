//! Index schema creation (idempotent).
//!
//! | Table | Contents |
//! |-------|----------|
//! | `index_meta` | `schema_version`, `embedding_model`, `dims`, `built_at` |
//! | `documents` | content, metadata JSON, SHA-256 content hash, f32 vector blob |

use anyhow::Result;
use sqlx::{Executor, Sqlite, SqliteConnection};

/// Version written by this build and the only one [`crate::store`] accepts.
pub const SCHEMA_VERSION: &str = "1";

/// Create the index tables on `conn`. Runs inside the caller's transaction
/// when given one.
pub async fn run_migrations(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            content_hash TEXT NOT NULL UNIQUE,
            vector BLOB NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "INSERT INTO index_meta (key, value) VALUES ('schema_version', ?) \
         ON CONFLICT(key) DO NOTHING",
    )
    .bind(SCHEMA_VERSION)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Drop all index tables (used by `index build --rebuild`).
pub async fn drop_all(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("DROP TABLE IF EXISTS documents")
        .execute(&mut *conn)
        .await?;
    sqlx::query("DROP TABLE IF EXISTS index_meta")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Read one `index_meta` value.
pub async fn read_meta<'e, E>(executor: E, key: &str) -> Result<Option<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
        .bind(key)
        .fetch_optional(executor)
        .await?;
    Ok(value)
}

/// Insert or replace one `index_meta` value.
pub async fn write_meta(conn: &mut SqliteConnection, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO index_meta (key, value) VALUES (?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
