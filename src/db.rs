//! SQLite connections to the on-disk vector index.
//!
//! An index is a directory holding a single `index.sqlite` file. Chat
//! commands open it read-only; only [`crate::index_build`] writes to it.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};

/// File name of the index database inside the index directory.
pub const INDEX_FILE: &str = "index.sqlite";

pub fn index_file(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE)
}

/// Open an existing index without creating or modifying anything.
pub async fn connect_read_only(dir: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(index_file(dir))
        .read_only(true)
        .create_if_missing(false);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Open (creating if needed) an index for writing.
///
/// Uses a rollback journal rather than WAL so the finished file can be
/// opened read-only without `-wal`/`-shm` side files.
pub async fn connect_for_write(dir: &Path) -> Result<SqlitePool> {
    std::fs::create_dir_all(dir)?;

    let options = SqliteConnectOptions::new()
        .filename(index_file(dir))
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    Ok(pool)
}
