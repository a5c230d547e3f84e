//! Index construction and inspection commands.
//!
//! `advisor index build --input corpus.jsonl` turns a JSONL corpus into an
//! index directory readable by [`crate::store::VectorStore`]. Each line is a
//! JSON object with a `content` string, a `source_url` string, and any number
//! of extra fields that are kept as document metadata:
//!
//! ```json
//! {"content": "環境情報学部の授業…", "source_url": "https://syllabus.sfc.keio.ac.jp/courses/1", "title": "…"}
//! ```
//!
//! Documents are deduplicated by the SHA-256 of their content, embedded in
//! batches of `embedding.batch_size`, and stored with the embedding model and
//! width recorded in `index_meta`.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

use crate::config::Config;
use crate::db;
use crate::embedding::{self, vec_to_blob, EmbeddingProvider};
use crate::migrate;
use crate::models::DocumentMetadata;

/// One parsed corpus line.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusEntry {
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// Parse a JSONL corpus. Blank lines are skipped.
pub fn parse_corpus(text: &str) -> Result<Vec<CorpusEntry>> {
    let mut entries = Vec::new();

    for (n, line) in text.lines().enumerate() {
        let line_no = n + 1;
        if line.trim().is_empty() {
            continue;
        }

        let mut obj: serde_json::Map<String, serde_json::Value> = serde_json::from_str(line)
            .with_context(|| format!("line {}: not a JSON object", line_no))?;

        let content = match obj.remove("content") {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s,
            _ => bail!("line {}: missing or empty \"content\" string", line_no),
        };

        let metadata: DocumentMetadata = serde_json::from_value(serde_json::Value::Object(obj))
            .with_context(|| format!("line {}: invalid metadata", line_no))?;

        entries.push(CorpusEntry { content, metadata });
    }

    Ok(entries)
}

pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Writes documents into an index directory.
///
/// Every change, including the table drop of a rebuild, happens inside one
/// transaction. Nothing is visible to readers until [`finish`](Self::finish)
/// commits; dropping the writer or calling [`abort`](Self::abort) leaves the
/// previous index as it was.
pub struct IndexWriter {
    pool: SqlitePool,
    tx: Transaction<'static, Sqlite>,
    dims: usize,
    inserted: u64,
}

impl IndexWriter {
    /// Open or create the index in `dir` for `model` / `dims`.
    ///
    /// An existing index built with another model or width is refused
    /// unless `rebuild` is set, in which case it is cleared first.
    pub async fn create(dir: &Path, model: &str, dims: usize, rebuild: bool) -> Result<Self> {
        let pool = db::connect_for_write(dir)
            .await
            .with_context(|| format!("Failed to open index at {}", dir.display()))?;
        let mut tx = pool.begin().await?;

        if rebuild {
            migrate::drop_all(&mut tx).await?;
        }
        migrate::run_migrations(&mut tx).await?;

        if let Some(existing) = migrate::read_meta(&mut *tx, "embedding_model").await? {
            if existing != model {
                bail!(
                    "index at {} was built with embedding model '{}', not '{}'; pass --rebuild to replace it",
                    dir.display(),
                    existing,
                    model
                );
            }
        }
        if let Some(existing) = migrate::read_meta(&mut *tx, "dims").await? {
            if existing != dims.to_string() {
                bail!(
                    "index at {} holds {}-dimensional vectors, not {}; pass --rebuild to replace it",
                    dir.display(),
                    existing,
                    dims
                );
            }
        }

        migrate::write_meta(&mut tx, "embedding_model", model).await?;
        migrate::write_meta(&mut tx, "dims", &dims.to_string()).await?;

        Ok(Self {
            pool,
            tx,
            dims,
            inserted: 0,
        })
    }

    /// Insert one document. Returns `false` if identical content was
    /// already present.
    pub async fn insert(
        &mut self,
        content: &str,
        metadata: &DocumentMetadata,
        vector: &[f32],
    ) -> Result<bool> {
        if vector.len() != self.dims {
            bail!(
                "vector has {} dimensions, index expects {}",
                vector.len(),
                self.dims
            );
        }
        if vector.iter().any(|v| !v.is_finite()) {
            bail!("vector contains NaN or infinite values");
        }

        let result = sqlx::query(
            "INSERT OR IGNORE INTO documents (content, metadata_json, content_hash, vector) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(content)
        .bind(serde_json::to_string(metadata)?)
        .bind(content_hash(content))
        .bind(vec_to_blob(vector))
        .execute(&mut *self.tx)
        .await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            self.inserted += 1;
        }
        Ok(inserted)
    }

    /// Documents inserted so far through this writer.
    pub fn inserted(&self) -> u64 {
        self.inserted
    }

    /// Stamp the build time, commit, and close the index. Returns the number
    /// of documents inserted through this writer.
    pub async fn finish(mut self) -> Result<u64> {
        migrate::write_meta(&mut self.tx, "built_at", &chrono::Utc::now().to_rfc3339()).await?;
        self.tx.commit().await?;
        self.pool.close().await;
        Ok(self.inserted)
    }

    /// Discard everything written through this writer.
    pub async fn abort(self) -> Result<()> {
        self.tx.rollback().await?;
        self.pool.close().await;
        Ok(())
    }
}

/// Counts reported by [`build_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildSummary {
    pub read: usize,
    pub duplicates: usize,
    pub embedded: u64,
    pub failed: usize,
}

/// Embed `entries` into the index in `dir`.
///
/// The build is all or nothing: if any batch fails to embed, the
/// transaction is rolled back and the index on disk is unchanged.
pub async fn build_index(
    dir: &Path,
    provider: &dyn EmbeddingProvider,
    entries: Vec<CorpusEntry>,
    batch_size: usize,
    rebuild: bool,
) -> Result<BuildSummary> {
    let mut writer =
        IndexWriter::create(dir, provider.model_name(), provider.dims(), rebuild).await?;

    let read = entries.len();
    let mut seen = HashSet::new();
    let unique: Vec<CorpusEntry> = entries
        .into_iter()
        .filter(|e| seen.insert(content_hash(&e.content)))
        .collect();
    let mut duplicates = read - unique.len();
    let mut failed = 0usize;

    for batch in unique.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|e| e.content.clone()).collect();

        match provider.embed(&texts).await {
            Ok(vectors) => {
                for (entry, vec) in batch.iter().zip(vectors.iter()) {
                    if !writer.insert(&entry.content, &entry.metadata, vec).await? {
                        duplicates += 1;
                    }
                }
                info!(batch = batch.len(), "embedded batch");
            }
            Err(e) => {
                warn!(error = %e, batch = batch.len(), "embedding batch failed");
                failed += batch.len();
            }
        }
    }

    if failed > 0 {
        writer.abort().await?;
        bail!(
            "{} of {} documents could not be embedded; index at {} left unchanged",
            failed,
            read,
            dir.display()
        );
    }

    let embedded = writer.finish().await?;
    Ok(BuildSummary {
        read,
        duplicates,
        embedded,
        failed,
    })
}

/// Run `index build`: embed a JSONL corpus into the configured index.
pub async fn run_index_build(config: &Config, input: &Path, rebuild: bool) -> Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read corpus: {}", input.display()))?;
    let entries = parse_corpus(&text)?;

    let provider = embedding::create_provider(&config.embedding)?;
    let summary = build_index(
        &config.index.path,
        provider.as_ref(),
        entries,
        config.embedding.batch_size,
        rebuild,
    )
    .await?;

    println!("index build");
    println!("  index: {}", config.index.path.display());
    println!("  model: {} ({} dims)", provider.model_name(), provider.dims());
    println!("  documents read: {}", summary.read);
    println!("  duplicates skipped: {}", summary.duplicates);
    println!("  embedded: {}", summary.embedded);
    Ok(())
}

/// Run `index info`: print what the configured index contains.
pub async fn run_index_info(config: &Config) -> Result<()> {
    let dir = &config.index.path;
    let file = db::index_file(dir);
    if !file.is_file() {
        bail!("no index found at {}", file.display());
    }

    let pool = db::connect_read_only(dir).await?;

    let version = migrate::read_meta(&pool, "schema_version").await?;
    let model = migrate::read_meta(&pool, "embedding_model").await?;
    let dims = migrate::read_meta(&pool, "dims").await?;
    let built_at = migrate::read_meta(&pool, "built_at").await?;

    let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await?;
    let sources: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT json_extract(metadata_json, '$.source_url')) FROM documents",
    )
    .fetch_one(&pool)
    .await?;

    pool.close().await;

    let size = std::fs::metadata(&file).map(|m| m.len()).unwrap_or(0);
    let or_unknown = |v: Option<String>| v.unwrap_or_else(|| "(unknown)".to_string());

    println!("Vector Index");
    println!("============");
    println!();
    println!("  Path:        {}", dir.display());
    println!("  Size:        {}", format_bytes(size));
    println!("  Schema:      v{}", or_unknown(version));
    println!("  Model:       {}", or_unknown(model));
    println!("  Dims:        {}", or_unknown(dims));
    println!("  Built:       {}", or_unknown(built_at));
    println!();
    println!("  Documents:   {}", documents);
    println!("  Sources:     {}", sources);
    println!(
        "  Trusted:     {}",
        if config.index.trusted { "yes" } else { "no (set index.trusted = true)" }
    );

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
