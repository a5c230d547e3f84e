//! Vector store accessor.
//!
//! Loads a precomputed index directory once at startup and answers top-k
//! nearest-neighbour queries over it. The index is produced by
//! [`crate::index_build`] (or any tool writing the same schema, see
//! [`crate::migrate`]); this module never writes to it.
//!
//! # Trust
//!
//! The index is plain data: SQLite rows plus little-endian `f32` blobs.
//! Loading it runs no code. Its contents are, however, pasted verbatim into
//! the prompt and shown as citations, so an attacker-controlled index can
//! steer answers and links. [`VectorStore::load`] therefore refuses to open an
//! index unless the operator has set `index.trusted = true`.
//!
//! # Search
//!
//! All vectors are held in memory; a query is embedded with the same
//! [`EmbeddingProvider`] that built the index and scored by brute-force cosine
//! similarity. Results are sorted by descending score; ties keep index order.

use async_trait::async_trait;
use sqlx::Row;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, embed_query, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::migrate::{self, SCHEMA_VERSION};
use crate::models::{DocumentMetadata, RetrievedDocument};

/// Top-k retrieval over some document collection.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return at most `k` documents ranked by descending similarity to `query`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidQuery`] for a blank query or `k == 0`;
    /// [`Error::Embedding`] if the query cannot be embedded.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>>;
}

struct IndexedDocument {
    content: String,
    metadata: DocumentMetadata,
    vector: Vec<f32>,
}

/// An index loaded into memory. Immutable after [`load`](Self::load).
pub struct VectorStore {
    documents: Vec<IndexedDocument>,
    embedder: Arc<dyn EmbeddingProvider>,
}

fn unavailable(message: impl Into<String>) -> Error {
    Error::StoreUnavailable(message.into())
}

impl VectorStore {
    /// Load the index in `dir`.
    ///
    /// # Errors
    ///
    /// [`Error::StoreUnavailable`] when the index is untrusted, missing,
    /// unreadable, of an unknown schema version, built with a different
    /// embedding model or width, or contains malformed rows.
    pub async fn load(
        dir: &Path,
        embedder: Arc<dyn EmbeddingProvider>,
        trusted: bool,
    ) -> Result<Self> {
        if !trusted {
            return Err(unavailable(format!(
                "refusing to load index at {}: set index.trusted = true once its origin is trusted",
                dir.display()
            )));
        }

        let file = db::index_file(dir);
        if !file.is_file() {
            return Err(unavailable(format!("no index found at {}", file.display())));
        }

        let pool = db::connect_read_only(dir)
            .await
            .map_err(|e| unavailable(format!("cannot open {}: {:#}", file.display(), e)))?;

        let result = read_documents(&pool, embedder.as_ref()).await;
        pool.close().await;
        let documents = result?;

        info!(
            index = %dir.display(),
            documents = documents.len(),
            model = embedder.model_name(),
            dims = embedder.dims(),
            "vector index loaded"
        );

        Ok(Self {
            documents,
            embedder,
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Rank all documents against an already-embedded query.
    pub fn search_by_vector(&self, query_vec: &[f32], k: usize) -> Vec<RetrievedDocument> {
        let mut scored: Vec<(f32, &IndexedDocument)> = self
            .documents
            .iter()
            .map(|d| (cosine_similarity(query_vec, &d.vector), d))
            .collect();

        // Stable sort: equal scores keep index order.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(score, d)| RetrievedDocument {
                content: d.content.clone(),
                metadata: d.metadata.clone(),
                score,
            })
            .collect()
    }
}

#[async_trait]
impl Retriever for VectorStore {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidQuery("query must not be empty".to_string()));
        }
        if k == 0 {
            return Err(Error::InvalidQuery("k must be > 0".to_string()));
        }

        let query_vec = embed_query(self.embedder.as_ref(), query).await?;
        let results = self.search_by_vector(&query_vec, k);
        debug!(k, returned = results.len(), "retrieved documents");
        Ok(results)
    }
}

async fn read_documents(
    pool: &sqlx::SqlitePool,
    embedder: &dyn EmbeddingProvider,
) -> Result<Vec<IndexedDocument>> {
    let meta = |key: &'static str| async move {
        migrate::read_meta(pool, key)
            .await
            .map_err(|e| unavailable(format!("not a readable index: {:#}", e)))
    };

    let version = meta("schema_version")
        .await?
        .ok_or_else(|| unavailable("index has no schema_version"))?;
    if version != SCHEMA_VERSION {
        return Err(unavailable(format!(
            "unsupported index schema version {} (expected {})",
            version, SCHEMA_VERSION
        )));
    }

    let model = meta("embedding_model")
        .await?
        .ok_or_else(|| unavailable("index has no embedding_model"))?;
    if model != embedder.model_name() {
        return Err(unavailable(format!(
            "index was built with embedding model '{}', but '{}' is configured",
            model,
            embedder.model_name()
        )));
    }

    let dims: usize = meta("dims")
        .await?
        .and_then(|d| d.parse().ok())
        .ok_or_else(|| unavailable("index has no valid dims"))?;
    if dims != embedder.dims() {
        return Err(unavailable(format!(
            "index vectors are {}-dimensional, but the embedding provider produces {}",
            dims,
            embedder.dims()
        )));
    }

    let rows = sqlx::query("SELECT id, content, metadata_json, vector FROM documents ORDER BY id")
        .fetch_all(pool)
        .await
        .map_err(|e| unavailable(format!("cannot read documents: {}", e)))?;

    let mut documents = Vec::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| unavailable(format!("malformed documents row: {}", e)))?;
        let column = |e: sqlx::Error| unavailable(format!("document {} is malformed: {}", id, e));
        let content: String = row.try_get("content").map_err(column)?;
        let metadata_json: String = row.try_get("metadata_json").map_err(column)?;
        let blob: Vec<u8> = row.try_get("vector").map_err(column)?;

        if blob.len() != dims * 4 {
            return Err(unavailable(format!(
                "document {} has a {}-byte vector, expected {}",
                id,
                blob.len(),
                dims * 4
            )));
        }
        let metadata: DocumentMetadata = serde_json::from_str(&metadata_json).map_err(|e| {
            unavailable(format!("document {} has invalid metadata: {}", id, e))
        })?;

        let vector = blob_to_vec(&blob);
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(unavailable(format!(
                "document {} has NaN or infinite vector components",
                id
            )));
        }

        documents.push(IndexedDocument {
            content,
            metadata,
            vector,
        });
    }

    Ok(documents)
}
