//! Persisted canonical-tag vectors.
//!
//! [`VectorStore`] is the seam the matcher queries through. Distances follow
//! cosine semantics (`1 - cosine similarity`), so callers recover similarity
//! as `1 - distance`. [`SqliteVectorStore`] is the bundled implementation:
//! one `tags` table holding each canonical name and an optional vector blob.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection};

use crate::error::PipelineError;
use crate::math::cosine_similarity;

/// One nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// Canonical tag name as stored
    pub tag: String,
    /// Cosine distance to the query
    pub distance: f32,
}

impl Neighbor {
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

/// Query and maintenance interface over canonical-tag vectors.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Up to `limit` stored vectors closest to `query`, ascending by distance.
    ///
    /// Tags without a vector are never returned.
    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<Neighbor>, PipelineError>;

    /// Every canonical tag name, vectorized or not.
    async fn tag_names(&self) -> Result<Vec<String>, PipelineError>;

    /// Atomically clear all vectors and store the given ones.
    ///
    /// On error the previous vectors remain untouched.
    async fn replace_vectors(&self, vectors: Vec<(String, Vec<f32>)>)
        -> Result<(), PipelineError>;
}

/// SQLite-backed store.
///
/// The connection sits behind a `Mutex` and every call runs on the blocking
/// pool, so a large scan never stalls the async runtime.
#[derive(Clone)]
pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVectorStore {
    /// Open or create a store file.
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PipelineError::store(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path).map_err(|e| {
            PipelineError::store(format!("Failed to open {}: {e}", path.display()))
        })?;
        Self::with_connection(conn)
    }

    /// Ephemeral store, for tests and dry runs.
    pub fn open_in_memory() -> Result<Self, PipelineError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PipelineError::store(format!("Failed to open in-memory store: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, PipelineError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tags (
                name TEXT PRIMARY KEY NOT NULL,
                embedding BLOB
            );
            "#,
        )
        .map_err(|e| PipelineError::store(format!("Failed to initialize schema: {e}")))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, PipelineError>
    where
        F: FnOnce(&mut Connection) -> Result<T, PipelineError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| PipelineError::store(format!("Store lock poisoned: {e}")))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| PipelineError::store(format!("Store task failed: {e}")))?
    }

    /// Register canonical names without vectors. Existing names are kept.
    ///
    /// Returns how many names were new.
    pub async fn insert_tags(&self, names: Vec<String>) -> Result<usize, PipelineError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(sql_error)?;
            let mut inserted = 0;
            {
                let mut stmt = tx
                    .prepare("INSERT OR IGNORE INTO tags (name) VALUES (?1)")
                    .map_err(sql_error)?;
                for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
                    inserted += stmt.execute([name]).map_err(sql_error)?;
                }
            }
            tx.commit().map_err(sql_error)?;
            Ok(inserted)
        })
        .await
    }

    pub async fn tag_count(&self) -> Result<usize, PipelineError> {
        self.count("SELECT COUNT(*) FROM tags").await
    }

    /// Number of tags that currently have a vector.
    pub async fn vectorized_count(&self) -> Result<usize, PipelineError> {
        self.count("SELECT COUNT(*) FROM tags WHERE embedding IS NOT NULL")
            .await
    }

    async fn count(&self, sql: &'static str) -> Result<usize, PipelineError> {
        self.with_conn(move |conn| {
            let count: i64 = conn
                .query_row(sql, [], |row| row.get(0))
                .map_err(sql_error)?;
            Ok(count as usize)
        })
        .await
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<Neighbor>, PipelineError> {
        if limit == 0 {
            return Ok(vec![]);
        }
        let query = query.to_vec();

        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare("SELECT name, embedding FROM tags WHERE embedding IS NOT NULL")
                .map_err(sql_error)?;
            let rows = stmt
                .query_map([], |row| {
                    let name: String = row.get(0)?;
                    let blob: Vec<u8> = row.get(1)?;
                    Ok((name, blob))
                })
                .map_err(sql_error)?;

            let mut hits = Vec::new();
            for row in rows {
                let (tag, blob) = row.map_err(sql_error)?;
                let vector = bytes_to_embedding(&blob);
                if vector.len() != query.len() {
                    return Err(PipelineError::store(format!(
                        "Query has {} dimensions but {tag:?} has {}",
                        query.len(),
                        vector.len()
                    )));
                }
                let distance = 1.0 - cosine_similarity(&query, &vector);
                hits.push(Neighbor { tag, distance });
            }

            hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.tag.cmp(&b.tag)));
            hits.truncate(limit);
            Ok(hits)
        })
        .await
    }

    async fn tag_names(&self) -> Result<Vec<String>, PipelineError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT name FROM tags ORDER BY name")
                .map_err(sql_error)?;
            let names = stmt
                .query_map([], |row| row.get(0))
                .map_err(sql_error)?
                .collect::<Result<Vec<String>, _>>()
                .map_err(sql_error)?;
            Ok(names)
        })
        .await
    }

    async fn replace_vectors(
        &self,
        vectors: Vec<(String, Vec<f32>)>,
    ) -> Result<(), PipelineError> {
        if let Some((first, rest)) = vectors.split_first() {
            let dim = first.1.len();
            if dim == 0 {
                return Err(PipelineError::store(format!("Empty vector for {:?}", first.0)));
            }
            if let Some((tag, v)) = rest.iter().find(|(_, v)| v.len() != dim) {
                return Err(PipelineError::store(format!(
                    "Vector for {tag:?} has {} dimensions, expected {dim}",
                    v.len()
                )));
            }
        }

        self.with_conn(move |conn| {
            // Dropping the transaction without commit rolls back
            let tx = conn.transaction().map_err(sql_error)?;
            tx.execute("UPDATE tags SET embedding = NULL", [])
                .map_err(sql_error)?;
            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO tags (name, embedding) VALUES (?1, ?2)
                         ON CONFLICT(name) DO UPDATE SET embedding = excluded.embedding",
                    )
                    .map_err(sql_error)?;
                for (name, vector) in &vectors {
                    stmt.execute(params![name, embedding_to_bytes(vector)])
                        .map_err(sql_error)?;
                }
            }
            tx.commit().map_err(sql_error)?;
            tracing::debug!("Stored {} tag vectors", vectors.len());
            Ok(())
        })
        .await
    }
}

fn sql_error(e: rusqlite::Error) -> PipelineError {
    PipelineError::store(e.to_string())
}

/// Little-endian f32 blob.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
