use crate::db::Db;
use crate::error::{CirevalError, Result};
use crate::index::IndexFeatures;
use rusqlite::params;
use sha2::{Digest, Sha256};
use std::path::Path;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS index_features (
    scope TEXT NOT NULL,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    raw BLOB NOT NULL,
    normed BLOB NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (scope, position)
);
CREATE UNIQUE INDEX IF NOT EXISTS index_features_scope_name ON index_features (scope, name);";

/// Cache key for one index: dataset scope plus the model that produced the features.
///
/// # Arguments
///
/// * `dataset_scope` - e.g. "cirr/val" or "fiq/val/dress/0"
/// * `model_fingerprint` - [`crate::embeddings::ModelOptions::fingerprint`]
pub fn scope_key(dataset_scope: &str, model_fingerprint: &str) -> String {
    let digest = Sha256::digest(format!("{}\n{}", dataset_scope, model_fingerprint).as_bytes());
    format!("{}:{:x}", dataset_scope, digest)
}

/// sqlite-backed store of extracted index features
///
/// Embeddings are stored as little-endian f32 BLOBs; `position` keeps the index order
/// so a reloaded index ranks ties exactly like a freshly extracted one.
pub struct FeatureStore {
    db: Db,
}

impl FeatureStore {
    /// Open (and create if needed) the store at `path`
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Db::new(path);
        db.with_connection(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { db })
    }

    /// Replace everything stored under `scope` with `index`
    ///
    /// # Returns
    ///
    /// Number of index entries written
    pub async fn save(&self, scope: &str, index: &IndexFeatures) -> Result<usize> {
        let scope = scope.to_string();
        let rows: Vec<(String, Vec<u8>, Vec<u8>)> = index
            .iter()
            .map(|(name, raw, normed)| (name.to_string(), to_blob(raw), to_blob(normed)))
            .collect();
        let created_at = chrono::Utc::now().to_rfc3339();

        let count = self
            .db
            .with_connection(move |conn| {
                // One transaction: a scope is either fully replaced or untouched
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM index_features WHERE scope = ?", params![scope])?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO index_features (scope, position, name, raw, normed, created_at)
                         VALUES (?, ?, ?, ?, ?, ?)",
                    )?;
                    for (position, (name, raw, normed)) in rows.iter().enumerate() {
                        stmt.execute(params![scope, position as i64, name, raw, normed, created_at])?;
                    }
                }
                tx.commit()?;
                Ok(rows.len())
            })
            .await?;

        log::info!("Stored {} index features", count);
        Ok(count)
    }

    /// Load the index stored under `scope`, or `None` if nothing was stored
    pub async fn load(&self, scope: &str) -> Result<Option<IndexFeatures>> {
        let scope = scope.to_string();
        let rows = self
            .db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT name, raw, normed FROM index_features WHERE scope = ? ORDER BY position",
                )?;
                let mut rows = stmt.query(params![scope])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push((
                        row.get::<_, String>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ));
                }
                Ok(out)
            })
            .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut names = Vec::with_capacity(rows.len());
        let mut raw = Vec::with_capacity(rows.len());
        let mut normed = Vec::with_capacity(rows.len());
        for (name, raw_blob, normed_blob) in rows {
            raw.push(from_blob(&raw_blob).ok_or_else(|| invalid_blob(&name))?);
            normed.push(from_blob(&normed_blob).ok_or_else(|| invalid_blob(&name))?);
            names.push(name);
        }

        log::info!("Loaded {} index features from {}", names.len(), self.db.path().display());
        IndexFeatures::new(names, raw, normed).map(Some)
    }

    /// Scopes present in the store with their entry counts
    pub async fn scopes(&self) -> Result<Vec<(String, usize)>> {
        self.db
            .with_connection(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT scope, COUNT(*) FROM index_features GROUP BY scope ORDER BY scope",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
                })?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }
}

fn invalid_blob(name: &str) -> CirevalError {
    CirevalError::InvalidInput(format!("Invalid embedding BLOB length for {}", name))
}

/// Convert an embedding to a BLOB (raw bytes, little-endian)
fn to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Parse a BLOB back into floats; `None` if the length is not a multiple of 4
fn from_blob(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    blob.chunks(4)
        .map(|bytes| {
            let arr: [u8; 4] = bytes.try_into().ok()?;
            Some(f32::from_le_bytes(arr))
        })
        .collect()
}
