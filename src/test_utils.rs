//! In-memory embedding provider for unit tests.

use crate::embeddings::{EmbeddingProvider, ImageFeatures, ImageInput};
use crate::error::{CirevalError, Result};
use crate::index::{l2_normalize, IndexFeatures};
use std::collections::HashMap;
use std::sync::Mutex;

/// Serializes tests that mutate process-wide environment variables.
pub static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Deterministic provider.
///
/// Index mode turns each image byte into one float (`raw`) and normalizes it (`normed`).
/// Fusion mode returns the vector registered for the text, or the reference embedding
/// when the text is unknown. Batch sizes of every call are recorded.
#[derive(Default)]
pub struct MockProvider {
    pub fusion: HashMap<String, Vec<f32>>,
    pub fuse_batches: Mutex<Vec<usize>>,
    pub index_batches: Mutex<Vec<usize>>,
    /// Drop the last fused vector to simulate a misbehaving server.
    pub short_fuse: bool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fusion(mut self, text: &str, embedding: Vec<f32>) -> Self {
        self.fusion.insert(text.to_string(), embedding);
        self
    }
}

impl EmbeddingProvider for MockProvider {
    async fn embed_images(&self, images: &[ImageInput]) -> Result<Vec<ImageFeatures>> {
        self.index_batches.lock().unwrap().push(images.len());
        Ok(images
            .iter()
            .map(|image| {
                let raw: Vec<f32> = image.bytes.iter().map(|b| *b as f32).collect();
                ImageFeatures {
                    normed: l2_normalize(&raw),
                    raw,
                }
            })
            .collect())
    }

    async fn fuse(&self, reference_features: &[Vec<f32>], texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if reference_features.len() != texts.len() {
            return Err(CirevalError::InvalidInput("length mismatch".to_string()));
        }
        self.fuse_batches.lock().unwrap().push(texts.len());
        let mut out: Vec<Vec<f32>> = reference_features
            .iter()
            .zip(texts)
            .map(|(reference, text)| {
                self.fusion
                    .get(text)
                    .cloned()
                    .unwrap_or_else(|| reference.clone())
            })
            .collect();
        if self.short_fuse {
            out.pop();
        }
        Ok(out)
    }
}

/// Index whose raw and normalized embeddings are both the (normalized) given vectors.
pub fn index_of(entries: &[(&str, Vec<f32>)]) -> IndexFeatures {
    IndexFeatures::from_entries(entries.iter().map(|(name, v)| {
        let normed = l2_normalize(v);
        (
            name.to_string(),
            ImageFeatures {
                raw: normed.clone(),
                normed,
            },
        )
    }))
    .unwrap()
}
