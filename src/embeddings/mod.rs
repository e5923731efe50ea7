//! The vision-language model as seen from the evaluator: an index-mode image encoder
//! and a fusion-mode (reference embedding + text) encoder.

pub mod http;
pub mod storage;

pub use http::{DeviceStatus, HttpEmbedder, ServerStatus};
pub use storage::{scope_key, FeatureStore};

use crate::error::{CirevalError, Result};
use clap::ValueEnum;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Raw image bytes keyed by index identifier.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Index-mode output for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFeatures {
    /// Embedding fed back into fusion for queries that use this image as reference.
    pub raw: Vec<f32>,
    /// Pooled and L2-normalized embedding used for distances.
    pub normed: Vec<f32>,
}

/// Encoder behind the evaluation.
///
/// Implementations run the model in evaluation mode without gradient tracking, so the
/// same input always yields the same embedding. Both methods return exactly one output
/// per input, in input order.
#[allow(async_fn_in_trait)]
pub trait EmbeddingProvider {
    /// Index mode: encode images alone.
    async fn embed_images(&self, images: &[ImageInput]) -> Result<Vec<ImageFeatures>>;

    /// Fusion mode: combine reference embeddings with modifying texts.
    async fn fuse(&self, reference_features: &[Vec<f32>], texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

impl<P: EmbeddingProvider> EmbeddingProvider for &P {
    async fn embed_images(&self, images: &[ImageInput]) -> Result<Vec<ImageFeatures>> {
        (**self).embed_images(images).await
    }

    async fn fuse(&self, reference_features: &[Vec<f32>], texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).fuse(reference_features, texts).await
    }
}

/// Image preprocessing pipeline applied by the model server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    /// The model's own preprocessing.
    Clip,
    #[value(name = "squarepad")]
    SquarePad,
    #[value(name = "targetpad")]
    TargetPad,
}

impl Transform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clip => "clip",
            Self::SquarePad => "squarepad",
            Self::TargetPad => "targetpad",
        }
    }
}

/// What the model server must load and how it preprocesses images.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelOptions {
    pub base_model: String,
    /// Fine-tuned checkpoint loaded on top of the base model.
    pub checkpoint: Option<PathBuf>,
    pub load_origin: bool,
    pub transform: Transform,
    pub target_ratio: f32,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            base_model: "model_base.pth".to_string(),
            checkpoint: None,
            load_origin: false,
            transform: Transform::TargetPad,
            target_ratio: 1.25,
        }
    }
}

impl ModelOptions {
    /// Stable identity of the model, used to key cached index features.
    ///
    /// The checkpoint is identified by the sha256 of its contents, so retraining into the
    /// same path yields a new fingerprint. An unreadable checkpoint is an `Io` error.
    pub fn fingerprint(&self) -> Result<String> {
        let checkpoint = match &self.checkpoint {
            Some(path) => format!("{}@{}", path.display(), file_digest(path)?),
            None => String::new(),
        };
        Ok(format!(
            "{}|{}|{}|{}|{}",
            self.base_model,
            checkpoint,
            self.load_origin,
            self.transform.as_str(),
            self.target_ratio
        ))
    }
}

fn file_digest(path: &Path) -> Result<String> {
    let with_path = |e: std::io::Error| {
        CirevalError::Io(std::io::Error::new(
            e.kind(),
            format!("checkpoint {}: {}", path.display(), e),
        ))
    };
    let mut file = std::fs::File::open(path).map_err(with_path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(with_path)?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_changes_with_transform() {
        let a = ModelOptions::default();
        let b = ModelOptions {
            transform: Transform::SquarePad,
            ..ModelOptions::default()
        };
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn fingerprint_follows_checkpoint_contents() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("best.pt");
        std::fs::write(&path, b"epoch 1").unwrap();
        let options = ModelOptions {
            checkpoint: Some(path.clone()),
            ..ModelOptions::default()
        };

        let first = options.fingerprint().unwrap();
        assert_eq!(options.fingerprint().unwrap(), first);

        std::fs::write(&path, b"epoch 2").unwrap();
        assert_ne!(options.fingerprint().unwrap(), first);
    }

    #[test]
    fn missing_checkpoint_fails() {
        let options = ModelOptions {
            checkpoint: Some(PathBuf::from("/nonexistent/best.pt")),
            ..ModelOptions::default()
        };
        let err = options.fingerprint().unwrap_err();
        assert!(matches!(err, CirevalError::Io(_)));
        assert!(err.to_string().contains("/nonexistent/best.pt"));
    }

    #[test]
    fn transform_serializes_lowercase() {
        let json = serde_json::to_string(&Transform::TargetPad).unwrap();
        assert_eq!(json, "\"targetpad\"");
    }
}
