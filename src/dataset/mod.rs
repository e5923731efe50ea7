//! Benchmark split readers: FashionIQ and CIRR, classic (index) and relative (query) modes.

pub mod cirr;
pub mod fashioniq;

use crate::error::{CirevalError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Benchmark selected with `--dataset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Cirr,
    #[serde(rename = "fiq")]
    FashionIq,
}

impl FromStr for DatasetKind {
    type Err = CirevalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cirr" => Ok(Self::Cirr),
            "fiq" => Ok(Self::FashionIq),
            other => Err(CirevalError::Configuration(format!(
                "Dataset should be either 'cirr' or 'fiq', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cirr => write!(f, "cirr"),
            Self::FashionIq => write!(f, "fiq"),
        }
    }
}

/// A candidate image of the index ("classic" split item).
#[derive(Debug, Clone, PartialEq)]
pub struct ClassicItem {
    pub name: String,
    pub image_path: PathBuf,
}

/// A (reference, caption(s), target) triplet from a "relative" split.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub reference: String,
    pub target: String,
    pub captions: Vec<String>,
    /// Closed candidate subset (CIRR only).
    pub group: Option<Vec<String>>,
}

impl Query {
    /// Text handed to the fusion encoder.
    ///
    /// A single caption is used as-is; several captions (FashionIQ) are joined with
    /// [`fashioniq::join_captions`].
    pub fn fusion_text(&self) -> String {
        match self.captions.as_slice() {
            [single] => single.clone(),
            many => fashioniq::join_captions(many),
        }
    }
}

/// Read and decode a JSON split file, naming the path on failure.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        CirevalError::Dataset(format!("Failed to read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&text).map_err(|e| {
        CirevalError::Dataset(format!("Invalid JSON in {}: {}", path.display(), e))
    })
}
