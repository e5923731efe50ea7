//! FashionIQ splits: `fashionIQ_dataset/{captions,image_splits,images}` under the data root.

use super::{read_json, ClassicItem, Query};
use crate::error::{CirevalError, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const DATASET_DIR: &str = "fashionIQ_dataset";

/// Garment category; each one is evaluated against its own index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DressType {
    Shirt,
    Dress,
    Toptee,
}

impl DressType {
    /// Evaluation order used for reports.
    pub const ALL: [DressType; 3] = [DressType::Shirt, DressType::Dress, DressType::Toptee];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shirt => "shirt",
            Self::Dress => "dress",
            Self::Toptee => "toptee",
        }
    }
}

impl fmt::Display for DressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DressType {
    type Err = CirevalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "shirt" => Ok(Self::Shirt),
            "dress" => Ok(Self::Dress),
            "toptee" => Ok(Self::Toptee),
            other => Err(CirevalError::Configuration(format!(
                "Unknown FashionIQ category '{}'",
                other
            ))),
        }
    }
}

/// Which images make up the FashionIQ index (`--fiq_val_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FiqValType {
    /// Every image of the category's image split.
    #[default]
    ImageSplit,
    /// Only the candidates and targets referenced by the category's captions.
    CaptionSubset,
}

impl FiqValType {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::ImageSplit),
            1 => Ok(Self::CaptionSubset),
            other => Err(CirevalError::Configuration(format!(
                "fiq_val_type should be 0 or 1, got {}",
                other
            ))),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::ImageSplit => 0,
            Self::CaptionSubset => 1,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CaptionEntry {
    candidate: String,
    target: String,
    captions: Vec<String>,
}

fn base(root: &Path) -> PathBuf {
    root.join(DATASET_DIR)
}

fn image_path(root: &Path, name: &str) -> PathBuf {
    base(root).join("images").join(format!("{}.png", name))
}

fn captions_path(root: &Path, dress: DressType, split: &str) -> PathBuf {
    base(root)
        .join("captions")
        .join(format!("cap.{}.{}.json", dress, split))
}

fn image_split_path(root: &Path, dress: DressType, split: &str) -> PathBuf {
    base(root)
        .join("image_splits")
        .join(format!("split.{}.{}.json", dress, split))
}

fn load_captions(root: &Path, dress: DressType, split: &str) -> Result<Vec<CaptionEntry>> {
    read_json(&captions_path(root, dress, split))
}

/// Index images for one category.
pub fn load_classic(
    root: &Path,
    dress: DressType,
    split: &str,
    val_type: FiqValType,
) -> Result<Vec<ClassicItem>> {
    let names: Vec<String> = match val_type {
        FiqValType::ImageSplit => read_json(&image_split_path(root, dress, split))?,
        FiqValType::CaptionSubset => {
            let mut seen = HashSet::new();
            let mut names = Vec::new();
            for entry in load_captions(root, dress, split)? {
                for name in [entry.candidate, entry.target] {
                    if seen.insert(name.clone()) {
                        names.push(name);
                    }
                }
            }
            names
        }
    };

    log::info!(
        "FashionIQ {} {} index: {} images (val type {})",
        dress,
        split,
        names.len(),
        val_type.code()
    );

    Ok(names
        .into_iter()
        .map(|name| ClassicItem {
            image_path: image_path(root, &name),
            name,
        })
        .collect())
}

/// Query triplets for one category, in file order.
pub fn load_relative(root: &Path, dress: DressType, split: &str) -> Result<Vec<Query>> {
    let path = captions_path(root, dress, split);
    let entries = load_captions(root, dress, split)?;
    let mut queries = Vec::with_capacity(entries.len());
    for (row, entry) in entries.into_iter().enumerate() {
        if entry.captions.is_empty() {
            return Err(CirevalError::Dataset(format!(
                "{} row {} has no captions",
                path.display(),
                row
            )));
        }
        queries.push(Query {
            reference: entry.candidate,
            target: entry.target,
            captions: entry.captions,
            group: None,
        });
    }
    log::info!("FashionIQ {} {} queries: {}", dress, split, queries.len());
    Ok(queries)
}

/// Deterministic caption concatenation for FashionIQ's paired captions.
///
/// Each caption is stripped of `.`, `?`, `,` and spaces at both ends; the first one is
/// capitalized (first character upper-cased, the rest lower-cased) and the captions are
/// joined with `" and "`.
pub fn join_captions(captions: &[String]) -> String {
    let strip = |c: &str| c.trim_matches(|ch| matches!(ch, '.' | '?' | ',' | ' ')).to_string();
    captions
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let stripped = strip(c);
            if i == 0 {
                capitalize(&stripped)
            } else {
                stripped
            }
        })
        .collect::<Vec<_>>()
        .join(" and ")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
