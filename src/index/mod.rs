//! The candidate index: identifier -> (raw, normalized) embeddings, in discovery order.

pub mod extract;

pub use extract::{extract_index_features, ExtractSettings};

use crate::embeddings::ImageFeatures;
use crate::error::{CirevalError, Result};
use std::collections::HashMap;

/// Read-only index features for one evaluation.
///
/// Positions follow the classic split order; that order decides ties when ranking.
/// Lookups by identifier go through `positions`.
#[derive(Debug, Clone)]
pub struct IndexFeatures {
    names: Vec<String>,
    raw: Vec<Vec<f32>>,
    normed: Vec<Vec<f32>>,
    positions: HashMap<String, usize>,
}

impl IndexFeatures {
    /// Build an index, rejecting duplicate identifiers and ragged embeddings.
    pub fn new(names: Vec<String>, raw: Vec<Vec<f32>>, normed: Vec<Vec<f32>>) -> Result<Self> {
        if names.len() != raw.len() || names.len() != normed.len() {
            return Err(CirevalError::InvalidInput(format!(
                "index has {} names, {} raw and {} normalized embeddings",
                names.len(),
                raw.len(),
                normed.len()
            )));
        }

        let mut positions = HashMap::with_capacity(names.len());
        for (position, name) in names.iter().enumerate() {
            if let Some(previous) = positions.insert(name.clone(), position) {
                return Err(CirevalError::InvariantViolation(format!(
                    "duplicate index identifier {} at positions {} and {}",
                    name, previous, position
                )));
            }
        }

        check_uniform("raw", &names, &raw)?;
        check_uniform("normalized", &names, &normed)?;

        Ok(Self {
            names,
            raw,
            normed,
            positions,
        })
    }

    /// Build an index from (identifier, features) pairs in the given order.
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, ImageFeatures)>,
    {
        let mut names = Vec::new();
        let mut raw = Vec::new();
        let mut normed = Vec::new();
        for (name, features) in entries {
            names.push(name);
            raw.push(features.raw);
            normed.push(features.normed);
        }
        Self::new(names, raw, normed)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name(&self, position: usize) -> &str {
        &self.names[position]
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Raw embedding of `name`, or `MissingReference`.
    pub fn raw(&self, name: &str) -> Result<&[f32]> {
        self.position(name)
            .map(|p| self.raw[p].as_slice())
            .ok_or_else(|| CirevalError::MissingReference(name.to_string()))
    }

    pub fn raw_at(&self, position: usize) -> &[f32] {
        &self.raw[position]
    }

    pub fn normed_at(&self, position: usize) -> &[f32] {
        &self.normed[position]
    }

    pub fn normed_dimensions(&self) -> usize {
        self.normed.first().map(Vec::len).unwrap_or(0)
    }

    /// Fail with `InvariantViolation` if any normalized embedding is not unit length.
    pub fn verify_unit_norm(&self, tolerance: f32) -> Result<()> {
        for (name, v) in self.names.iter().zip(&self.normed) {
            let norm = l2_norm(v);
            if (norm - 1.0).abs() > tolerance {
                return Err(CirevalError::InvariantViolation(format!(
                    "normalized index embedding of {} has norm {:.6}",
                    name, norm
                )));
            }
        }
        Ok(())
    }

    /// (identifier, raw, normalized) triples in index order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32], &[f32])> {
        self.names
            .iter()
            .zip(&self.raw)
            .zip(&self.normed)
            .map(|((n, r), m)| (n.as_str(), r.as_slice(), m.as_slice()))
    }
}

fn check_uniform(kind: &str, names: &[String], vectors: &[Vec<f32>]) -> Result<()> {
    let Some(first) = vectors.first() else {
        return Ok(());
    };
    for (name, v) in names.iter().zip(vectors) {
        if v.len() != first.len() {
            return Err(CirevalError::InvalidInput(format!(
                "{} embedding of {} has dimension {}, expected {}",
                kind,
                name,
                v.len(),
                first.len()
            )));
        }
    }
    Ok(())
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Unit-length copy of `v`; zero vectors are returned unchanged.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm = l2_norm(v);
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}
