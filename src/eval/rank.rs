//! Ranking of the index against predicted embeddings.

use crate::error::{CirevalError, Result};
use crate::index::{dot, IndexFeatures};

/// Index positions for one query, nearest first.
pub type RankedResult = Vec<usize>;

/// `1 - dot(predicted, normalized index embedding)` for every index position.
pub fn distances(predicted: &[f32], index: &IndexFeatures) -> Vec<f32> {
    (0..index.len())
        .map(|position| 1.0 - dot(predicted, index.normed_at(position)))
        .collect()
}

/// Ascending distance; the sort is stable, so equal distances keep index order.
pub fn rank_one(predicted: &[f32], index: &IndexFeatures) -> RankedResult {
    let distances = distances(predicted, index);
    let mut order: Vec<usize> = (0..index.len()).collect();
    order.sort_by(|&a, &b| distances[a].total_cmp(&distances[b]));
    order
}

fn check_dimensions(predictions: &[Vec<f32>], index: &IndexFeatures) -> Result<()> {
    let expected = index.normed_dimensions();
    for (row, predicted) in predictions.iter().enumerate() {
        if predicted.len() != expected {
            return Err(CirevalError::InvalidInput(format!(
                "prediction {} has dimension {}, index embeddings have {}",
                row,
                predicted.len(),
                expected
            )));
        }
    }
    Ok(())
}

/// Rank the whole index for every prediction, sequentially.
pub fn rank(predictions: &[Vec<f32>], index: &IndexFeatures) -> Result<Vec<RankedResult>> {
    check_dimensions(predictions, index)?;
    Ok(predictions.iter().map(|p| rank_one(p, index)).collect())
}

/// Same result as [`rank`], with the queries split across `threads` scoped threads.
pub fn rank_chunked(
    predictions: &[Vec<f32>],
    index: &IndexFeatures,
    threads: usize,
) -> Result<Vec<RankedResult>> {
    if threads <= 1 || predictions.len() < 2 {
        return rank(predictions, index);
    }
    check_dimensions(predictions, index)?;

    let chunk_size = predictions.len().div_ceil(threads);
    let ranked = std::thread::scope(|scope| {
        let handles: Vec<_> = predictions
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || chunk.iter().map(|p| rank_one(p, index)).collect::<Vec<_>>())
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join())
            .collect::<std::result::Result<Vec<_>, _>>()
    })
    .map_err(|_| CirevalError::InvalidInput("ranking thread panicked".to_string()))?;

    Ok(ranked.into_iter().flatten().collect())
}

/// Remove each query's reference image from its own ranking.
pub fn exclude_reference(
    ranked: Vec<RankedResult>,
    references: &[String],
    index: &IndexFeatures,
) -> Result<Vec<RankedResult>> {
    if ranked.len() != references.len() {
        return Err(CirevalError::InvalidInput(format!(
            "{} rankings for {} references",
            ranked.len(),
            references.len()
        )));
    }
    ranked
        .into_iter()
        .zip(references)
        .map(|(mut row, reference)| {
            let position = index
                .position(reference)
                .ok_or_else(|| CirevalError::MissingReference(reference.clone()))?;
            row.retain(|&p| p != position);
            Ok(row)
        })
        .collect()
}
