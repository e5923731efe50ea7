//! Evaluation metrics: Recall@K over label positions.

use super::label::Labels;
use std::collections::BTreeMap;

/// Recall at K, as a percentage: share of queries whose target is ranked below `k`.
/// Returns 0.0 if there are no queries.
pub fn recall_at_k(labels: &Labels, k: usize) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let hits = labels.positions().iter().filter(|&&p| p < k).count();
    hits as f64 / labels.len() as f64 * 100.0
}

/// Recall at every cutoff, keyed by cutoff.
pub fn aggregate(labels: &Labels, cutoffs: &[usize]) -> BTreeMap<usize, f64> {
    cutoffs
        .iter()
        .map(|&k| (k, recall_at_k(labels, k)))
        .collect()
}

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
