//! Query prediction: reference embedding from the index + caption through the fusion encoder.

use crate::dataset::Query;
use crate::embeddings::EmbeddingProvider;
use crate::error::{CirevalError, Result};
use crate::index::{l2_normalize, IndexFeatures};

/// Predicted embeddings aligned index-for-index with the queries.
#[derive(Debug, Clone, Default)]
pub struct PredictionBatch {
    /// Unit-length predicted embeddings.
    pub features: Vec<Vec<f32>>,
    pub references: Vec<String>,
    pub targets: Vec<String>,
}

impl PredictionBatch {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Fuse every query's reference embedding with its text, `batch_size` queries per call.
///
/// Reference embeddings are looked up by identifier in `index` (`MissingReference` if
/// absent), so a reference never has to be re-encoded. Output order equals query order.
pub async fn predict<P: EmbeddingProvider>(
    provider: &P,
    queries: &[Query],
    index: &IndexFeatures,
    batch_size: usize,
) -> Result<PredictionBatch> {
    let batch_size = batch_size.max(1);
    let total_batches = queries.len().div_ceil(batch_size);
    let mut batch = PredictionBatch {
        features: Vec::with_capacity(queries.len()),
        references: Vec::with_capacity(queries.len()),
        targets: Vec::with_capacity(queries.len()),
    };
    let mut dimensions: Option<usize> = None;

    for (batch_no, chunk) in queries.chunks(batch_size).enumerate() {
        let references = chunk
            .iter()
            .map(|q| index.raw(&q.reference).map(<[f32]>::to_vec))
            .collect::<Result<Vec<_>>>()?;
        let texts: Vec<String> = chunk.iter().map(Query::fusion_text).collect();

        let fused = provider.fuse(&references, &texts).await?;
        if fused.len() != chunk.len() {
            return Err(CirevalError::Embedding(format!(
                "fusion returned {} embeddings for {} queries",
                fused.len(),
                chunk.len()
            )));
        }

        for (query, features) in chunk.iter().zip(fused) {
            let expected = *dimensions.get_or_insert(features.len());
            if features.len() != expected || expected == 0 {
                return Err(CirevalError::Embedding(format!(
                    "fusion embedding for reference {} has dimension {}, expected {}",
                    query.reference,
                    features.len(),
                    expected
                )));
            }
            batch.features.push(l2_normalize(&features));
            batch.references.push(query.reference.clone());
            batch.targets.push(query.target.clone());
        }

        log::debug!("Predicted batch {}/{}", batch_no + 1, total_batches);
    }

    log::info!("Predicted {} query embeddings", batch.len());
    Ok(batch)
}
