//! Index feature extraction: image-loading workers feed a bounded queue drained by a
//! single inference stage.

use super::IndexFeatures;
use crate::dataset::ClassicItem;
use crate::embeddings::{EmbeddingProvider, ImageFeatures, ImageInput};
use crate::error::{CirevalError, Result};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Worker pool and batching parameters
#[derive(Debug, Clone)]
pub struct ExtractSettings {
    pub num_workers: usize,
    pub queue_capacity: usize,
    pub batch_size: usize,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            num_workers: 8,
            queue_capacity: 64,
            batch_size: 32,
        }
    }
}

type Loaded = Result<(usize, ImageInput)>;

/// Encode every classic item and return the index in classic split order.
///
/// Worker `w` reads items `w, w + n, w + 2n, ...`; arrival order on the queue is
/// arbitrary, so results are re-sorted by position before the index is built.
pub async fn extract_index_features<P: EmbeddingProvider>(
    provider: &P,
    items: &[ClassicItem],
    settings: &ExtractSettings,
) -> Result<IndexFeatures> {
    let start = std::time::Instant::now();
    if items.is_empty() {
        return IndexFeatures::new(Vec::new(), Vec::new(), Vec::new());
    }

    let items: Arc<Vec<ClassicItem>> = Arc::new(items.to_vec());
    let workers = settings.num_workers.clamp(1, items.len());
    let batch_size = settings.batch_size.max(1);
    let (tx, mut rx) = mpsc::channel::<Loaded>(settings.queue_capacity.max(1));

    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let tx = tx.clone();
        let items = Arc::clone(&items);
        handles.push(tokio::spawn(async move {
            for position in (worker..items.len()).step_by(workers) {
                let item = &items[position];
                let loaded = tokio::fs::read(&item.image_path)
                    .await
                    .map(|bytes| {
                        (
                            position,
                            ImageInput {
                                name: item.name.clone(),
                                bytes,
                            },
                        )
                    })
                    .map_err(|e| {
                        CirevalError::Io(std::io::Error::new(
                            e.kind(),
                            format!("{}: {}", item.image_path.display(), e),
                        ))
                    });
                let failed = loaded.is_err();
                // Receiver gone means the consumer already failed
                if tx.send(loaded).await.is_err() || failed {
                    break;
                }
            }
        }));
    }
    drop(tx);

    let mut collected: Vec<(usize, String, ImageFeatures)> = Vec::with_capacity(items.len());
    let mut pending: Vec<(usize, ImageInput)> = Vec::with_capacity(batch_size);
    while let Some(loaded) = rx.recv().await {
        pending.push(loaded?);
        if pending.len() == batch_size {
            encode_batch(provider, &mut pending, &mut collected).await?;
            log::debug!("Extracted {}/{} index features", collected.len(), items.len());
        }
    }
    encode_batch(provider, &mut pending, &mut collected).await?;

    futures_util::future::try_join_all(handles)
        .await
        .map_err(|e| CirevalError::InvalidInput(format!("image loader panicked: {}", e)))?;

    collected.sort_by_key(|(position, _, _)| *position);
    let index = IndexFeatures::from_entries(
        collected
            .into_iter()
            .map(|(_, name, features)| (name, features)),
    )?;

    log::info!(
        "Extracted {} index features with {} workers in {:?}",
        index.len(),
        workers,
        start.elapsed()
    );
    Ok(index)
}

async fn encode_batch<P: EmbeddingProvider>(
    provider: &P,
    pending: &mut Vec<(usize, ImageInput)>,
    collected: &mut Vec<(usize, String, ImageFeatures)>,
) -> Result<()> {
    if pending.is_empty() {
        return Ok(());
    }
    let (positions, inputs): (Vec<usize>, Vec<ImageInput>) = pending.drain(..).unzip();
    let features = provider.embed_images(&inputs).await?;
    if features.len() != inputs.len() {
        return Err(CirevalError::Embedding(format!(
            "provider returned {} index embeddings for {} images",
            features.len(),
            inputs.len()
        )));
    }
    for ((position, input), features) in positions.into_iter().zip(inputs).zip(features) {
        collected.push((position, input.name, features));
    }
    Ok(())
}
