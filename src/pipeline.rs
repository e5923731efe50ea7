//! End-to-end runs: build or load the index, read the queries, evaluate, report.

use crate::dataset::fashioniq::{self, DressType, FiqValType};
use crate::dataset::{cirr, ClassicItem, DatasetKind};
use crate::embeddings::{scope_key, EmbeddingProvider, FeatureStore};
use crate::error::{CirevalError, Result};
use crate::eval::{EvalProtocol, EvalSettings, MetricsEvaluator, RunReport};
use crate::index::{extract_index_features, ExtractSettings, IndexFeatures};
use std::path::PathBuf;

/// Where the data lives and how the index is obtained.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub data_path: PathBuf,
    pub split: String,
    pub fiq_val_type: FiqValType,
    pub extract: ExtractSettings,
    /// Feature store; extraction is skipped for scopes already stored there.
    pub features_db: Option<PathBuf>,
    /// Identifies the model whose features are cached.
    pub model_fingerprint: String,
}

impl PipelineOptions {
    pub fn new<P: Into<PathBuf>>(data_path: P) -> Self {
        Self {
            data_path: data_path.into(),
            split: "val".to_string(),
            fiq_val_type: FiqValType::default(),
            extract: ExtractSettings::default(),
            features_db: None,
            model_fingerprint: String::new(),
        }
    }

    fn cirr_scope(&self) -> String {
        format!("cirr/{}", self.split)
    }

    fn fiq_scope(&self, dress: DressType) -> String {
        format!("fiq/{}/{}/{}", self.split, dress, self.fiq_val_type.code())
    }
}

async fn open_store(options: &PipelineOptions) -> Result<Option<FeatureStore>> {
    match &options.features_db {
        Some(path) => Ok(Some(FeatureStore::open(path).await?)),
        None => Ok(None),
    }
}

/// Index features for `items`, from the store when a matching entry exists.
///
/// A stored index is reused only if its identifiers equal the split's, in order;
/// otherwise the images are extracted again and the scope is overwritten.
pub async fn build_index<P: EmbeddingProvider>(
    provider: &P,
    items: &[ClassicItem],
    dataset_scope: &str,
    store: Option<&FeatureStore>,
    options: &PipelineOptions,
) -> Result<IndexFeatures> {
    let key = scope_key(dataset_scope, &options.model_fingerprint);
    if let Some(store) = store {
        if let Some(cached) = store.load(&key).await? {
            let matches = cached.len() == items.len()
                && cached.names().iter().zip(items).all(|(name, item)| name == &item.name);
            if matches {
                log::info!("Using stored index features for {}", dataset_scope);
                return Ok(cached);
            }
            log::warn!(
                "Stored index for {} does not match the split ({} vs {} images), extracting again",
                dataset_scope,
                cached.len(),
                items.len()
            );
        }
    }

    log::info!("Extracting {} index features for {}", items.len(), dataset_scope);
    let index = extract_index_features(provider, items, &options.extract).await?;
    if let Some(store) = store {
        store.save(&key, &index).await?;
    }
    Ok(index)
}

/// Evaluate CIRR: Recall@{1,5,10,50} and group Recall@{1,2,3}.
pub async fn run_cirr<P: EmbeddingProvider>(
    provider: &P,
    settings: &EvalSettings,
    options: &PipelineOptions,
) -> Result<RunReport> {
    let mut run = RunReport::new(DatasetKind::Cirr);
    let store = open_store(options).await?;

    let items = cirr::load_classic(&options.data_path, &options.split)?;
    let index = build_index(provider, &items, &options.cirr_scope(), store.as_ref(), options).await?;
    let queries = cirr::load_relative(&options.data_path, &options.split)?;

    let evaluator = MetricsEvaluator::new(provider, EvalProtocol::cirr(), settings.clone());
    run.push(evaluator.evaluate("cirr", &queries, &index).await?);
    Ok(run.finish())
}

/// Evaluate FashionIQ: Recall@{10,50} for shirt, dress and toptee, plus their average.
pub async fn run_fashion_iq<P: EmbeddingProvider>(
    provider: &P,
    settings: &EvalSettings,
    options: &PipelineOptions,
) -> Result<RunReport> {
    let mut run = RunReport::new(DatasetKind::FashionIq);
    let store = open_store(options).await?;
    let evaluator = MetricsEvaluator::new(provider, EvalProtocol::fashion_iq(), settings.clone());

    for dress in DressType::ALL {
        let items =
            fashioniq::load_classic(&options.data_path, dress, &options.split, options.fiq_val_type)?;
        let index =
            build_index(provider, &items, &options.fiq_scope(dress), store.as_ref(), options).await?;
        let queries = fashioniq::load_relative(&options.data_path, dress, &options.split)?;
        run.push(evaluator.evaluate(dress.as_str(), &queries, &index).await?);
    }
    Ok(run.finish())
}

pub async fn run<P: EmbeddingProvider>(
    kind: DatasetKind,
    provider: &P,
    settings: &EvalSettings,
    options: &PipelineOptions,
) -> Result<RunReport> {
    match kind {
        DatasetKind::Cirr => run_cirr(provider, settings, options).await,
        DatasetKind::FashionIq => run_fashion_iq(provider, settings, options).await,
    }
}

/// Extract and store the index features of every scope `kind` evaluates.
///
/// # Returns
///
/// `(dataset scope, index size)` per stored scope
pub async fn precompute<P: EmbeddingProvider>(
    kind: DatasetKind,
    provider: &P,
    options: &PipelineOptions,
) -> Result<Vec<(String, usize)>> {
    let store = open_store(options).await?.ok_or_else(|| {
        CirevalError::Configuration("a feature store path is required to precompute features".to_string())
    })?;

    let scopes: Vec<(String, Vec<ClassicItem>)> = match kind {
        DatasetKind::Cirr => vec![(
            options.cirr_scope(),
            cirr::load_classic(&options.data_path, &options.split)?,
        )],
        DatasetKind::FashionIq => DressType::ALL
            .iter()
            .map(|&dress| {
                fashioniq::load_classic(&options.data_path, dress, &options.split, options.fiq_val_type)
                    .map(|items| (options.fiq_scope(dress), items))
            })
            .collect::<Result<Vec<_>>>()?,
    };

    let mut stored = Vec::with_capacity(scopes.len());
    for (scope, items) in scopes {
        let index = build_index(provider, &items, &scope, Some(&store), options).await?;
        stored.push((scope, index.len()));
    }
    Ok(stored)
}
