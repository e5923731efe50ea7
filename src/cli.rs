//! Command-line flags shared by the binaries, and the setup they all perform.

use crate::config::Config;
use crate::dataset::fashioniq::FiqValType;
use crate::dataset::DatasetKind;
use crate::embeddings::{HttpEmbedder, ModelOptions, Transform};
use crate::eval::EvalSettings;
use crate::index::ExtractSettings;
use crate::pipeline::PipelineOptions;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

/// Model selection, forwarded to the model server with every request.
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Fine-tuned checkpoint to load on top of the base model.
    #[arg(long = "model-path", alias = "model_path")]
    pub model_path: Option<PathBuf>,

    /// Base BLIP checkpoint.
    #[arg(long = "blip-model-name", alias = "blip_model_name", default_value = "model_base.pth")]
    pub blip_model_name: String,

    /// Load the original pretrained weights instead of the fine-tuned ones.
    #[arg(long = "load_origin", alias = "load-origin")]
    pub load_origin: bool,

    /// Image preprocessing pipeline.
    #[arg(long, value_enum, default_value_t = Transform::TargetPad)]
    pub transform: Transform,

    /// Target ratio of the targetpad transform.
    #[arg(long = "target-ratio", alias = "target_ratio", default_value_t = 1.25)]
    pub target_ratio: f32,
}

impl ModelArgs {
    pub fn model_options(&self) -> ModelOptions {
        ModelOptions {
            base_model: self.blip_model_name.clone(),
            checkpoint: self.model_path.clone(),
            load_origin: self.load_origin,
            transform: self.transform,
            target_ratio: self.target_ratio,
        }
    }
}

/// Which benchmark to read and from where.
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Benchmark: `cirr` or `fiq`.
    #[arg(long)]
    pub dataset: String,

    /// Root directory holding `cirr_dataset/` or `fashionIQ_dataset/`.
    #[arg(long = "data_path", alias = "data-path")]
    pub data_path: PathBuf,

    /// FashionIQ index: 0 = category image split, 1 = images referenced by the captions.
    #[arg(long = "fiq_val_type", alias = "fiq-val-type", default_value_t = 0)]
    pub fiq_val_type: u8,

    #[arg(long, default_value = "val")]
    pub split: String,

    /// Feature store used to cache index features (overrides `storage.features_db`).
    #[arg(long = "features-db", alias = "features_db")]
    pub features_db: Option<PathBuf>,
}

impl DataArgs {
    pub fn dataset_kind(&self) -> crate::Result<DatasetKind> {
        self.dataset.parse()
    }

    /// Pipeline options; fails on an unknown `--fiq_val_type` or an unreadable checkpoint.
    pub fn pipeline_options(
        &self,
        config: &Config,
        model: &ModelOptions,
    ) -> crate::Result<PipelineOptions> {
        Ok(PipelineOptions {
            data_path: self.data_path.clone(),
            split: self.split.clone(),
            fiq_val_type: FiqValType::from_code(self.fiq_val_type)?,
            extract: ExtractSettings {
                num_workers: config.eval.num_workers,
                queue_capacity: config.eval.queue_capacity,
                batch_size: config.embeddings.batch_size,
            },
            features_db: self
                .features_db
                .clone()
                .or_else(|| config.features_db().map(PathBuf::from)),
            model_fingerprint: model.fingerprint()?,
        })
    }
}

/// Resolve the dataset, then load the configuration.
///
/// An unknown `--dataset` is reported as a `Configuration` error before any config file
/// is read.
pub fn startup(data: &DataArgs) -> Result<(DatasetKind, Config)> {
    let kind = data.dataset_kind()?;
    let config = Config::load()?;
    Ok((kind, config))
}

/// Initialize env_logger; `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &Config) {
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.cireval.log_level.as_str()),
    )
    .init();
}

/// Model server client configured from `[embeddings]`.
pub fn build_embedder(config: &Config, options: ModelOptions) -> Result<HttpEmbedder> {
    let api_key = config.api_key();
    if api_key.is_none() {
        log::debug!(
            "{} not set, calling the model server without a token",
            config.embeddings.api_key_env
        );
    }
    HttpEmbedder::new(
        &config.embeddings.endpoint,
        api_key,
        config.embeddings.batch_size,
        config.embeddings.dimensions,
        Duration::from_secs(config.embeddings.timeout_secs),
        options,
    )
    .with_context(|| format!("Failed to create model server client for {}", config.embeddings.endpoint))
}

pub fn eval_settings(config: &Config) -> EvalSettings {
    EvalSettings::from(&config.eval)
}
