//! Evaluation CLI: Recall@K (and group Recall@K for CIRR) of a composed image retrieval model.

use anyhow::{Context, Result};
use cireval::cli::{self, DataArgs, ModelArgs};
use cireval::pipeline;
use clap::Parser;
use std::path::PathBuf;

/// Evaluate a fusion model on FashionIQ or CIRR validation data.
#[derive(Parser, Debug)]
#[command(name = "cireval", version)]
struct Args {
    #[command(flatten)]
    data: DataArgs,

    #[command(flatten)]
    model: ModelArgs,

    /// Write the full report as JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (kind, config) = cli::startup(&args.data)?;
    cli::init_logging(&config);

    log::info!("Starting cireval v{}", env!("CARGO_PKG_VERSION"));
    let model = args.model.model_options();
    let options = args.data.pipeline_options(&config, &model)?;
    log::info!("Dataset: {} ({})", kind, options.data_path.display());
    log::info!("Model: {}", options.model_fingerprint);

    let embedder = cli::build_embedder(&config, model)?;
    let report = pipeline::run(kind, &embedder, &cli::eval_settings(&config), &options).await?;

    print!("{}", report);

    if let Some(path) = &args.output {
        std::fs::write(path, report.to_json_pretty()?)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        log::info!("Report {} written to {}", report.run_id, path.display());
    }

    Ok(())
}
