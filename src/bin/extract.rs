//! Precompute index features into the feature store so evaluation runs skip extraction.

use anyhow::Result;
use cireval::cli::{self, DataArgs, ModelArgs};
use cireval::pipeline;
use clap::Parser;

/// Extract index features for every split the dataset evaluates.
#[derive(Parser, Debug)]
#[command(name = "extract")]
struct Args {
    #[command(flatten)]
    data: DataArgs,

    #[command(flatten)]
    model: ModelArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (kind, config) = cli::startup(&args.data)?;
    cli::init_logging(&config);

    let model = args.model.model_options();
    let options = args.data.pipeline_options(&config, &model)?;
    let Some(features_db) = options.features_db.clone() else {
        anyhow::bail!("No feature store: pass --features-db or set storage.features_db");
    };

    let embedder = cli::build_embedder(&config, model)?;
    let start = std::time::Instant::now();
    let stored = pipeline::precompute(kind, &embedder, &options).await?;

    println!("Stored in {}:", features_db.display());
    for (scope, count) in &stored {
        println!("  {:<24} {:>8} images", scope, count);
    }
    println!("Done in {:.1}s", start.elapsed().as_secs_f64());

    Ok(())
}
