//! Model server diagnostics: loaded model and accelerator memory.

use anyhow::Result;
use cireval::cli;
use cireval::embeddings::ModelOptions;
use cireval::Config;

const MIB: f64 = 1024.0 * 1024.0;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    cli::init_logging(&config);

    let embedder = cli::build_embedder(&config, ModelOptions::default())?;
    let status = embedder.status().await?;

    println!("\n=== Model Server ===\n");
    println!("Endpoint: {}", config.embeddings.endpoint);
    println!("Model:    {}", status.model);

    if status.devices.is_empty() {
        println!("\nNo accelerator available, the server runs on CPU.");
        return Ok(());
    }

    println!("\n{:<4} {:<32} {:>14} {:>14}", "#", "Device", "Allocated MiB", "Reserved MiB");
    for (i, device) in status.devices.iter().enumerate() {
        println!(
            "{:<4} {:<32} {:>14.1} {:>14.1}",
            i,
            device.name,
            device.memory_allocated as f64 / MIB,
            device.memory_reserved as f64 / MIB
        );
    }

    Ok(())
}
