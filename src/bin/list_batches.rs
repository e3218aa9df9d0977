use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use pw_announcer::config;
use pw_announcer::platform::{PwClient, TokenStatus};

#[derive(Parser, Debug)]
#[command(about = "Print the batches visible to the configured token")]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let client = PwClient::from_config(&cfg.platform)?;

    if let TokenStatus::Invalid(failure) = client.verify_token().await {
        anyhow::bail!("token rejected: {}", failure);
    }

    let batches = client.list_batches().await.map_err(anyhow::Error::new)?;
    if batches.is_empty() {
        println!("No purchased batches are visible to this token.");
        return Ok(());
    }

    println!("Purchased batches:");
    for batch in &batches {
        println!("  {} | id: {}", batch.name, batch.id);
    }
    println!("\nCopy the ids you want into platform.tracked_batch_ids in {}.", args.config.display());
    Ok(())
}
