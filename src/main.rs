use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cmfs::{CmfsError, Config, Node};
use storage::ReclaimPolicy;

#[derive(Parser, Debug)]
#[command(
    name = "cmfs",
    version,
    about = "Single-node file store with predictive prefetching, driven by JSON lines on stdin"
)]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Virtual disk image
    #[arg(long)]
    disk: Option<PathBuf>,

    /// Number of 4096-byte blocks in the image
    #[arg(long)]
    blocks: Option<u64>,

    /// Lines held by the block cache
    #[arg(long)]
    cache: Option<usize>,

    /// Prefetch candidates returned with each read
    #[arg(long)]
    predictions: Option<usize>,

    /// Milliseconds between access-graph decay rounds (0 disables)
    #[arg(long)]
    decay_interval_ms: Option<u64>,

    /// Reuse blocks of deleted files instead of leaking them
    #[arg(long)]
    reclaim_blocks: bool,
}

impl Args {
    fn into_config(self) -> Result<Config, CmfsError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(disk) = self.disk {
            config.disk_path = disk;
        }
        if let Some(blocks) = self.blocks {
            config.total_blocks = blocks;
        }
        if let Some(cache) = self.cache {
            config.cache_capacity = cache;
        }
        if let Some(predictions) = self.predictions {
            config.prediction_limit = predictions;
        }
        if let Some(interval) = self.decay_interval_ms {
            config.decay_interval_ms = interval;
        }
        if self.reclaim_blocks {
            config.reclaim_policy = ReclaimPolicy::FreeList;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), CmfsError> {
    // stdout carries responses, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Args::parse().into_config()?;
    info!("Node configuration: {:?}", config);

    let node = Node::new(config)?;
    node.start().await?;

    Ok(())
}
