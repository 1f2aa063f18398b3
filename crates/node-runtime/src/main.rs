//! # opx-node
//!
//! The indexer binary: loads configuration from the environment, wires
//! the subsystems, and runs the indexing worker until interrupted.

use anyhow::Result;
use node_runtime::{Node, NodeConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = NodeConfig::from_env()?;
    let node = Node::build(&config)?;

    let shutdown = node.shutdown_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            shutdown.cancel();
        }
    });

    node.run().await
}
