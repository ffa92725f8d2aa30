// Path: crates/cli/src/commands/start.rs

use super::CliError;
use crate::chain_client::FileChainClient;
use mlayer_node::node::Node;
use mlayer_types::config::NodeConfig;
use std::sync::Arc;

/// `mlayer start`: boots the node and runs until interrupted.
pub fn run_start(config: NodeConfig) -> Result<(), CliError> {
    mlayer_telemetry::init_tracing().map_err(CliError::Internal)?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::Internal(anyhow::anyhow!(e)))?;
    runtime.block_on(async {
        let chain_path = config.data_dir.join("chain.json");
        let chain_client = Arc::new(FileChainClient::new(chain_path));
        let node = Node::start(config, chain_client)
            .await
            .map_err(CliError::Internal)?;

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| CliError::Internal(anyhow::anyhow!(e)))?;
        tracing::info!(target: "node", "shutting down");
        node.stop().await;
        Ok(())
    })
}
