use std::sync::Arc;

use log::{error, info};

use crate::node::membership;
use crate::node::state::Node;

/// Waits for SIGINT/SIGTERM and attempts a graceful [`membership::depart`]
/// before the process exits.
pub async fn wait_and_depart(node: Arc<Node>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to install shutdown signal handler: {e}");
        return;
    }
    info!("[{}] shutdown signal received, departing ring", node.short_id());
    if let Err(e) = membership::depart(&node).await {
        error!("[{}] graceful depart failed: {e}", node.short_id());
    }
    std::process::exit(0);
}
