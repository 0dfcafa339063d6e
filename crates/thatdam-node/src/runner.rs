//! Wires a node together from configuration and runs it.

use std::sync::Arc;

use thatdam_plan::Applier;
use thatdam_plan::PlanApplier;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::capabilities::probe_host;
use crate::config::NodeConfig;
use crate::discovery::Discoverer;
use crate::error::NodeError;
use crate::handshake::Handshake;
use crate::health::HealthServer;
use crate::leader::LeaderDuties;
use crate::state::StateStore;
use crate::token::token_source;

/// Build the handshake for `config` with host runtimes and discovery.
pub fn build_handshake(config: &NodeConfig, duties: Arc<dyn LeaderDuties>) -> Result<Handshake, NodeError> {
    let discoverer = Discoverer::from_config(config).map_err(|source| NodeError::Discovery { source })?;
    info!(backends = ?discoverer.backend_names(), "discovery configured");
    let applier: Arc<dyn PlanApplier> = Arc::new(Applier::host());
    Ok(Handshake::new(
        StateStore::new(&config.data_dir),
        Arc::new(discoverer),
        token_source(config),
        applier,
    )
    .configure(config)
    .with_capabilities(probe_host())
    .with_duties(duties))
}

/// Serve the node health endpoint and run the handshake until `cancel`.
pub async fn run_node(
    config: NodeConfig,
    duties: Arc<dyn LeaderDuties>,
    cancel: CancellationToken,
) -> Result<(), NodeError> {
    let handshake = build_handshake(&config, duties)?;
    let health = HealthServer::bind(&config.health_listen, handshake.subscribe(), &cancel).await?;
    let result = handshake.run(cancel.clone()).await;
    health.shutdown().await;
    result
}
