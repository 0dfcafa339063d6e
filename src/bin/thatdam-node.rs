//! ThatDam node agent.
//!
//! Finds a supervisor, registers, applies the desired plan and heartbeats.
//! Without a reachable supervisor the node elects itself leader and, with
//! `--host-supervisor`, serves the supervisor API in-process.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use thatdam::config::AppConfig;
use thatdam::shutdown::cancel_on_signal;
use thatdam::telemetry::init_tracing;
use thatdam_auth::TokenIssuer;
use thatdam_bus::AmqpLease;
use thatdam_bus::BusHandle;
use thatdam_node::HostedSupervisor;
use thatdam_node::LeaderDuties;
use thatdam_node::StandardDuties;
use thatdam_node::leader::DEFAULT_LEASE_RING;
use thatdam_policy::EnvPolicy;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "thatdam-node")]
#[command(about = "ThatDam node agent")]
struct Args {
    /// TOML configuration file.
    #[arg(long, env = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Directory holding `cluster.json`.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Skip discovery and use this supervisor.
    #[arg(long)]
    supervisor_url: Option<String>,

    /// Role hint sent at registration.
    #[arg(long)]
    role_hint: Option<String>,

    /// Serve the supervisor API when elected leader.
    #[arg(long)]
    host_supervisor: bool,

    /// Health endpoint listen address.
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("node failed: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(dir) = args.data_dir {
        config.node.data_dir = dir;
    }
    if let Some(url) = args.supervisor_url {
        config.node.supervisor_url = Some(url);
    }
    if let Some(hint) = args.role_hint {
        config.node.role_hint = hint;
    }
    if args.host_supervisor {
        config.node.host_supervisor = true;
    }
    if let Some(listen) = args.listen {
        config.node.health_listen = listen;
    }

    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone());

    let (duties, bus) = leader_duties(&config, &cancel).await?;
    info!(
        data_dir = %config.node.data_dir.display(),
        host_supervisor = config.node.host_supervisor,
        "node starting"
    );

    let result = thatdam_node::run_node(config.node, duties, cancel).await;
    if let Some(bus) = bus {
        bus.close().await;
    }
    result.context("node handshake failed")?;
    info!("node stopped");
    Ok(())
}

async fn leader_duties(
    config: &AppConfig,
    cancel: &CancellationToken,
) -> Result<(Arc<dyn LeaderDuties>, Option<BusHandle>)> {
    let mut duties = StandardDuties::new(cancel).with_mdns(config.node.advertise_mdns);
    if let Some(url) = &config.bus.url {
        duties = duties.with_lease(Arc::new(AmqpLease::new(url.clone())), DEFAULT_LEASE_RING);
    }
    if !config.node.host_supervisor {
        let duties: Arc<dyn LeaderDuties> = Arc::new(duties);
        return Ok((duties, None));
    }

    let issuer = TokenIssuer::from_config(&config.auth).context("failed to load signing key")?;
    let bus = BusHandle::init(config.bus.clone()).await.context("failed to connect event bus")?;
    let hosted = HostedSupervisor::new(config.supervisor.clone(), Arc::new(issuer), bus.clone())
        .with_policy(Arc::new(EnvPolicy::new(config.policy.clone())));
    let duties: Arc<dyn LeaderDuties> = Arc::new(duties.with_hosted_supervisor(hosted));
    Ok((duties, Some(bus)))
}
