//! ThatDam supervisor.
//!
//! Serves agent registration, plans, heartbeats, claims, token exchange and
//! JWKS. Configuration comes from `--config` / `CONFIG_FILE` and the
//! environment; flags override both.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use thatdam::config::AppConfig;
use thatdam::shutdown::shutdown_signal;
use thatdam::telemetry::init_tracing;
use thatdam_auth::TokenIssuer;
use thatdam_auth::TokenValidator;
use thatdam_bus::BusHandle;
use thatdam_policy::EnvPolicy;
use thatdam_supervisor::SupervisorServer;
use thatdam_supervisor::SupervisorState;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "thatdam-supervisor")]
#[command(about = "ThatDam control-plane supervisor")]
struct Args {
    /// TOML configuration file.
    #[arg(long, env = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Listen address (overrides `SUPERVISOR_LISTEN`).
    #[arg(long)]
    listen: Option<String>,

    /// Extra directory searched first for plan templates.
    #[arg(long)]
    plan_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("supervisor failed: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(listen) = args.listen {
        config.supervisor.listen = listen;
    }
    if let Some(dir) = args.plan_dir {
        config.supervisor.plan_dir = Some(dir);
    }

    let issuer = TokenIssuer::from_config(&config.auth).context("failed to load signing key")?;
    let bus = BusHandle::init(config.bus.clone()).await.context("failed to connect event bus")?;
    info!(transport = bus.transport_name(), kid = issuer.kid(), "supervisor starting");

    let mut state = SupervisorState::new(config.supervisor.clone(), Arc::new(issuer), bus.clone())
        .with_policy(Arc::new(EnvPolicy::new(config.policy.clone())));
    if let Some(url) = &config.auth.jwks_url {
        info!(jwks = %url, "validating tokens against remote JWKS");
        state = state.with_validator(TokenValidator::remote(
            url.clone(),
            config.auth.issuer.clone(),
            config.auth.audience.clone(),
        ));
    }

    let cancel = CancellationToken::new();
    let server = SupervisorServer::bind(&config.supervisor.listen, Arc::new(state), &cancel)
        .await
        .context("failed to start supervisor")?;
    info!(url = %server.url(), "supervisor ready");

    shutdown_signal().await;
    cancel.cancel();
    server.shutdown().await;
    bus.close().await;
    info!("supervisor stopped");
    Ok(())
}
