//! Server lifecycle.
//!
//! [`SupervisorServer`] owns the listener task and the background sweeps.
//! Cancelling the parent token (or calling [`SupervisorServer::shutdown`])
//! stops accepting connections, drains in-flight requests and stops the
//! sweeps.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use snafu::ResultExt;
use snafu::Snafu;
use thatdam_claims::ClaimSweeper;
use thatdam_constants::supervisor::TASK_SHUTDOWN_GRACE_SECS;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use crate::router::build_router;
use crate::state::SupervisorState;
use crate::sweeper::StaleSweeper;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ServeError {
    #[snafu(display("failed to bind {addr}: {source}"))]
    Bind { addr: String, source: std::io::Error },

    #[snafu(display("server failed: {source}"))]
    Serve { source: std::io::Error },

    #[snafu(display("server task panicked: {source}"))]
    Join { source: tokio::task::JoinError },
}

/// Handle to a running control plane.
pub struct SupervisorServer {
    addr: SocketAddr,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<(), ServeError>>>,
}

impl SupervisorServer {
    /// Bind `addr` and start serving.
    pub async fn bind(addr: &str, state: Arc<SupervisorState>, parent: &CancellationToken) -> Result<Self, ServeError> {
        let listener = TcpListener::bind(addr).await.context(BindSnafu { addr })?;
        Self::start(listener, state, parent)
    }

    /// Serve on an already bound listener.
    pub fn start(
        listener: TcpListener,
        state: Arc<SupervisorState>,
        parent: &CancellationToken,
    ) -> Result<Self, ServeError> {
        let addr = listener.local_addr().context(ServeSnafu)?;
        let cancel = parent.child_token();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let stale = StaleSweeper::spawn(state.registry.clone(), &token);
            let claims = ClaimSweeper::spawn(state.claims.clone(), token.clone());
            let router = build_router(state);

            info!(%addr, "supervisor listening");
            let shutdown = token.clone();
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .context(ServeSnafu);

            token.cancel();
            stale.shutdown().await;
            claims.shutdown().await;
            info!("supervisor stopped");
            served
        });
        Ok(Self {
            addr,
            cancel,
            task: Some(task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL reachable from this host.
    pub fn url(&self) -> String {
        let mut addr = self.addr;
        if addr.ip().is_unspecified() {
            addr.set_ip(std::net::Ipv4Addr::LOCALHOST.into());
        }
        format!("http://{addr}")
    }

    /// Wait for the server to stop on its own (parent cancellation).
    pub async fn wait(mut self) -> Result<(), ServeError> {
        match self.task.take() {
            Some(task) => task.await.context(JoinSnafu)?,
            None => Ok(()),
        }
    }

    /// Stop serving and wait up to the grace period.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let grace = Duration::from_secs(TASK_SHUTDOWN_GRACE_SECS);
            match tokio::time::timeout(grace, task).await {
                Ok(Ok(Err(e))) => warn!(error = %e, "supervisor exited with error"),
                Ok(Err(e)) => warn!(error = %e, "supervisor task failed"),
                Err(_) => warn!("supervisor did not stop within grace period"),
                Ok(Ok(Ok(()))) => {}
            }
        }
    }
}

impl Drop for SupervisorServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.cancel.cancel();
            task.abort();
        }
    }
}
