//! Node-local `GET /health`.

use std::net::SocketAddr;

use axum::extract::State;
use axum::routing::get;
use axum::Json;
use axum::Router;
use snafu::ResultExt;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use crate::error::HealthBindSnafu;
use crate::error::NodeError;
use crate::status::NodeStatus;

pub fn health_router(status: watch::Receiver<NodeStatus>) -> Router {
    Router::new().route("/health", get(health)).with_state(status)
}

async fn health(State(status): State<watch::Receiver<NodeStatus>>) -> Json<NodeStatus> {
    Json(status.borrow().clone())
}

/// Serves the node health endpoint until cancelled.
pub struct HealthServer {
    addr: SocketAddr,
    task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl HealthServer {
    pub async fn bind(
        addr: &str,
        status: watch::Receiver<NodeStatus>,
        parent: &CancellationToken,
    ) -> Result<Self, NodeError> {
        let listener = TcpListener::bind(addr).await.context(HealthBindSnafu { addr })?;
        Self::start(listener, status, parent)
    }

    pub fn start(
        listener: TcpListener,
        status: watch::Receiver<NodeStatus>,
        parent: &CancellationToken,
    ) -> Result<Self, NodeError> {
        let addr = listener.local_addr().context(HealthBindSnafu { addr: "listener" })?;
        let cancel = parent.child_token();
        let shutdown = cancel.clone();
        let app = health_router(status);
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app).with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(e) = served.await {
                warn!(error = %e, "node health endpoint stopped");
            }
        });
        info!(%addr, "node health endpoint listening");
        Ok(Self {
            addr,
            task: Some(task),
            cancel,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for HealthServer {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
