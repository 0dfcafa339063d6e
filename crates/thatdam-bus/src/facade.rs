//! The process-wide bus resource.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::amqp::AmqpTransport;
use crate::audit::AuditLog;
use crate::config::BusConfig;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::inproc::InProcTransport;
use crate::transport::Transport;

/// Cloneable handle to the bus. Clones share one transport.
#[derive(Clone)]
pub struct BusHandle {
    transport: Arc<dyn Transport>,
    audit: Arc<AuditLog>,
}

impl BusHandle {
    /// Open the transport selected by `config`.
    ///
    /// # Errors
    ///
    /// Fails when a broker URL is configured but the first dial fails.
    pub async fn init(config: BusConfig) -> Result<Self> {
        let transport: Arc<dyn Transport> = match config.url.as_deref() {
            Some(url) => Arc::new(AmqpTransport::connect(url, &config.exchange).await?),
            None => Arc::new(InProcTransport::new()),
        };
        info!(transport = transport.name(), exchange = %config.exchange, "event bus ready");
        Ok(Self::with_transport(transport, AuditLog::new(config.audit_log)))
    }

    /// In-process bus auditing to `audit`.
    pub fn in_process(audit: AuditLog) -> Self {
        Self::with_transport(Arc::new(InProcTransport::new()), audit)
    }

    pub fn with_transport(transport: Arc<dyn Transport>, audit: AuditLog) -> Self {
        Self {
            transport,
            audit: Arc::new(audit),
        }
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Wrap `payload` in an envelope and publish it under `topic`.
    pub async fn publish<T: Serialize + ?Sized>(&self, topic: &str, payload: &T) -> Result<()> {
        let body = Envelope::new(topic, payload)?.encode()?;
        self.transport.publish(topic, body).await?;
        debug!(topic, "event published");
        Ok(())
    }

    /// Publish `tenant.<action>` and append it to the audit log.
    ///
    /// The audit append happens even when the publish fails.
    pub async fn publish_tenant_event<T: Serialize + ?Sized>(&self, action: &str, payload: &T) -> Result<()> {
        let topic = format!("tenant.{action}");
        let published = self.publish(&topic, payload).await;
        if let Err(e) = &published {
            warn!(topic = %topic, error = %e, "tenant event publish failed");
        }
        self.audit.append(&topic, payload).await?;
        published
    }

    /// Decoded envelopes whose topic matches `pattern`.
    ///
    /// Undecodable bodies are skipped.
    pub async fn subscribe(&self, pattern: &str) -> Result<mpsc::Receiver<Envelope>> {
        let mut raw = self.transport.subscribe(pattern).await?;
        let (tx, rx) = mpsc::channel(thatdam_constants::bus::SUBSCRIBER_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(body) = raw.recv().await {
                match Envelope::decode(&body) {
                    Ok(envelope) => {
                        if tx.send(envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!(error = %e, "skipping undecodable envelope"),
                }
            }
        });
        Ok(rx)
    }

    pub async fn close(&self) {
        self.transport.close().await;
        info!("event bus closed");
    }
}

impl std::fmt::Debug for BusHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusHandle")
            .field("transport", &self.transport.name())
            .field("audit", &self.audit.path())
            .finish()
    }
}
