//! AMQP transport over a topic exchange.
//!
//! Publishes that cannot reach the broker go into a bounded [`RetryQueue`].
//! A pump task re-dials with exponential backoff (capped) and drains the
//! queue in order once the link is back. Subscriptions are bound to the
//! connection they were made on and end when it drops.

use std::sync::Arc;
use std::sync::PoisonError;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::BasicConsumeOptions;
use lapin::options::BasicPublishOptions;
use lapin::options::ExchangeDeclareOptions;
use lapin::options::QueueBindOptions;
use lapin::options::QueueDeclareOptions;
use lapin::types::FieldTable;
use lapin::BasicProperties;
use lapin::Channel;
use lapin::Connection;
use lapin::ConnectionProperties;
use lapin::ExchangeKind;
use snafu::ResultExt;
use thatdam_constants::bus::MAX_PENDING_PUBLISHES;
use thatdam_constants::bus::SUBSCRIBER_CHANNEL_CAPACITY;
use thatdam_constants::network::BACKOFF_INITIAL_SECS;
use thatdam_constants::network::BACKOFF_MAX_SECS;
use thatdam_constants::supervisor::TASK_SHUTDOWN_GRACE_SECS;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error::AmqpSnafu;
use crate::error::BusError;
use crate::error::ConnectSnafu;
use crate::error::Result;
use crate::retry::PendingPublish;
use crate::retry::RetryQueue;
use crate::transport::Transport;

/// Link health re-check interval while connected.
const LINK_CHECK_INTERVAL: Duration = Duration::from_secs(5);

struct Link {
    conn: Connection,
    channel: Channel,
}

impl Link {
    fn is_connected(&self) -> bool {
        self.conn.status().connected() && self.channel.status().connected()
    }
}

async fn dial(url: &str, exchange: &str) -> Result<Link> {
    let conn = Connection::connect(url, ConnectionProperties::default()).await.context(ConnectSnafu)?;
    let channel = conn.create_channel().await.context(AmqpSnafu { op: "create channel" })?;
    channel
        .exchange_declare(
            exchange,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .context(AmqpSnafu { op: "declare exchange" })?;
    Ok(Link { conn, channel })
}

async fn send(channel: &Channel, exchange: &str, topic: &str, body: &[u8]) -> Result<()> {
    channel
        .basic_publish(
            exchange,
            topic,
            BasicPublishOptions::default(),
            body,
            BasicProperties::default().with_content_type("application/json".into()),
        )
        .await
        .context(AmqpSnafu { op: "publish" })?;
    Ok(())
}

struct Inner {
    url: String,
    exchange: String,
    link: Mutex<Option<Link>>,
    pending: std::sync::Mutex<RetryQueue>,
    wake: Notify,
}

impl Inner {
    fn enqueue(&self, topic: &str, body: Vec<u8>) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.push(PendingPublish {
            topic: topic.to_string(),
            body,
        });
    }

    fn has_pending(&self) -> bool {
        !self.pending.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    fn pop_pending(&self) -> Option<PendingPublish> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).pop()
    }

    fn requeue(&self, item: PendingPublish) {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).requeue_front(item);
    }

    /// Re-dial if needed and drain the retry queue. False when the broker
    /// is unreachable.
    async fn flush(&self) -> bool {
        let mut link = self.link.lock().await;
        if !link.as_ref().is_some_and(Link::is_connected) {
            *link = None;
            match dial(&self.url, &self.exchange).await {
                Ok(fresh) => {
                    info!(exchange = %self.exchange, "broker connection established");
                    *link = Some(fresh);
                }
                Err(e) => {
                    warn!(error = %e, "broker unreachable");
                    return false;
                }
            }
        }
        let Some(current) = link.as_ref() else {
            return false;
        };

        while let Some(item) = self.pop_pending() {
            if let Err(e) = send(&current.channel, &self.exchange, &item.topic, &item.body).await {
                warn!(topic = %item.topic, error = %e, "retry publish failed");
                self.requeue(item);
                *link = None;
                return false;
            }
            debug!(topic = %item.topic, "retried publish delivered");
        }
        true
    }
}

async fn pump(inner: Arc<Inner>, cancel: CancellationToken) {
    let initial = Duration::from_secs(BACKOFF_INITIAL_SECS);
    let max = Duration::from_secs(BACKOFF_MAX_SECS);
    let mut backoff = initial;
    loop {
        let healthy = inner.flush().await;
        let wait = if healthy {
            backoff = initial;
            LINK_CHECK_INTERVAL
        } else {
            let current = backoff;
            backoff = (backoff * 2).min(max);
            current
        };
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = inner.wake.notified(), if healthy => {}
            _ = tokio::time::sleep(wait) => {}
        }
    }
    debug!("broker pump stopped");
}

/// Topic-exchange transport with reconnect and bounded retry.
pub struct AmqpTransport {
    inner: Arc<Inner>,
    cancel: CancellationToken,
    pump: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl AmqpTransport {
    /// Dial `url`, declare `exchange` and start the reconnect pump.
    ///
    /// The first dial must succeed; later outages are absorbed.
    pub async fn connect(url: &str, exchange: &str) -> Result<Self> {
        Self::connect_with_capacity(url, exchange, MAX_PENDING_PUBLISHES).await
    }

    pub async fn connect_with_capacity(url: &str, exchange: &str, capacity: usize) -> Result<Self> {
        let link = dial(url, exchange).await?;
        info!(exchange, "connected to broker");
        let inner = Arc::new(Inner {
            url: url.to_string(),
            exchange: exchange.to_string(),
            link: Mutex::new(Some(link)),
            pending: std::sync::Mutex::new(RetryQueue::new(capacity)),
            wake: Notify::new(),
        });
        let cancel = CancellationToken::new();
        let task = tokio::spawn(pump(inner.clone(), cancel.clone()));
        Ok(Self {
            inner,
            cancel,
            pump: std::sync::Mutex::new(Some(task)),
        })
    }

    /// Publishes waiting for the broker.
    pub fn pending(&self) -> usize {
        self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for AmqpTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    fn name(&self) -> &'static str {
        "amqp"
    }

    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(BusError::Closed);
        }
        if !self.inner.has_pending() {
            let mut link = self.inner.link.lock().await;
            if let Some(current) = link.as_ref().filter(|l| l.is_connected()) {
                match send(&current.channel, &self.inner.exchange, topic, &body).await {
                    Ok(()) => return Ok(()),
                    Err(e) => warn!(topic, error = %e, "publish failed, queueing for retry"),
                }
            }
            *link = None;
        }
        self.inner.enqueue(topic, body);
        self.inner.wake.notify_one();
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<mpsc::Receiver<Vec<u8>>> {
        let link = self.inner.link.lock().await;
        let current = link.as_ref().filter(|l| l.is_connected()).ok_or(BusError::NotConnected)?;
        let channel = &current.channel;

        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .context(AmqpSnafu { op: "declare queue" })?;
        channel
            .queue_bind(
                queue.name().as_str(),
                &self.inner.exchange,
                pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .context(AmqpSnafu { op: "bind queue" })?;
        let mut consumer = channel
            .basic_consume(
                queue.name().as_str(),
                "",
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .context(AmqpSnafu { op: "consume" })?;

        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let pattern = pattern.to_string();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                let delivery = tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = consumer.next() => next,
                };
                match delivery {
                    Some(Ok(delivery)) => {
                        if tx.send(delivery.data).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(pattern = %pattern, error = %e, "subscription ended");
                        break;
                    }
                    None => break,
                }
            }
        });
        Ok(rx)
    }

    async fn close(&self) {
        self.cancel.cancel();
        let task = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            let grace = Duration::from_secs(TASK_SHUTDOWN_GRACE_SECS);
            if tokio::time::timeout(grace, task).await.is_err() {
                warn!("broker pump did not stop within grace period");
            }
        }
        if !self.inner.flush().await {
            warn!(dropped = self.pending(), "closing with undelivered publishes");
        }
        if let Some(link) = self.inner.link.lock().await.take() {
            if let Err(e) = link.conn.close(200, "closing").await {
                debug!(error = %e, "broker close");
            }
        }
    }
}
