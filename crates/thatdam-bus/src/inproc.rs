//! In-process transport.

use std::sync::Mutex;
use std::sync::PoisonError;

use async_trait::async_trait;
use thatdam_constants::bus::SUBSCRIBER_CHANNEL_CAPACITY;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::BusError;
use crate::error::Result;
use crate::topic::topic_matches;
use crate::transport::Transport;

/// Fan-out to local subscribers. Full or closed subscriber channels are
/// skipped so publishers never block.
#[derive(Default)]
pub struct InProcTransport {
    subscribers: Mutex<Vec<(String, mpsc::Sender<Vec<u8>>)>>,
    closed: std::sync::atomic::AtomicBool,
}

impl InProcTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::Acquire)
    }
}

#[async_trait]
impl Transport for InProcTransport {
    fn name(&self) -> &'static str {
        "inproc"
    }

    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<()> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        let targets: Vec<mpsc::Sender<Vec<u8>>> = {
            let mut subs = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            subs.retain(|(_, tx)| !tx.is_closed());
            subs.iter().filter(|(pattern, _)| topic_matches(pattern, topic)).map(|(_, tx)| tx.clone()).collect()
        };
        for tx in targets {
            if tx.try_send(body.clone()).is_err() {
                debug!(topic, "subscriber full, envelope dropped");
            }
        }
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<mpsc::Receiver<Vec<u8>>> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner).push((pattern.to_string(), tx));
        Ok(rx)
    }

    async fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::Release);
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wildcard_subscription_receives_matching_topics() {
        let t = InProcTransport::new();
        let mut all = t.subscribe("overlay.*").await.unwrap();
        let mut one = t.subscribe("overlay.heartbeat").await.unwrap();

        t.publish("overlay.register", b"r".to_vec()).await.unwrap();
        t.publish("overlay.heartbeat", b"h".to_vec()).await.unwrap();
        t.publish("tenant.created", b"t".to_vec()).await.unwrap();

        assert_eq!(all.recv().await, Some(b"r".to_vec()));
        assert_eq!(all.recv().await, Some(b"h".to_vec()));
        assert_eq!(one.recv().await, Some(b"h".to_vec()));
        assert!(all.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_ends_streams_and_rejects_publish() {
        let t = InProcTransport::new();
        let mut rx = t.subscribe("#").await.unwrap();
        t.close().await;

        assert_eq!(rx.recv().await, None);
        assert!(matches!(t.publish("x", Vec::new()).await, Err(BusError::Closed)));
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let t = InProcTransport::new();
        drop(t.subscribe("#").await.unwrap());
        t.publish("x", Vec::new()).await.unwrap();
        assert!(t.subscribers.lock().unwrap().is_empty());
    }
}
