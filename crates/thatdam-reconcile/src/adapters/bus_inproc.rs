//! In-process event bus.
//!
//! A published message goes to every queue with a binding whose key or
//! exchange equals the topic. Delivery is best effort: a subscriber whose
//! channel is full misses the message rather than stalling the publisher.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::Weak;

use async_trait::async_trait;
use thatdam_constants::bus::SUBSCRIBER_CHANNEL_CAPACITY;
use tokio::sync::mpsc;
use tracing::debug;

use super::validate_name;
use crate::error::PortError;
use crate::ports::Binding;
use crate::ports::EventBus;
use crate::ports::Exchange;
use crate::ports::Queue;
use crate::ports::Subscription;

#[derive(Default)]
struct BusState {
    exchanges: HashMap<String, Exchange>,
    queues: HashMap<String, Queue>,
    bindings: BTreeSet<Binding>,
    subscribers: HashMap<String, Vec<(u64, mpsc::Sender<Vec<u8>>)>>,
    next_subscriber: u64,
}

#[derive(Clone, Default)]
pub struct InProcBus {
    state: Arc<RwLock<BusState>>,
}

impl InProcBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exchange_count(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).exchanges.len()
    }

    pub fn queue_count(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).queues.len()
    }

    pub fn binding_count(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).bindings.len()
    }

    pub fn subscriber_count(&self, queue: &str) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .get(queue)
            .map_or(0, Vec::len)
    }

    fn detach(state: &Weak<RwLock<BusState>>, queue: &str, id: u64) {
        let Some(state) = state.upgrade() else {
            return;
        };
        let mut guard = state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(subs) = guard.subscribers.get_mut(queue) {
            subs.retain(|(sub_id, _)| *sub_id != id);
        }
    }
}

impl std::fmt::Debug for InProcBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcBus").finish_non_exhaustive()
    }
}

#[async_trait]
impl EventBus for InProcBus {
    async fn ensure_exchange(&self, exchange: &Exchange) -> Result<(), PortError> {
        validate_name(&exchange.name)?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.exchanges.insert(exchange.name.clone(), exchange.clone());
        Ok(())
    }

    async fn ensure_queue(&self, queue: &Queue) -> Result<(), PortError> {
        validate_name(&queue.name)?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.queues.entry(queue.name.clone()).or_insert_with(|| queue.clone());
        Ok(())
    }

    async fn ensure_binding(&self, binding: &Binding) -> Result<(), PortError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.exchanges.contains_key(&binding.exchange) {
            return Err(PortError::ExchangeNotDeclared {
                exchange: binding.exchange.clone(),
            });
        }
        if !state.queues.contains_key(&binding.queue) {
            return Err(PortError::QueueNotDeclared {
                queue: binding.queue.clone(),
            });
        }
        state.bindings.insert(binding.clone());
        Ok(())
    }

    async fn publish(&self, topic: &str, body: &[u8], message_id: &str) -> Result<(), PortError> {
        let targets: Vec<mpsc::Sender<Vec<u8>>> = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            let queues: BTreeSet<&str> = state
                .bindings
                .iter()
                .filter(|b| b.key == topic || b.exchange == topic)
                .map(|b| b.queue.as_str())
                .collect();
            queues
                .into_iter()
                .filter_map(|q| state.subscribers.get(q))
                .flat_map(|subs| subs.iter().map(|(_, tx)| tx.clone()))
                .collect()
        };

        for tx in targets {
            if tx.try_send(body.to_vec()).is_err() {
                debug!(topic, message_id, "subscriber slow or gone, message dropped");
            }
        }
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> Result<Subscription, PortError> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let id = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if !state.queues.contains_key(queue) {
                return Err(PortError::QueueNotDeclared {
                    queue: queue.to_string(),
                });
            }
            let id = state.next_subscriber;
            state.next_subscriber += 1;
            state.subscribers.entry(queue.to_string()).or_default().push((id, tx));
            id
        };
        let weak = Arc::downgrade(&self.state);
        let queue = queue.to_string();
        Ok(Subscription::new(rx, move || InProcBus::detach(&weak, &queue, id)))
    }
}
