//! Message-bus seam.
//!
//! The broker itself is an external collaborator; this module names the
//! interface the adapter consumes (deliveries with manual ack, endpoint
//! publish) and ships an in-process implementation used for local runs and
//! tests. A production deployment wires the platform's transport behind the
//! same trait.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use semdex_core::{Error, Result};

/// One in-flight message. Handlers ack after they finish; a delivery dropped
/// without ack stays unacknowledged on the transport.
pub struct Delivery {
    pub payload: Vec<u8>,
    ack: Option<Box<dyn FnOnce() + Send>>,
}

impl Delivery {
    pub fn new(payload: Vec<u8>, ack: impl FnOnce() + Send + 'static) -> Self {
        Self {
            payload,
            ack: Some(Box::new(ack)),
        }
    }

    pub fn ack(mut self) {
        if let Some(ack) = self.ack.take() {
            ack();
        }
    }
}

/// Transport interface: one consumer stream per endpoint, fire-and-forget
/// publish. Consumers receive one delivery at a time (prefetch = 1).
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn consume(&self, endpoint: &str) -> Result<mpsc::UnboundedReceiver<Delivery>>;
    async fn publish(&self, endpoint: &str, payload: Vec<u8>) -> Result<()>;
}

/// In-process bus backed by tokio channels.
#[derive(Default)]
pub struct MemoryBus {
    consumers: Mutex<HashMap<String, mpsc::UnboundedSender<Delivery>>>,
    published: Mutex<HashMap<String, Vec<Vec<u8>>>>,
    acked: Arc<AtomicUsize>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message for a bound consumer.
    pub fn send(&self, endpoint: &str, payload: Vec<u8>) -> Result<()> {
        let consumers = self.consumers.lock();
        let sender = consumers
            .get(endpoint)
            .ok_or_else(|| Error::Internal(format!("no consumer bound to '{endpoint}'")))?;
        let acked = self.acked.clone();
        let delivery = Delivery::new(payload, move || {
            acked.fetch_add(1, Ordering::SeqCst);
        });
        sender
            .send(delivery)
            .map_err(|_| Error::Internal(format!("consumer for '{endpoint}' is gone")))
    }

    /// Messages published to an endpoint nobody consumes, kept for
    /// inspection.
    pub fn published(&self, endpoint: &str) -> Vec<Vec<u8>> {
        self.published
            .lock()
            .get(endpoint)
            .cloned()
            .unwrap_or_default()
    }

    /// Total deliveries acknowledged so far.
    pub fn ack_count(&self) -> usize {
        self.acked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn consume(&self, endpoint: &str) -> Result<mpsc::UnboundedReceiver<Delivery>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.consumers.lock().insert(endpoint.to_string(), tx);
        Ok(rx)
    }

    async fn publish(&self, endpoint: &str, payload: Vec<u8>) -> Result<()> {
        if let Some(sender) = self.consumers.lock().get(endpoint) {
            let acked = self.acked.clone();
            let delivery = Delivery::new(payload, move || {
                acked.fetch_add(1, Ordering::SeqCst);
            });
            let _ = sender.send(delivery);
            return Ok(());
        }
        self.published
            .lock()
            .entry(endpoint.to_string())
            .or_default()
            .push(payload);
        Ok(())
    }
}
