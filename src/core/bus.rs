//! In-process publish/subscribe message bus.
//!
//! Every subscription owns a worker task fed by a bounded queue, so a handler
//! never runs on the sender's stack and one agent handles its envelopes one at
//! a time, in arrival order. The registry lock only covers lookup and
//! mutation; handlers always run without it.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};

use super::journal::Journal;
use crate::config::{BusConfig, UndeliverablePolicy};
use crate::error::Result;
use crate::protocol::Envelope;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("no subscriber registered for '{0}'")]
    NoSubscriber(String),

    #[error("every inbound queue for '{0}' is full or closed")]
    QueueFull(String),
}

/// Receives envelopes addressed to the name it was subscribed under.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, envelope: Envelope) -> Result<()>;
}

/// Handler backed by an async closure.
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, envelope: Envelope) -> Result<()> {
        (self.0)(envelope).await
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Handle returned by [`Bus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone)]
pub struct Subscription {
    name: String,
    id: SubscriptionId,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

struct Slot {
    id: SubscriptionId,
    tx: mpsc::Sender<Envelope>,
}

struct Inner {
    registry: RwLock<HashMap<String, Vec<Slot>>>,
    next_id: AtomicU64,
    config: BusConfig,
    journal: Journal,
}

/// Cheaply cloneable bus handle. Each clone addresses the same registry.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<Inner>,
}

impl Bus {
    pub fn new(config: BusConfig) -> Self {
        let journal = Journal::new(config.journal_capacity);
        Self {
            inner: Arc::new(Inner {
                registry: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                config,
                journal,
            }),
        }
    }

    /// Register `handler` for every future envelope whose receiver is `name`.
    ///
    /// Spawns the subscription's worker, so this must be called from within a
    /// Tokio runtime.
    pub fn subscribe(&self, name: impl Into<String>, handler: Arc<dyn Handler>) -> Subscription {
        let name = name.into();
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.inner.config.queue_capacity);

        tokio::spawn(run_worker(name.clone(), handler, rx));

        self.inner
            .registry
            .write()
            .entry(name.clone())
            .or_default()
            .push(Slot { id, tx });

        debug!(agent = %name, subscription = id.0, "Subscribed");
        Subscription { name, id }
    }

    /// Remove a subscription. Its worker finishes the envelopes already
    /// queued and then exits. Returns false if it was already gone.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut registry = self.inner.registry.write();
        let Some(slots) = registry.get_mut(&subscription.name) else {
            return false;
        };

        let before = slots.len();
        slots.retain(|slot| slot.id != subscription.id);
        let removed = slots.len() != before;
        if slots.is_empty() {
            registry.remove(&subscription.name);
        }

        if removed {
            debug!(agent = %subscription.name, subscription = subscription.id.0, "Unsubscribed");
        }
        removed
    }

    /// Deliver `envelope` to every handler registered under its receiver.
    ///
    /// Returns how many handlers it was queued to. Never waits for a handler
    /// to run; a full queue skips that handler.
    pub fn send(&self, envelope: Envelope) -> std::result::Result<usize, DeliveryError> {
        self.inner.journal.record(&envelope);

        let targets: Vec<mpsc::Sender<Envelope>> = {
            let registry = self.inner.registry.read();
            registry
                .get(envelope.receiver())
                .map(|slots| slots.iter().map(|slot| slot.tx.clone()).collect())
                .unwrap_or_default()
        };

        debug!(
            trace_id = %envelope.trace_id(),
            kind = %envelope.kind(),
            sender = envelope.sender(),
            receiver = envelope.receiver(),
            handlers = targets.len(),
            "Sending envelope"
        );

        if targets.is_empty() {
            return self.undeliverable(&envelope);
        }

        let mut delivered = 0;
        for tx in &targets {
            match tx.try_send(envelope.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => warn!(
                    trace_id = %envelope.trace_id(),
                    receiver = envelope.receiver(),
                    "Inbound queue full, envelope skipped for one handler"
                ),
                Err(TrySendError::Closed(_)) => warn!(
                    trace_id = %envelope.trace_id(),
                    receiver = envelope.receiver(),
                    "Handler worker has stopped, envelope skipped"
                ),
            }
        }

        if delivered == 0 {
            return Err(DeliveryError::QueueFull(envelope.receiver().to_string()));
        }
        Ok(delivered)
    }

    fn undeliverable(&self, envelope: &Envelope) -> std::result::Result<usize, DeliveryError> {
        match self.inner.config.undeliverable {
            UndeliverablePolicy::Drop => Ok(0),
            UndeliverablePolicy::Warn => {
                warn!(
                    trace_id = %envelope.trace_id(),
                    kind = %envelope.kind(),
                    receiver = envelope.receiver(),
                    "No subscriber, envelope dropped"
                );
                Ok(0)
            }
            UndeliverablePolicy::Reject => Err(DeliveryError::NoSubscriber(
                envelope.receiver().to_string(),
            )),
        }
    }

    /// Number of handlers currently registered under `name`.
    pub fn subscribers(&self, name: &str) -> usize {
        self.inner
            .registry
            .read()
            .get(name)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Record of recently sent envelopes.
    pub fn journal(&self) -> &Journal {
        &self.inner.journal
    }

    /// Drop every subscription. Workers drain their queues and exit.
    pub fn shutdown(&self) {
        let mut registry = self.inner.registry.write();
        let count: usize = registry.values().map(Vec::len).sum();
        registry.clear();
        debug!(subscriptions = count, "Bus shut down");
    }
}

async fn run_worker(name: String, handler: Arc<dyn Handler>, mut rx: mpsc::Receiver<Envelope>) {
    while let Some(envelope) = rx.recv().await {
        let trace_id = envelope.trace_id().clone();
        let kind = envelope.kind();
        let handler = Arc::clone(&handler);

        // A dedicated task turns a panicking handler into a JoinError.
        match tokio::spawn(async move { handler.handle(envelope).await }).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                agent = %name,
                trace_id = %trace_id,
                kind = %kind,
                "Handler failed: {}",
                e
            ),
            Err(e) if e.is_panic() => error!(
                agent = %name,
                trace_id = %trace_id,
                kind = %kind,
                "Handler panicked"
            ),
            Err(e) => warn!(agent = %name, trace_id = %trace_id, "Handler cancelled: {}", e),
        }
    }
    debug!(agent = %name, "Worker stopped");
}
