//! Per-trace completion signals.
//!
//! A caller registers interest in a trace before sending its request and gets
//! a oneshot receiver. The coordinator resolves it when the terminal envelope
//! for that trace arrives.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;

use crate::protocol::TraceId;

/// Successful end of a question trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub trace_id: TraceId,
    pub answer: String,
    pub source_chunks: Vec<String>,
}

/// Terminal outcome of a trace.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Answered(Answer),
    Failed { trace_id: TraceId, reason: String },
}

struct Waiter {
    /// Trace the caller originally registered, kept across rebinds.
    origin: TraceId,
    tx: oneshot::Sender<Outcome>,
}

#[derive(Default)]
pub struct CompletionTracker {
    waiters: Mutex<HashMap<TraceId, Waiter>>,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `trace_id`. A previous waiter on the same trace is replaced.
    pub fn expect(&self, trace_id: TraceId) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(
            trace_id.clone(),
            Waiter {
                origin: trace_id,
                tx,
            },
        );
        rx
    }

    /// Move the waiter registered under `from` to `to`. Used when the
    /// coordinator mints a new trace for a caller's request.
    pub fn rebind(&self, from: &TraceId, to: TraceId) -> bool {
        let mut waiters = self.waiters.lock();
        match waiters.remove(from) {
            Some(waiter) => {
                waiters.insert(to, waiter);
                true
            }
            None => false,
        }
    }

    /// Deliver the outcome for `trace_id`. Returns false if nobody was waiting.
    pub fn resolve(&self, trace_id: &TraceId, outcome: Outcome) -> bool {
        let waiter = self.waiters.lock().remove(trace_id);
        match waiter {
            Some(waiter) => waiter.tx.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Drop the waiter originally registered as `origin`, wherever it was rebound.
    pub fn cancel(&self, origin: &TraceId) {
        self.waiters.lock().retain(|_, waiter| &waiter.origin != origin);
    }

    pub fn pending(&self) -> usize {
        self.waiters.lock().len()
    }
}
