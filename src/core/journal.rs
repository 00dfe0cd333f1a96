//! Bounded in-memory record of every envelope sent on the bus.

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::protocol::{Envelope, TraceId};

/// Ring buffer of sent envelopes, oldest evicted first.
#[derive(Debug)]
pub struct Journal {
    capacity: usize,
    entries: Mutex<VecDeque<Envelope>>,
}

impl Journal {
    /// Create a journal keeping at most `capacity` envelopes. Zero disables recording.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn record(&self, envelope: &Envelope) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(envelope.clone());
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Every recorded envelope of one trace, in send order.
    pub fn for_trace(&self, trace_id: &TraceId) -> Vec<Envelope> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.trace_id() == trace_id)
            .cloned()
            .collect()
    }

    /// The `n` most recent envelopes, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Envelope> {
        let entries = self.entries.lock();
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Export the journal as a pretty-printed JSON array.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let entries: Vec<Envelope> = self.entries.lock().iter().cloned().collect();
        serde_json::to_string_pretty(&entries)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
