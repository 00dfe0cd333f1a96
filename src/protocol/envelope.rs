//! Message envelopes with trace ids for correlating agent communication.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{Message, MessageKind, TraceId};

/// Routed, trace-correlated envelope around a [`Message`].
///
/// Fields are private so an envelope cannot change once built; every hop
/// constructs a new one (see [`Envelope::reply`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireEnvelope", into = "WireEnvelope")]
pub struct Envelope {
    id: String,
    sender: String,
    receiver: String,
    trace_id: TraceId,
    created_at: i64,
    message: Message,
}

impl Envelope {
    /// Create a new envelope from one agent to another.
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        trace_id: TraceId,
        message: Message,
    ) -> Self {
        Self {
            id: generate_id(),
            sender: sender.into(),
            receiver: receiver.into(),
            trace_id,
            created_at: current_timestamp(),
            message,
        }
    }

    /// Create the next hop for this envelope's trace.
    pub fn reply(
        &self,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        message: Message,
    ) -> Self {
        Self::new(sender, receiver, self.trace_id.clone(), message)
    }

    /// Unique envelope id (ULID).
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Routing key.
    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    /// Creation timestamp (unix ms).
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }
}

/// JSON shape of an envelope: `{id, sender, receiver, type, trace_id, created_at, payload}`.
#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(default = "generate_id")]
    id: String,
    sender: String,
    receiver: String,
    #[serde(rename = "type")]
    kind: MessageKind,
    trace_id: TraceId,
    #[serde(default = "current_timestamp")]
    created_at: i64,
    payload: Value,
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = String;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        let message = Message::from_wire(wire.kind, wire.payload)
            .map_err(|e| format!("invalid {} payload: {}", wire.kind, e))?;
        Ok(Self {
            id: wire.id,
            sender: wire.sender,
            receiver: wire.receiver,
            trace_id: wire.trace_id,
            created_at: wire.created_at,
            message,
        })
    }
}

impl From<Envelope> for WireEnvelope {
    fn from(envelope: Envelope) -> Self {
        Self {
            kind: envelope.message.kind(),
            payload: envelope.message.to_payload(),
            id: envelope.id,
            sender: envelope.sender,
            receiver: envelope.receiver,
            trace_id: envelope.trace_id,
            created_at: envelope.created_at,
        }
    }
}

fn generate_id() -> String {
    ulid::Ulid::new().to_string()
}

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
