//! Agent communication protocol for docrelay.
//!
//! This module defines the structured protocol for inter-agent communication:
//! - Immutable envelopes with trace ids
//! - A closed set of typed messages, one variant per message kind

pub mod envelope;
pub mod types;

pub use envelope::Envelope;
pub use types::{Message, MessageKind, TraceId};
