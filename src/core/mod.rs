//! Core module - message bus, journal, and completion tracking.
//!
//! This module contains the agent coordination substrate:
//! - In-process publish/subscribe bus with a worker per subscription
//! - Journal of sent envelopes
//! - Per-trace completion signals

pub mod bus;
pub mod completion;
pub mod journal;

pub use bus::{handler_fn, Bus, DeliveryError, Handler, Subscription};
pub use completion::{Answer, CompletionTracker, Outcome};
pub use journal::Journal;
