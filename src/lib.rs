//! docrelay library root.
//!
//! Agents communicating over an in-process message bus answer questions
//! from a vector index of ingested documents.

pub mod agents;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod extract;
pub mod logging;
pub mod protocol;
pub mod providers;
pub mod store;

pub use agents::Pipeline;
pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use crate::core::{Answer, Bus, Handler};
pub use error::{Error, Result};
pub use protocol::{Envelope, Message, TraceId};
pub use providers::{Embedder, Provider};
pub use store::VectorStore;
