//! Agents of the question-answering pipeline.
//!
//! Each agent is a bus [`Handler`](crate::core::Handler) subscribed under a
//! fixed name. Failures never propagate across agents: they are turned into
//! an `ERROR` envelope addressed to the coordinator, which ends the trace.

pub mod contract;
pub mod coordinator;
pub mod ingestion;
pub mod pipeline;
pub mod responder;
pub mod retrieval;

pub use contract::{execute_with_contract, ExecutionContract, ExecutionError, FailureCode};
pub use coordinator::Coordinator;
pub use ingestion::IngestionAgent;
pub use pipeline::Pipeline;
pub use responder::ResponderAgent;
pub use retrieval::RetrievalAgent;

use tracing::{error, warn};

use crate::core::Bus;
use crate::error::Result;
use crate::protocol::{Envelope, Message, TraceId};

pub const COORDINATOR: &str = "coordinator";
pub const INGESTION: &str = "ingestion";
pub const RETRIEVAL: &str = "retrieval";
pub const RESPONDER: &str = "responder";
/// Sender name used for requests entering the pipeline from outside.
pub const CALLER: &str = "caller";

/// Tell the coordinator that `trace_id` failed.
pub(crate) fn report_failure(bus: &Bus, from: &str, trace_id: &TraceId, reason: impl Into<String>) {
    let reason = reason.into();
    warn!(agent = from, trace_id = %trace_id, "{}", reason);

    let envelope = Envelope::new(
        from,
        COORDINATOR,
        trace_id.clone(),
        Message::error(trace_id.clone(), reason),
    );
    if let Err(e) = bus.send(envelope) {
        error!(agent = from, trace_id = %trace_id, "Could not report failure: {}", e);
    }
}

/// Send the next hop of a trace. A delivery failure is reported to the
/// coordinator and returned.
pub(crate) fn forward(bus: &Bus, envelope: Envelope) -> Result<()> {
    let trace_id = envelope.trace_id().clone();
    let sender = envelope.sender().to_string();
    let receiver = envelope.receiver().to_string();

    bus.send(envelope).map(|_| ()).map_err(|e| {
        report_failure(
            bus,
            &sender,
            &trace_id,
            format!("could not deliver to {}: {}", receiver, e),
        );
        e.into()
    })
}
