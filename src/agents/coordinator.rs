//! Coordinator: entry point for questions and sink for their outcomes.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{forward, COORDINATOR, INGESTION, RETRIEVAL};
use crate::core::{Answer, Bus, CompletionTracker, Handler, Outcome, Subscription};
use crate::error::Result;
use crate::protocol::{Envelope, Message, TraceId};

pub struct Coordinator {
    bus: Bus,
    tracker: Arc<CompletionTracker>,
}

impl Coordinator {
    pub fn new(bus: Bus, tracker: Arc<CompletionTracker>) -> Self {
        Self { bus, tracker }
    }

    /// Subscribe under [`COORDINATOR`].
    pub fn register(self) -> Subscription {
        let bus = self.bus.clone();
        bus.subscribe(COORDINATOR, Arc::new(self))
    }

    fn start_trace(&self, request: &Envelope, query: &str, doc_paths: &[String]) -> Result<()> {
        let trace_id = TraceId::new();
        self.tracker.rebind(request.trace_id(), trace_id.clone());
        info!(
            trace_id = %trace_id,
            request = %request.trace_id(),
            documents = doc_paths.len(),
            "New question: {}",
            query
        );

        for doc_path in doc_paths {
            forward(
                &self.bus,
                Envelope::new(
                    COORDINATOR,
                    INGESTION,
                    trace_id.clone(),
                    Message::ingest_document(doc_path.as_str()),
                ),
            )?;
        }

        forward(
            &self.bus,
            Envelope::new(COORDINATOR, RETRIEVAL, trace_id, Message::search_query(query)),
        )
    }
}

#[async_trait]
impl Handler for Coordinator {
    async fn handle(&self, envelope: Envelope) -> Result<()> {
        match envelope.message() {
            Message::UserQuery { query, doc_paths } => {
                self.start_trace(&envelope, query, doc_paths)?;
            }
            Message::LlmResponse {
                answer,
                source_chunks,
            } => {
                info!(
                    trace_id = %envelope.trace_id(),
                    sources = source_chunks.len(),
                    "Answer: {}",
                    answer
                );
                let outcome = Outcome::Answered(Answer {
                    trace_id: envelope.trace_id().clone(),
                    answer: answer.clone(),
                    source_chunks: source_chunks.clone(),
                });
                if !self.tracker.resolve(envelope.trace_id(), outcome) {
                    debug!(trace_id = %envelope.trace_id(), "Nobody waiting for answer");
                }
            }
            Message::Error { reason, .. } => {
                warn!(
                    trace_id = %envelope.trace_id(),
                    from = envelope.sender(),
                    "Trace failed: {}",
                    reason
                );
                let outcome = Outcome::Failed {
                    trace_id: envelope.trace_id().clone(),
                    reason: reason.clone(),
                };
                self.tracker.resolve(envelope.trace_id(), outcome);
            }
            _ => debug!(
                trace_id = %envelope.trace_id(),
                kind = %envelope.kind(),
                "Coordinator ignoring envelope"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::CALLER;
    use crate::config::BusConfig;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn capture(bus: &Bus, name: &str) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        bus.subscribe(
            name,
            crate::core::handler_fn(move |envelope| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(envelope);
                    Ok(())
                }
            }),
        );
        rx
    }

    #[tokio::test]
    async fn test_user_query_fans_out_under_new_trace() {
        let bus = Bus::new(BusConfig::default());
        let tracker = Arc::new(CompletionTracker::new());
        Coordinator::new(bus.clone(), Arc::clone(&tracker)).register();
        let mut ingestion = capture(&bus, INGESTION);
        let mut retrieval = capture(&bus, RETRIEVAL);

        let request = TraceId::new();
        let _rx = tracker.expect(request.clone());
        bus.send(Envelope::new(
            CALLER,
            COORDINATOR,
            request.clone(),
            Message::user_query("q", vec!["a.txt".to_string(), "b.txt".to_string()]),
        ))
        .unwrap();

        let wait = Duration::from_secs(2);
        let first = timeout(wait, ingestion.recv()).await.unwrap().unwrap();
        let second = timeout(wait, ingestion.recv()).await.unwrap().unwrap();
        let search = timeout(wait, retrieval.recv()).await.unwrap().unwrap();

        assert_eq!(first.message(), &Message::ingest_document("a.txt"));
        assert_eq!(second.message(), &Message::ingest_document("b.txt"));
        assert_eq!(search.message(), &Message::search_query("q"));
        assert_ne!(search.trace_id(), &request);
        assert_eq!(first.trace_id(), search.trace_id());
        assert_eq!(second.trace_id(), search.trace_id());
    }

    #[tokio::test]
    async fn test_terminal_envelopes_resolve_waiters() {
        let bus = Bus::new(BusConfig::default());
        let tracker = Arc::new(CompletionTracker::new());
        Coordinator::new(bus.clone(), Arc::clone(&tracker)).register();

        let trace = TraceId::new();
        let rx = tracker.expect(trace.clone());
        bus.send(Envelope::new(
            "responder",
            COORDINATOR,
            trace.clone(),
            Message::LlmResponse {
                answer: "Paris".to_string(),
                source_chunks: vec!["chunk".to_string()],
            },
        ))
        .unwrap();
        match timeout(Duration::from_secs(2), rx).await.unwrap().unwrap() {
            Outcome::Answered(answer) => assert_eq!(answer.answer, "Paris"),
            other => panic!("unexpected outcome: {:?}", other),
        }

        let failed = TraceId::new();
        let rx = tracker.expect(failed.clone());
        bus.send(Envelope::new(
            "ingestion",
            COORDINATOR,
            failed.clone(),
            Message::error(failed.clone(), "document not found"),
        ))
        .unwrap();
        assert_eq!(
            timeout(Duration::from_secs(2), rx).await.unwrap().unwrap(),
            Outcome::Failed {
                trace_id: failed,
                reason: "document not found".to_string()
            }
        );
    }
}
