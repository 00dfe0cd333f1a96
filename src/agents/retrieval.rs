//! Retrieval agent: owns writes to and searches over the vector store.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::{forward, report_failure, RESPONDER, RETRIEVAL};
use crate::core::{Bus, Handler, Subscription};
use crate::error::Result;
use crate::protocol::{Envelope, Message};
use crate::store::VectorStore;

pub struct RetrievalAgent {
    bus: Bus,
    store: Arc<VectorStore>,
    top_k: usize,
}

impl RetrievalAgent {
    pub fn new(bus: Bus, store: Arc<VectorStore>, top_k: usize) -> Self {
        Self { bus, store, top_k }
    }

    pub fn register(self) -> Subscription {
        let bus = self.bus.clone();
        bus.subscribe(RETRIEVAL, Arc::new(self))
    }

    async fn index(&self, envelope: &Envelope, chunks: &[String], source: &str) {
        match self.store.add(chunks, source).await {
            Ok(()) => info!(
                trace_id = %envelope.trace_id(),
                chunks = chunks.len(),
                total = self.store.len(),
                "Indexed {}",
                source
            ),
            Err(e) => report_failure(
                &self.bus,
                RETRIEVAL,
                envelope.trace_id(),
                format!("indexing {} failed: {}", source, e),
            ),
        }
    }

    async fn search(&self, envelope: &Envelope, query: &str) -> Result<()> {
        let hits = match self.store.search(query, self.top_k).await {
            Ok(hits) => hits,
            Err(e) => {
                report_failure(
                    &self.bus,
                    RETRIEVAL,
                    envelope.trace_id(),
                    format!("search failed: {}", e),
                );
                return Ok(());
            }
        };

        debug!(trace_id = %envelope.trace_id(), hits = hits.len(), "Search complete");
        let retrieved_context = hits.into_iter().map(|hit| hit.fragment.text).collect();
        forward(
            &self.bus,
            envelope.reply(
                RETRIEVAL,
                RESPONDER,
                Message::RetrievalResult {
                    retrieved_context,
                    query: query.to_string(),
                },
            ),
        )
    }
}

#[async_trait]
impl Handler for RetrievalAgent {
    async fn handle(&self, envelope: Envelope) -> Result<()> {
        match envelope.message() {
            Message::IngestionResult { chunks, source } => {
                self.index(&envelope, chunks, source).await;
                Ok(())
            }
            Message::SearchQuery { query } => self.search(&envelope, query).await,
            _ => {
                debug!(kind = %envelope.kind(), "Retrieval ignoring envelope");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{COORDINATOR, INGESTION};
    use crate::config::{BusConfig, StoreConfig};
    use crate::protocol::TraceId;
    use crate::providers::{Embedder, EmbeddingError, HashEmbedder};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn open_store(dir: Option<PathBuf>, embedder: Arc<dyn Embedder>) -> Arc<VectorStore> {
        let config = StoreConfig {
            dir,
            dimension: 384,
            persist_retries: 0,
        };
        Arc::new(VectorStore::open(&config, embedder).unwrap())
    }

    fn store() -> Arc<VectorStore> {
        open_store(None, Arc::new(HashEmbedder::new(384)))
    }

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

    /// Embeds like `HashEmbedder` until switched offline.
    struct Switchable {
        inner: HashEmbedder,
        offline: AtomicBool,
    }

    #[async_trait]
    impl Embedder for Switchable {
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        async fn embed(
            &self,
            texts: &[String],
        ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(EmbeddingError::Backend("embedding backend offline".to_string()));
            }
            self.inner.embed(texts).await
        }
    }

    async fn expect_error(
        coordinator: &mut mpsc::UnboundedReceiver<Envelope>,
        trace: &TraceId,
    ) -> String {
        let envelope = timeout(Duration::from_secs(2), coordinator.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(envelope.trace_id(), trace);
        assert_eq!(envelope.sender(), RETRIEVAL);
        match envelope.message() {
            Message::Error { trace_id, reason } => {
                assert_eq!(trace_id, trace);
                reason.clone()
            }
            other => panic!("expected an error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_index_then_search_uses_top_k() {
        let bus = Bus::new(BusConfig::default());
        let store = store();
        RetrievalAgent::new(bus.clone(), Arc::clone(&store), 2).register();

        let mut responder = capture(&bus, RESPONDER);

        let mut commits = store.commits();
        let trace = TraceId::new();
        bus.send(Envelope::new(
            INGESTION,
            RETRIEVAL,
            trace.clone(),
            Message::IngestionResult {
                chunks: vec![
                    "Paris is the capital of France.".to_string(),
                    "Bananas are yellow.".to_string(),
                    "Berlin is the capital of Germany.".to_string(),
                ],
                source: "facts.txt".to_string(),
            },
        ))
        .unwrap();
        timeout(Duration::from_secs(2), commits.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(store.len(), 3);

        bus.send(Envelope::new(
            COORDINATOR,
            RETRIEVAL,
            trace.clone(),
            Message::search_query("What is the capital of France?"),
        ))
        .unwrap();

        let result = timeout(Duration::from_secs(2), responder.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.trace_id(), &trace);
        match result.message() {
            Message::RetrievalResult {
                retrieved_context,
                query,
            } => {
                assert_eq!(retrieved_context.len(), 2);
                assert_eq!(retrieved_context[0], "Paris is the capital of France.");
                assert_eq!(query, "What is the capital of France?");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unpersistable_index_reports_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("vector_db");
        std::fs::write(&blocker, "file in the way").unwrap();

        let bus = Bus::new(BusConfig::default());
        let store = open_store(Some(blocker), Arc::new(HashEmbedder::new(384)));
        RetrievalAgent::new(bus.clone(), Arc::clone(&store), 3).register();
        let mut coordinator = capture(&bus, COORDINATOR);

        let trace = TraceId::new();
        bus.send(Envelope::new(
            INGESTION,
            RETRIEVAL,
            trace.clone(),
            Message::IngestionResult {
                chunks: vec!["Paris is the capital of France.".to_string()],
                source: "geo.txt".to_string(),
            },
        ))
        .unwrap();

        let reason = expect_error(&mut coordinator, &trace).await;
        assert!(reason.starts_with("indexing geo.txt failed"), "{}", reason);
        assert_eq!(*store.commits().borrow(), 0);
    }

    #[tokio::test]
    async fn test_failed_search_reports_error() {
        let bus = Bus::new(BusConfig::default());
        let embedder = Arc::new(Switchable {
            inner: HashEmbedder::new(384),
            offline: AtomicBool::new(false),
        });
        let store = open_store(None, embedder.clone());
        store
            .add(&["Paris is the capital of France.".to_string()], "geo.txt")
            .await
            .unwrap();
        embedder.offline.store(true, Ordering::SeqCst);

        RetrievalAgent::new(bus.clone(), store, 3).register();
        let mut coordinator = capture(&bus, COORDINATOR);
        let mut responder = capture(&bus, RESPONDER);

        let trace = TraceId::new();
        bus.send(Envelope::new(
            COORDINATOR,
            RETRIEVAL,
            trace.clone(),
            Message::search_query("What is the capital of France?"),
        ))
        .unwrap();

        let reason = expect_error(&mut coordinator, &trace).await;
        assert!(reason.contains("embedding backend offline"), "{}", reason);
        assert!(responder.try_recv().is_err());
    }
}
