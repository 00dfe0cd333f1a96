//! Wires the four agents to one bus and exposes request/response calls on top.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

use super::contract::ExecutionContract;
use super::{
    Coordinator, IngestionAgent, ResponderAgent, RetrievalAgent, CALLER, COORDINATOR, INGESTION,
};
use crate::config::Settings;
use crate::core::{Answer, Bus, CompletionTracker, DeliveryError, Journal, Outcome, Subscription};
use crate::error::{Error, Result};
use crate::extract::{DocumentExtractor, Extractor};
use crate::protocol::{Envelope, Message, TraceId};
use crate::providers::{create_embedder, create_provider, Embedder, Provider};
use crate::store::VectorStore;

pub struct Pipeline {
    bus: Bus,
    store: Arc<VectorStore>,
    tracker: Arc<CompletionTracker>,
    subscriptions: Vec<Subscription>,
    answer_timeout: Duration,
    ingest_lock: Mutex<()>,
}

impl Pipeline {
    /// Open the store and subscribe every agent. Must run inside a Tokio runtime.
    pub fn start(
        settings: &Settings,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Provider>,
        extractor: Arc<dyn Extractor>,
    ) -> Result<Self> {
        let store = Arc::new(VectorStore::open(&settings.store, embedder)?);
        let bus = Bus::new(settings.bus.clone());
        let tracker = Arc::new(CompletionTracker::new());

        let subscriptions = vec![
            Coordinator::new(bus.clone(), Arc::clone(&tracker)).register(),
            IngestionAgent::new(bus.clone(), extractor).register(),
            RetrievalAgent::new(bus.clone(), Arc::clone(&store), settings.pipeline.top_k)
                .register(),
            ResponderAgent::new(
                bus.clone(),
                generator,
                ExecutionContract::from(&settings.generation),
            )
            .register(),
        ];

        info!(
            fragments = store.len(),
            top_k = settings.pipeline.top_k,
            "Pipeline started"
        );

        Ok(Self {
            bus,
            store,
            tracker,
            subscriptions,
            answer_timeout: Duration::from_secs(settings.pipeline.answer_timeout_seconds),
            ingest_lock: Mutex::new(()),
        })
    }

    /// Start with collaborators chosen by `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::start(
            settings,
            create_embedder(settings),
            create_provider(settings),
            Arc::new(DocumentExtractor::new(settings.extraction.chunk_size)),
        )
    }

    /// Ask a question, optionally ingesting `doc_paths` alongside it, and
    /// wait for the trace to end.
    ///
    /// Documents sent with the question are ingested concurrently with the
    /// search, which may not see them yet. Use [`Pipeline::ingest`] first
    /// when the answer must draw on them.
    pub async fn ask(
        &self,
        query: &str,
        doc_paths: Vec<String>,
        timeout: Option<Duration>,
    ) -> Result<Answer> {
        let timeout = timeout.unwrap_or(self.answer_timeout);
        let request = TraceId::new();
        let outcome = self.tracker.expect(request.clone());

        self.dispatch(Envelope::new(
            CALLER,
            COORDINATOR,
            request.clone(),
            Message::user_query(query, doc_paths),
        ))?;

        let result = tokio::time::timeout(timeout, outcome).await;
        self.tracker.cancel(&request);
        match result {
            Ok(Ok(Outcome::Answered(answer))) => Ok(answer),
            Ok(Ok(Outcome::Failed { trace_id, reason })) => Err(Error::Failed { trace_id, reason }),
            Ok(Err(_)) => Err(Error::Other("pipeline stopped before answering".to_string())),
            Err(_) => Err(Error::Timeout(timeout.as_secs())),
        }
    }

    /// Ingest one document and wait until its fragments are committed to
    /// the store, or until the trace fails.
    pub async fn ingest(&self, path: impl AsRef<Path>, timeout: Option<Duration>) -> Result<()> {
        let timeout = timeout.unwrap_or(self.answer_timeout);
        let _serial = self.ingest_lock.lock().await;

        let mut commits = self.store.commits();
        let before = *commits.borrow_and_update();
        let trace_id = TraceId::new();
        let outcome = self.tracker.expect(trace_id.clone());

        let doc_path = path.as_ref().to_string_lossy().to_string();
        self.dispatch(Envelope::new(
            CALLER,
            INGESTION,
            trace_id.clone(),
            Message::ingest_document(doc_path),
        ))?;

        let wait = async {
            tokio::select! {
                committed = commits.wait_for(|generation| *generation > before) => committed
                    .map(|_| ())
                    .map_err(|_| Error::Other("vector store closed".to_string())),
                outcome = outcome => match outcome {
                    Ok(Outcome::Failed { trace_id, reason }) => Err(Error::Failed { trace_id, reason }),
                    Ok(Outcome::Answered(_)) => Ok(()),
                    Err(_) => Err(Error::Other("pipeline stopped before ingesting".to_string())),
                },
            }
        };

        let result = tokio::time::timeout(timeout, wait).await;
        self.tracker.cancel(&trace_id);
        result.unwrap_or(Err(Error::Timeout(timeout.as_secs())))
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn journal(&self) -> &Journal {
        self.bus.journal()
    }

    pub fn tracker(&self) -> &Arc<CompletionTracker> {
        &self.tracker
    }

    /// Unsubscribe every agent. Requests in flight are abandoned.
    pub fn shutdown(&self) {
        let removed = self
            .subscriptions
            .iter()
            .filter(|subscription| self.bus.unsubscribe(subscription))
            .count();
        self.bus.shutdown();
        if removed > 0 {
            info!("Pipeline stopped");
        }
    }

    /// Send a request into the pipeline. Nobody receiving it is an error
    /// here regardless of the bus policy, since the caller would wait forever.
    fn dispatch(&self, envelope: Envelope) -> Result<()> {
        let trace_id = envelope.trace_id().clone();
        let receiver = envelope.receiver().to_string();
        match self.bus.send(envelope) {
            Ok(0) => {
                self.tracker.cancel(&trace_id);
                Err(DeliveryError::NoSubscriber(receiver).into())
            }
            Ok(_) => Ok(()),
            Err(e) => {
                self.tracker.cancel(&trace_id);
                Err(e.into())
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
