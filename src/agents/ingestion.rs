//! Ingestion agent: turns a document path into text chunks.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use super::{forward, report_failure, INGESTION, RETRIEVAL};
use crate::core::{Bus, Handler, Subscription};
use crate::error::Result;
use crate::extract::Extractor;
use crate::protocol::{Envelope, Message};

pub struct IngestionAgent {
    bus: Bus,
    extractor: Arc<dyn Extractor>,
}

impl IngestionAgent {
    pub fn new(bus: Bus, extractor: Arc<dyn Extractor>) -> Self {
        Self { bus, extractor }
    }

    pub fn register(self) -> Subscription {
        let bus = self.bus.clone();
        bus.subscribe(INGESTION, Arc::new(self))
    }
}

#[async_trait]
impl Handler for IngestionAgent {
    async fn handle(&self, envelope: Envelope) -> Result<()> {
        let Message::IngestDocument { doc_path } = envelope.message() else {
            debug!(kind = %envelope.kind(), "Ingestion ignoring envelope");
            return Ok(());
        };

        let extractor = Arc::clone(&self.extractor);
        let path = PathBuf::from(doc_path);
        let extracted = tokio::task::spawn_blocking(move || extractor.extract(&path)).await;

        let chunks = match extracted {
            Ok(Ok(chunks)) => chunks,
            Ok(Err(e)) => {
                report_failure(&self.bus, INGESTION, envelope.trace_id(), e.to_string());
                return Ok(());
            }
            Err(e) => {
                report_failure(
                    &self.bus,
                    INGESTION,
                    envelope.trace_id(),
                    format!("extraction of {} aborted: {}", doc_path, e),
                );
                return Ok(());
            }
        };

        info!(
            trace_id = %envelope.trace_id(),
            chunks = chunks.len(),
            "Ingested {}",
            doc_path
        );
        forward(
            &self.bus,
            envelope.reply(
                INGESTION,
                RETRIEVAL,
                Message::IngestionResult {
                    chunks,
                    source: doc_path.clone(),
                },
            ),
        )
    }
}
