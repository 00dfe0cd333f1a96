//! Responder agent: grounds the question in retrieved context and generates an answer.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::contract::{execute_with_contract, ExecutionContract};
use super::{forward, report_failure, COORDINATOR, RESPONDER};
use crate::core::{Bus, Handler, Subscription};
use crate::error::Result;
use crate::protocol::{Envelope, Message};
use crate::providers::provider::{CONTEXT_HEADER, CONTEXT_SEPARATOR, QUESTION_MARKER};
use crate::providers::Provider;

pub struct ResponderAgent {
    bus: Bus,
    generator: Arc<dyn Provider>,
    contract: ExecutionContract,
}

impl ResponderAgent {
    pub fn new(bus: Bus, generator: Arc<dyn Provider>, contract: ExecutionContract) -> Self {
        Self {
            bus,
            generator,
            contract,
        }
    }

    pub fn register(self) -> Subscription {
        let bus = self.bus.clone();
        bus.subscribe(RESPONDER, Arc::new(self))
    }
}

/// Prompt asking the generator to answer `query` from `context` only.
pub fn build_prompt(context: &[String], query: &str) -> String {
    format!(
        "{}{}{}{}\nAnswer:",
        CONTEXT_HEADER,
        context.join(CONTEXT_SEPARATOR),
        QUESTION_MARKER,
        query
    )
}

#[async_trait]
impl Handler for ResponderAgent {
    async fn handle(&self, envelope: Envelope) -> Result<()> {
        let Message::RetrievalResult {
            retrieved_context,
            query,
        } = envelope.message()
        else {
            debug!(kind = %envelope.kind(), "Responder ignoring envelope");
            return Ok(());
        };

        let prompt = build_prompt(retrieved_context, query);
        debug!(
            trace_id = %envelope.trace_id(),
            provider = self.generator.name(),
            context = retrieved_context.len(),
            "Generating answer"
        );

        let answer =
            match execute_with_contract(Arc::clone(&self.generator), &prompt, &self.contract).await {
                Ok(text) => text.trim().to_string(),
                Err(e) => {
                    report_failure(
                        &self.bus,
                        RESPONDER,
                        envelope.trace_id(),
                        format!("generation failed: {}", e),
                    );
                    return Ok(());
                }
            };

        info!(trace_id = %envelope.trace_id(), "Answer generated");
        forward(
            &self.bus,
            envelope.reply(
                RESPONDER,
                COORDINATOR,
                Message::LlmResponse {
                    answer,
                    source_chunks: retrieved_context.clone(),
                },
            ),
        )
    }
}
