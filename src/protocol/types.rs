//! Message kinds and payloads exchanged between agents.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Correlation token shared by every envelope produced for one logical request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    /// Mint a fresh trace id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TraceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TraceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Wire-level message kind. `Query` covers both document ingestion and
/// question search requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    UserQuery,
    Query,
    IngestionResult,
    RetrievalResult,
    LlmResponse,
    Error,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageKind::UserQuery => "USER_QUERY",
            MessageKind::Query => "QUERY",
            MessageKind::IngestionResult => "INGESTION_RESULT",
            MessageKind::RetrievalResult => "RETRIEVAL_RESULT",
            MessageKind::LlmResponse => "LLM_RESPONSE",
            MessageKind::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Typed message body. Each variant carries only the fields valid for it.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A question from the caller, optionally with documents to ingest first.
    UserQuery {
        query: String,
        doc_paths: Vec<String>,
    },
    /// Ask the ingestion agent to extract and chunk one document.
    IngestDocument { doc_path: String },
    /// Ask the retrieval agent for context relevant to a question.
    SearchQuery { query: String },
    /// Chunks extracted from one document.
    IngestionResult { chunks: Vec<String>, source: String },
    /// Context retrieved for a question.
    RetrievalResult {
        retrieved_context: Vec<String>,
        query: String,
    },
    /// Final generated answer with the fragments it was grounded on.
    LlmResponse {
        answer: String,
        source_chunks: Vec<String>,
    },
    /// Terminal failure for a trace.
    Error { trace_id: TraceId, reason: String },
}

impl Message {
    pub fn user_query(query: impl Into<String>, doc_paths: Vec<String>) -> Self {
        Message::UserQuery {
            query: query.into(),
            doc_paths,
        }
    }

    pub fn ingest_document(doc_path: impl Into<String>) -> Self {
        Message::IngestDocument {
            doc_path: doc_path.into(),
        }
    }

    pub fn search_query(query: impl Into<String>) -> Self {
        Message::SearchQuery {
            query: query.into(),
        }
    }

    pub fn error(trace_id: TraceId, reason: impl Into<String>) -> Self {
        Message::Error {
            trace_id,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::UserQuery { .. } => MessageKind::UserQuery,
            Message::IngestDocument { .. } | Message::SearchQuery { .. } => MessageKind::Query,
            Message::IngestionResult { .. } => MessageKind::IngestionResult,
            Message::RetrievalResult { .. } => MessageKind::RetrievalResult,
            Message::LlmResponse { .. } => MessageKind::LlmResponse,
            Message::Error { .. } => MessageKind::Error,
        }
    }

    /// Render the JSON payload object for the wire.
    pub fn to_payload(&self) -> Value {
        match self {
            Message::UserQuery { query, doc_paths } if doc_paths.is_empty() => {
                json!({ "query": query })
            }
            Message::UserQuery { query, doc_paths } => {
                json!({ "query": query, "doc_paths": doc_paths })
            }
            Message::IngestDocument { doc_path } => json!({ "doc_path": doc_path }),
            Message::SearchQuery { query } => json!({ "query": query }),
            Message::IngestionResult { chunks, source } => {
                json!({ "chunks": chunks, "source": source })
            }
            Message::RetrievalResult {
                retrieved_context,
                query,
            } => json!({ "retrieved_context": retrieved_context, "query": query }),
            Message::LlmResponse {
                answer,
                source_chunks,
            } => json!({ "answer": answer, "source_chunks": source_chunks }),
            Message::Error { trace_id, reason } => {
                json!({ "trace_id": trace_id, "reason": reason })
            }
        }
    }

    /// Rebuild a typed message from a wire kind and payload.
    ///
    /// `QUERY` is resolved by payload shape: exactly one of `doc_path` or
    /// `query` must be present.
    pub fn from_wire(kind: MessageKind, payload: Value) -> Result<Self, serde_json::Error> {
        let message = match kind {
            MessageKind::UserQuery => {
                let p: UserQueryPayload = serde_json::from_value(payload)?;
                Message::UserQuery {
                    query: p.query,
                    doc_paths: p.doc_paths.unwrap_or_default(),
                }
            }
            MessageKind::Query => match serde_json::from_value(payload)? {
                QueryPayload::Ingest(p) => Message::IngestDocument { doc_path: p.doc_path },
                QueryPayload::Search(p) => Message::SearchQuery { query: p.query },
            },
            MessageKind::IngestionResult => {
                let p: IngestionResultPayload = serde_json::from_value(payload)?;
                Message::IngestionResult {
                    chunks: p.chunks,
                    source: p.source,
                }
            }
            MessageKind::RetrievalResult => {
                let p: RetrievalResultPayload = serde_json::from_value(payload)?;
                Message::RetrievalResult {
                    retrieved_context: p.retrieved_context,
                    query: p.query,
                }
            }
            MessageKind::LlmResponse => {
                let p: LlmResponsePayload = serde_json::from_value(payload)?;
                Message::LlmResponse {
                    answer: p.answer,
                    source_chunks: p.source_chunks,
                }
            }
            MessageKind::Error => {
                let p: ErrorPayload = serde_json::from_value(payload)?;
                Message::Error {
                    trace_id: p.trace_id,
                    reason: p.reason,
                }
            }
        };
        Ok(message)
    }
}

#[derive(Deserialize)]
struct UserQueryPayload {
    query: String,
    doc_paths: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryPayload {
    Ingest(IngestPayload),
    Search(SearchPayload),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct IngestPayload {
    doc_path: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchPayload {
    query: String,
}

#[derive(Deserialize)]
struct IngestionResultPayload {
    chunks: Vec<String>,
    source: String,
}

#[derive(Deserialize)]
struct RetrievalResultPayload {
    retrieved_context: Vec<String>,
    query: String,
}

#[derive(Deserialize)]
struct LlmResponsePayload {
    answer: String,
    source_chunks: Vec<String>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    trace_id: TraceId,
    reason: String,
}
