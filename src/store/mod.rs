//! Vector store: dense embeddings with parallel fragment records.
//!
//! Search is exact inner product over unit vectors (cosine similarity).
//! Writers are serialized; readers see the last committed state. A search
//! racing an `add` may or may not observe it.

pub mod snapshot;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::providers::{Embedder, EmbeddingError};
pub use snapshot::Snapshot;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    Dimension { expected: usize, got: usize },

    #[error("failed to persist snapshot: {0}")]
    Persistence(String),

    #[error("failed to load snapshot: {0}")]
    Load(String),

    #[error("snapshot is corrupt: {0}")]
    Corrupt(String),
}

/// One chunk of document text and the document it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub text: String,
    pub source: String,
}

/// A search hit with its inner-product similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredFragment {
    pub fragment: Fragment,
    pub score: f32,
}

/// Vector `i` (a `dimension`-wide slice of `vectors`) belongs to `fragments[i]`.
struct IndexState {
    vectors: Vec<f32>,
    fragments: Vec<Fragment>,
}

pub struct VectorStore {
    embedder: Arc<dyn Embedder>,
    dimension: usize,
    snapshot: Option<Snapshot>,
    persist_retries: u32,
    state: RwLock<IndexState>,
    writer: Mutex<()>,
    commits: watch::Sender<u64>,
}

impl VectorStore {
    /// Open the store, loading the snapshot in `config.dir` when present.
    /// Without a directory the store lives in memory only.
    pub fn open(config: &StoreConfig, embedder: Arc<dyn Embedder>) -> Result<Self, StoreError> {
        let dimension = config.dimension;
        if embedder.dimension() != dimension {
            return Err(StoreError::Dimension {
                expected: dimension,
                got: embedder.dimension(),
            });
        }

        let snapshot = config.dir.as_ref().map(Snapshot::new);
        let mut state = IndexState {
            vectors: Vec::new(),
            fragments: Vec::new(),
        };

        if let Some(loaded) = snapshot.as_ref().map(Snapshot::load).transpose()?.flatten() {
            if loaded.dimension != dimension {
                return Err(StoreError::Dimension {
                    expected: dimension,
                    got: loaded.dimension,
                });
            }
            state.vectors = loaded.vectors;
            state.fragments = loaded.fragments;
        }

        match &snapshot {
            Some(s) => info!(
                "Vector store opened at {} with {} fragments",
                s.dir().display(),
                state.fragments.len()
            ),
            None => info!("In-memory vector store opened"),
        }

        let (commits, _) = watch::channel(0);
        Ok(Self {
            embedder,
            dimension,
            snapshot,
            persist_retries: config.persist_retries,
            state: RwLock::new(state),
            writer: Mutex::new(()),
            commits,
        })
    }

    /// Embed `chunks` and append them under `source`, then persist.
    ///
    /// Nothing is appended if embedding or dimension validation fails. If
    /// persisting fails after retries the new fragments stay searchable and
    /// the next successful write brings the snapshot up to date.
    pub async fn add(&self, chunks: &[String], source: &str) -> Result<(), StoreError> {
        let vectors = if chunks.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed(chunks).await?
        };
        if vectors.len() != chunks.len() {
            return Err(EmbeddingError::Count {
                expected: chunks.len(),
                got: vectors.len(),
            }
            .into());
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(StoreError::Dimension {
                expected: self.dimension,
                got: bad.len(),
            });
        }

        let _writer = self.writer.lock().await;

        if !chunks.is_empty() {
            self.append(chunks, source, &vectors);
            self.persist().await?;
        }

        self.commits.send_modify(|generation| *generation += 1);
        Ok(())
    }

    fn append(&self, chunks: &[String], source: &str, vectors: &[Vec<f32>]) {
        let mut state = self.state.write();
        for vector in vectors {
            state.vectors.extend_from_slice(vector);
        }
        state.fragments.extend(chunks.iter().map(|text| Fragment {
            text: text.clone(),
            source: source.to_string(),
        }));
        debug!(
            "Appended {} fragments from {} ({} total)",
            chunks.len(),
            source,
            state.fragments.len()
        );
    }

    /// Return up to `k` fragments most similar to `query`, best first.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredFragment>, StoreError> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_one(query).await?;
        if query_vector.len() != self.dimension {
            return Err(StoreError::Dimension {
                expected: self.dimension,
                got: query_vector.len(),
            });
        }

        let state = self.state.read();
        let mut scored: Vec<(usize, f32)> = state
            .vectors
            .chunks_exact(self.dimension)
            .map(|v| dot(v, &query_vector))
            .enumerate()
            .collect();

        scored.sort_by(|a, b| rank(b.1).total_cmp(&rank(a.1)).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredFragment {
                fragment: state.fragments[i].clone(),
                score,
            })
            .collect())
    }

    /// Number of stored fragments.
    pub fn len(&self) -> usize {
        self.state.read().fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of vectors held by the index.
    pub fn vector_count(&self) -> usize {
        self.state.read().vectors.len() / self.dimension
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Distinct sources in insertion order.
    pub fn sources(&self) -> Vec<String> {
        let state = self.state.read();
        let mut sources: Vec<String> = Vec::new();
        for fragment in &state.fragments {
            if !sources.contains(&fragment.source) {
                sources.push(fragment.source.clone());
            }
        }
        sources
    }

    /// Generation counter bumped after every successful `add`.
    pub fn commits(&self) -> watch::Receiver<u64> {
        self.commits.subscribe()
    }

    /// Write the current state, retrying with linear backoff. Caller holds the writer lock.
    async fn persist(&self) -> Result<(), StoreError> {
        let Some(snapshot) = &self.snapshot else {
            return Ok(());
        };

        let data = {
            let state = self.state.read();
            Arc::new((state.vectors.clone(), state.fragments.clone()))
        };

        let mut attempt = 0;
        loop {
            let snapshot = snapshot.clone();
            let data = Arc::clone(&data);
            let dimension = self.dimension;
            let result = tokio::task::spawn_blocking(move || {
                snapshot.write(dimension, &data.0, &data.1)
            })
            .await
            .unwrap_or_else(|e| Err(StoreError::Persistence(e.to_string())));

            match result {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.persist_retries => {
                    attempt += 1;
                    warn!("Snapshot write failed (attempt {}): {}", attempt, e);
                    tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                }
                Err(e) => {
                    warn!("Snapshot write failed, index is ahead of disk: {}", e);
                    return Err(e);
                }
            }
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// NaN similarities sort below every real score.
fn rank(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::HashEmbedder;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const DIM: usize = 256;

    fn config(dir: Option<PathBuf>) -> StoreConfig {
        StoreConfig {
            dir,
            dimension: DIM,
            persist_retries: 0,
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn open(dir: Option<PathBuf>) -> VectorStore {
        VectorStore::open(&config(dir), Arc::new(HashEmbedder::new(DIM))).unwrap()
    }

    /// Embedder returning vectors of a configurable width, or failing.
    struct FixedEmbedder {
        reported: usize,
        actual: usize,
        fail: bool,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn dimension(&self) -> usize {
            self.reported
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if self.fail {
                return Err(EmbeddingError::Backend("model offline".to_string()));
            }
            Ok(texts.iter().map(|_| vec![1.0; self.actual]).collect())
        }
    }

    #[tokio::test]
    async fn test_add_then_search_round_trip() {
        let store = open(None);
        store.add(&strings(&["a", "b"]), "doc1").await.unwrap();

        let hits = store.search("a", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fragment.text, "a");
        assert_eq!(hits[0].fragment.source, "doc1");

        let all = store.search("a", 2).await.unwrap();
        assert!(all[0].score >= all[1].score);
    }

    #[tokio::test]
    async fn test_search_empty_store() {
        let store = open(None);
        assert!(store.search("anything", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_k_saturation_returns_all_sorted() {
        let store = open(None);
        store
            .add(
                &strings(&[
                    "Paris is the capital of France.",
                    "Bananas are yellow.",
                    "France borders Spain.",
                ]),
                "mixed.txt",
            )
            .await
            .unwrap();

        let hits = store.search("capital of France", 10).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(hits[0].fragment.text, "Paris is the capital of France.");
        assert!(store.search("x", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_parity_survives_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vector_db");
        {
            let store = open(Some(path.clone()));
            store.add(&strings(&["one", "two"]), "a.txt").await.unwrap();
            store.add(&strings(&["three"]), "b.txt").await.unwrap();
            assert_eq!(store.len(), store.vector_count());
        }

        let reopened = open(Some(path));
        assert_eq!(reopened.len(), 3);
        assert_eq!(reopened.vector_count(), 3);
        assert_eq!(reopened.sources(), vec!["a.txt", "b.txt"]);

        let hits = reopened.search("three", 1).await.unwrap();
        assert_eq!(hits[0].fragment.source, "b.txt");
    }

    #[tokio::test]
    async fn test_parity_after_torn_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();
        {
            let store = open(Some(path.clone()));
            store.add(&strings(&["one", "two"]), "a.txt").await.unwrap();
        }

        let snapshot = Snapshot::new(&path);
        let mut fragments: Vec<Fragment> =
            serde_json::from_str(&std::fs::read_to_string(snapshot.fragments_path()).unwrap())
                .unwrap();
        fragments.push(Fragment {
            text: "three".to_string(),
            source: "b.txt".to_string(),
        });
        std::fs::write(
            snapshot.fragments_path(),
            serde_json::to_string(&fragments).unwrap(),
        )
        .unwrap();

        let reopened = open(Some(path));
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.vector_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_adds_keep_parity() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(open(Some(dir.path().to_path_buf())));

        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                let chunks = vec![format!("chunk {} a", i), format!("chunk {} b", i)];
                store.add(&chunks, &format!("doc{}", i)).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.len(), 16);
        assert_eq!(store.vector_count(), 16);
        assert_eq!(*store.commits().borrow(), 8);

        let reopened = open(Some(dir.path().to_path_buf()));
        assert_eq!(reopened.len(), 16);
        assert_eq!(reopened.vector_count(), 16);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected_without_append() {
        let embedder = Arc::new(FixedEmbedder {
            reported: 4,
            actual: 3,
            fail: false,
        });
        let store = VectorStore::open(
            &StoreConfig {
                dir: None,
                dimension: 4,
                persist_retries: 0,
            },
            embedder,
        )
        .unwrap();

        let result = store.add(&strings(&["a"]), "doc").await;
        assert!(matches!(
            result,
            Err(StoreError::Dimension {
                expected: 4,
                got: 3
            })
        ));
        assert_eq!(store.len(), 0);
        assert_eq!(store.vector_count(), 0);
    }

    #[tokio::test]
    async fn test_embedder_dimension_must_match_config() {
        let result = VectorStore::open(&config(None), Arc::new(HashEmbedder::new(8)));
        assert!(matches!(result, Err(StoreError::Dimension { .. })));
    }

    #[tokio::test]
    async fn test_snapshot_dimension_must_match() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(Some(dir.path().to_path_buf()));
            store.add(&strings(&["a"]), "doc").await.unwrap();
        }

        let other = StoreConfig {
            dir: Some(dir.path().to_path_buf()),
            dimension: 32,
            persist_retries: 0,
        };
        let result = VectorStore::open(&other, Arc::new(HashEmbedder::new(32)));
        assert!(matches!(
            result,
            Err(StoreError::Dimension {
                expected: 32,
                got: 256
            })
        ));
    }

    #[tokio::test]
    async fn test_embedding_failure_appends_nothing() {
        let embedder = Arc::new(FixedEmbedder {
            reported: DIM,
            actual: DIM,
            fail: true,
        });
        let store = VectorStore::open(&config(None), embedder).unwrap();

        let result = store.add(&strings(&["a"]), "doc").await;
        assert!(matches!(result, Err(StoreError::Embedding(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_memory_ahead() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "file in the way").unwrap();

        let store = open(Some(blocker));
        let commits = store.commits();
        let result = store.add(&strings(&["kept"]), "doc").await;

        assert!(matches!(result, Err(StoreError::Persistence(_))));
        assert_eq!(store.len(), 1);
        assert_eq!(store.vector_count(), 1);
        assert_eq!(store.search("kept", 1).await.unwrap()[0].fragment.text, "kept");
        assert_eq!(*commits.borrow(), 0);
    }

    #[tokio::test]
    async fn test_empty_add_is_a_commit() {
        let store = open(None);
        store.add(&[], "empty.txt").await.unwrap();
        assert!(store.is_empty());
        assert_eq!(*store.commits().borrow(), 1);
    }

    /// Embeds texts starting with "nan" as NaN vectors.
    struct NanEmbedder;

    #[async_trait]
    impl Embedder for NanEmbedder {
        fn dimension(&self) -> usize {
            DIM
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let value = if t.starts_with("nan") { f32::NAN } else { 0.1 };
                    vec![value; DIM]
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_nan_scores_rank_last() {
        let store = VectorStore::open(&config(None), Arc::new(NanEmbedder)).unwrap();
        store
            .add(&strings(&["nan first", "real", "nan second", "also real"]), "doc")
            .await
            .unwrap();

        let hits = store.search("query", 4).await.unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.fragment.text.as_str()).collect();
        assert_eq!(texts, vec!["real", "also real", "nan first", "nan second"]);
        assert!(hits[3].score.is_nan());
    }
}
