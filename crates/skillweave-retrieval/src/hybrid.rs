//! Hybrid retriever owning both indices for one corpus snapshot

use crate::bm25::{Bm25Params, LexicalIndex};
use crate::dense::DenseIndex;
use crate::error::{Result, RetrievalError};
use crate::fusion;
use skillweave_provider::EmbeddingModel;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Search knobs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    /// Hard limit on returned hits
    pub top_k: usize,
    /// Hits with a fused score below this are dropped
    pub min_score: f64,
    /// Dense weight in `[0, 1]`; `0.5` is neutral, `0.0` is purely lexical
    pub alpha: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_score: 0.7,
            alpha: 0.7,
        }
    }
}

impl SearchOptions {
    /// Set `top_k`
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set `min_score`
    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    /// Set `alpha`, clamped to `[0, 1]`
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha.clamp(0.0, 1.0);
        self
    }
}

/// One ranked result
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalHit {
    /// Document text
    pub document: String,
    /// Position of the document in the corpus
    pub index: usize,
    /// Fused score in `[0, 1]`
    pub score: f64,
}

/// Both indices over one immutable corpus
struct IndexSnapshot {
    corpus: Vec<String>,
    lexical: LexicalIndex,
    dense: DenseIndex,
}

/// Dense + BM25 retriever with z-score fusion.
///
/// The corpus can be given up front ([`HybridRetriever::index`]) or with the
/// first search. Supplying a different corpus rebuilds both indices under the
/// snapshot lock; searches arriving meanwhile wait and then see the new corpus.
pub struct HybridRetriever {
    embedder: Arc<dyn EmbeddingModel>,
    params: Bm25Params,
    snapshot: Mutex<Option<Arc<IndexSnapshot>>>,
}

impl HybridRetriever {
    /// Create a retriever with no corpus yet
    pub fn new(embedder: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            embedder,
            params: Bm25Params::default(),
            snapshot: Mutex::new(None),
        }
    }

    /// Override BM25 parameters (applies to the next index build)
    pub fn with_bm25(mut self, params: Bm25Params) -> Self {
        self.params = params;
        self
    }

    /// Index `corpus` now, replacing any previous snapshot
    pub async fn index(&self, corpus: Vec<String>) -> Result<()> {
        let mut guard = self.snapshot.lock().await;
        *guard = Some(Arc::new(self.build_snapshot(corpus).await?));
        Ok(())
    }

    /// Whether a corpus has been indexed
    pub async fn is_indexed(&self) -> bool {
        self.snapshot.lock().await.is_some()
    }

    /// Number of documents in the current snapshot
    pub async fn corpus_len(&self) -> usize {
        self.snapshot
            .lock()
            .await
            .as_ref()
            .map_or(0, |s| s.corpus.len())
    }

    async fn build_snapshot(&self, corpus: Vec<String>) -> Result<IndexSnapshot> {
        if corpus.is_empty() {
            return Err(RetrievalError::NoCorpus);
        }

        let vectors = self.embedder.embed(&corpus).await?;
        if vectors.len() != corpus.len() {
            return Err(RetrievalError::VectorCount {
                expected: corpus.len(),
                actual: vectors.len(),
            });
        }
        let dense = DenseIndex::build(vectors)?;

        let tokenized: Vec<Vec<String>> =
            corpus.iter().map(|doc| self.embedder.segment(doc)).collect();
        let lexical = LexicalIndex::build(&tokenized, self.params);

        info!(
            "Indexed {} documents (dim={})",
            corpus.len(),
            dense.dimensions()
        );
        Ok(IndexSnapshot {
            corpus,
            lexical,
            dense,
        })
    }

    /// Current snapshot, rebuilding first if `corpus` differs from it
    async fn snapshot_for(&self, corpus: Option<&[String]>) -> Result<Arc<IndexSnapshot>> {
        let mut guard = self.snapshot.lock().await;

        if let Some(corpus) = corpus {
            let unchanged = guard
                .as_ref()
                .is_some_and(|s| s.corpus.as_slice() == corpus);
            if !unchanged {
                debug!("Corpus changed, rebuilding indices");
                *guard = Some(Arc::new(self.build_snapshot(corpus.to_vec()).await?));
            }
        }

        guard.as_ref().map(Arc::clone).ok_or(RetrievalError::NoCorpus)
    }

    async fn dense_scores(&self, snapshot: &IndexSnapshot, query: &str) -> Result<Vec<f64>> {
        let query_vec = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or(RetrievalError::VectorCount {
                expected: 1,
                actual: 0,
            })?;
        snapshot.dense.score(&query_vec)
    }

    /// Hybrid search, dense then sparse
    pub async fn search(
        &self,
        query: &str,
        corpus: Option<&[String]>,
        options: &SearchOptions,
    ) -> Result<Vec<RetrievalHit>> {
        let snapshot = self.snapshot_for(corpus).await?;

        let dense = self.dense_scores(&snapshot, query).await?;
        let sparse = snapshot.lexical.score(&self.embedder.segment(query));

        Ok(rank(&snapshot.corpus, &dense, &sparse, options))
    }

    /// Hybrid search with dense and sparse scoring run concurrently
    pub async fn search_concurrent(
        &self,
        query: &str,
        corpus: Option<&[String]>,
        options: &SearchOptions,
    ) -> Result<Vec<RetrievalHit>> {
        let snapshot = self.snapshot_for(corpus).await?;

        let sparse_task = {
            let snapshot = Arc::clone(&snapshot);
            let embedder = Arc::clone(&self.embedder);
            let query = query.to_string();
            tokio::task::spawn_blocking(move || snapshot.lexical.score(&embedder.segment(&query)))
        };

        let (dense, sparse) = tokio::join!(self.dense_scores(&snapshot, query), sparse_task);

        Ok(rank(&snapshot.corpus, &dense?, &sparse?, options))
    }
}

/// Fuse, sort (stable, descending), filter by `min_score`, truncate to `top_k`
fn rank(
    corpus: &[String],
    dense: &[f64],
    sparse: &[f64],
    options: &SearchOptions,
) -> Vec<RetrievalHit> {
    let fused = fusion::fuse(dense, sparse, options.alpha);
    if fused.iter().sum::<f64>() == 0.0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..fused.len()).collect();
    order.sort_by(|&a, &b| fused[b].total_cmp(&fused[a]));

    order
        .into_iter()
        .filter(|&i| fused[i] >= options.min_score)
        .take(options.top_k)
        .map(|i| RetrievalHit {
            document: corpus[i].clone(),
            index: i,
            score: fused[i],
        })
        .collect()
}
