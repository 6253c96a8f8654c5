use std::path::Path;
use std::sync::Arc;

use crate::corpus::Corpus;
use crate::error::{EmbeddingError, SearchError};
use crate::llm::embeddings::{embed_one, Embedder};
use crate::models::{PositionRecord, SearchResult};
use crate::search::store::EmbeddingStore;

/// Cosine-similarity search over the corpus, with the store's rows aligned to `records`.
pub struct SemanticSearch {
    records: Vec<PositionRecord>,
    store: EmbeddingStore,
    embedder: Arc<dyn Embedder>,
}

impl SemanticSearch {
    /// Load or build the embedding store for `corpus` and pair it with the records.
    pub async fn initialize(
        corpus: Corpus,
        embeddings_path: &Path,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
    ) -> Result<Self, EmbeddingError> {
        let store = EmbeddingStore::open_or_build(
            embeddings_path,
            &corpus.texts(),
            embedder.as_ref(),
            batch_size,
        )
        .await?;
        Self::new(corpus.records, store, embedder)
    }

    pub fn new(
        records: Vec<PositionRecord>,
        store: EmbeddingStore,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, EmbeddingError> {
        if records.len() != store.len() {
            return Err(EmbeddingError::Malformed(format!(
                "{} embeddings for {} records",
                store.len(),
                records.len()
            )));
        }
        Ok(Self {
            records,
            store,
            embedder,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[PositionRecord] {
        &self.records
    }

    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    /// Embed `query` and return up to `top_k` records with similarity >= `min_similarity`,
    /// highest first. An empty result is not an error.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<SearchResult>, SearchError> {
        if self.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = embed_one(self.embedder.as_ref(), query)
            .await
            .map_err(|e| SearchError::Unavailable(e.to_string()))?;

        if query_embedding.len() != self.store.dim() {
            return Err(SearchError::Unavailable(format!(
                "query embedding has dimension {}, store has {}",
                query_embedding.len(),
                self.store.dim()
            )));
        }

        let results = self.rank(&query_embedding, top_k, min_similarity);
        if results.is_empty() {
            tracing::warn!("No positions found with similarity >= {min_similarity}");
        }
        Ok(results)
    }

    /// Score a precomputed query vector against every row.
    /// Ties keep corpus order (stable sort).
    pub fn rank(&self, query_embedding: &[f32], top_k: usize, min_similarity: f32) -> Vec<SearchResult> {
        let mut scored: Vec<(usize, f32)> = self
            .store
            .rows()
            .iter()
            .map(|row| cosine_similarity(query_embedding, row))
            .enumerate()
            .filter(|(_, score)| *score >= min_similarity)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(i, similarity)| SearchResult {
                record: self.records[i].clone(),
                similarity,
            })
            .collect()
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model(&self) -> &str {
            "fixed"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        fn model(&self) -> &str {
            "down"
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::Generation("503".into()))
        }
    }

    fn record(id: &str) -> PositionRecord {
        PositionRecord {
            id: id.into(),
            text: format!("text of {id}"),
            domain: "Unknown".into(),
            title: String::new(),
            sources: vec!["Unknown".into()],
        }
    }

    fn engine(rows: Vec<Vec<f32>>, embedder: Arc<dyn Embedder>) -> SemanticSearch {
        let records = (0..rows.len()).map(|i| record(&format!("P{i}"))).collect();
        let store = EmbeddingStore::from_rows(rows, embedder.model()).unwrap();
        SemanticSearch::new(records, store, embedder).unwrap()
    }

    #[test]
    fn test_cosine_identical() {
        let s = cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
        assert!((s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_and_degenerate() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_rank_orders_filters_and_truncates() {
        let search = engine(
            vec![
                vec![0.0, 1.0],
                vec![1.0, 0.1],
                vec![1.0, 1.0],
                vec![1.0, 0.0],
                vec![-1.0, 0.0],
            ],
            Arc::new(FixedEmbedder(vec![1.0, 0.0])),
        );
        let results = search.rank(&[1.0, 0.0], 2, 0.25);
        let ids: Vec<&str> = results.iter().map(|r| r.record.id.as_str()).collect();
        assert_eq!(ids, vec!["P3", "P1"]);
        assert!(results.windows(2).all(|w| w[0].similarity >= w[1].similarity));
        assert!(results.iter().all(|r| r.similarity >= 0.25));
    }

    #[test]
    fn test_rank_ties_keep_corpus_order() {
        let search = engine(
            vec![vec![1.0, 0.0], vec![2.0, 0.0], vec![3.0, 0.0]],
            Arc::new(FixedEmbedder(vec![1.0, 0.0])),
        );
        let ids: Vec<String> = search
            .rank(&[1.0, 0.0], 3, 0.0)
            .into_iter()
            .map(|r| r.record.id)
            .collect();
        assert_eq!(ids, vec!["P0", "P1", "P2"]);
    }

    #[tokio::test]
    async fn test_disjoint_query_returns_empty() {
        let search = engine(
            vec![vec![1.0, 0.0], vec![1.0, 0.1]],
            Arc::new(FixedEmbedder(vec![0.0, 1.0])),
        );
        let results = search.search("anything", 5, 0.25).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_is_unavailable() {
        let search = engine(vec![vec![1.0, 0.0]], Arc::new(DownEmbedder));
        let err = search.search("q", 5, 0.25).await.unwrap_err();
        assert!(matches!(err, SearchError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_unavailable() {
        let search = engine(vec![vec![1.0, 0.0]], Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0])));
        let err = search.search("q", 5, 0.0).await.unwrap_err();
        assert!(err.to_string().contains("dimension"));
    }

    #[test]
    fn test_new_rejects_misaligned_store() {
        let store = EmbeddingStore::from_rows(vec![vec![1.0]], "m").unwrap();
        let result = SemanticSearch::new(vec![], store, Arc::new(FixedEmbedder(vec![1.0])));
        assert!(result.is_err());
    }
}
