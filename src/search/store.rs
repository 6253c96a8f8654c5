//! Embedding store: one vector per corpus record, row `i` belonging to record `i`.
//!
//! Persisted as JSON next to a `.model` sidecar naming the embedding model.
//! Three legacy layouts are readable (raw rows, `[ids, rows]`, and
//! `{"embeddings": rows, ...}`); only raw rows are ever written.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use uuid::Uuid;

use crate::error::EmbeddingError;
use crate::llm::embeddings::{embed_one, Embedder};

#[derive(Deserialize)]
#[serde(untagged)]
enum PersistedStore {
    WithIds((Vec<String>, Vec<Vec<f32>>)),
    Keyed { embeddings: Vec<Vec<f32>> },
    Raw(Vec<Vec<f32>>),
}

impl PersistedStore {
    fn into_rows(self) -> Vec<Vec<f32>> {
        match self {
            PersistedStore::WithIds((_, rows)) => rows,
            PersistedStore::Keyed { embeddings } => embeddings,
            PersistedStore::Raw(rows) => rows,
        }
    }
}

/// Immutable matrix of embeddings, validated to be rectangular.
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    rows: Vec<Vec<f32>>,
    dim: usize,
    model: String,
}

impl EmbeddingStore {
    /// Load the persisted store if it matches `texts` and the embedder's model,
    /// otherwise regenerate all rows and persist them.
    pub async fn open_or_build(
        path: &Path,
        texts: &[String],
        embedder: &dyn Embedder,
        batch_size: usize,
    ) -> Result<Self, EmbeddingError> {
        if path.exists() {
            match Self::load(path) {
                Ok(store) => match store.mismatch(texts.len(), embedder.model()) {
                    None if store.model.is_empty() => {
                        if let Some(store) = store.adopt(path, texts, embedder).await? {
                            return Ok(store);
                        }
                    }
                    None => {
                        tracing::info!(
                            path = %path.display(),
                            rows = store.len(),
                            dim = store.dim(),
                            "Loaded pre-computed embeddings"
                        );
                        return Ok(store);
                    }
                    Some(reason) => {
                        tracing::warn!("Embedding store is stale ({reason}); regenerating");
                    }
                },
                Err(e) => {
                    tracing::warn!("Embedding store unreadable ({e}); regenerating");
                }
            }
        } else {
            tracing::info!("No embedding store at {}; computing embeddings", path.display());
        }

        let store = Self::build(texts, embedder, batch_size).await?;
        store.persist(path)?;
        Ok(store)
    }

    /// Embed every text from scratch, `batch_size` texts per call.
    pub async fn build(
        texts: &[String],
        embedder: &dyn Embedder,
        batch_size: usize,
    ) -> Result<Self, EmbeddingError> {
        let batch_size = batch_size.max(1);
        let total_batches = texts.len().div_ceil(batch_size);
        let mut rows = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(batch_size).enumerate() {
            tracing::info!("Processing batch {}/{}...", i + 1, total_batches);
            let embeddings = embedder.embed(batch).await?;
            if embeddings.len() != batch.len() {
                return Err(EmbeddingError::Malformed(format!(
                    "batch {} returned {} vectors for {} texts",
                    i + 1,
                    embeddings.len(),
                    batch.len()
                )));
            }
            rows.extend(embeddings);
        }

        Self::from_rows(rows, embedder.model())
    }

    /// Validate that all rows share one non-zero dimension.
    pub fn from_rows(rows: Vec<Vec<f32>>, model: &str) -> Result<Self, EmbeddingError> {
        let dim = rows.first().map(Vec::len).unwrap_or(0);
        if !rows.is_empty() && dim == 0 {
            return Err(EmbeddingError::Malformed("zero-length embedding".to_string()));
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != dim) {
            return Err(EmbeddingError::Malformed(format!(
                "row {i} has dimension {}, expected {dim}",
                row.len()
            )));
        }
        Ok(Self {
            rows,
            dim,
            model: model.to_string(),
        })
    }

    /// Read a persisted store in any of the legacy layouts.
    pub fn load(path: &Path) -> Result<Self, EmbeddingError> {
        let data = std::fs::read_to_string(path).map_err(|source| EmbeddingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let rows = serde_json::from_str::<PersistedStore>(&data)?.into_rows();
        // A store written before the sidecar existed is attributed to no model.
        let model = std::fs::read_to_string(model_sidecar(path))
            .map(|m| m.trim().to_string())
            .unwrap_or_default();
        Self::from_rows(rows, &model)
    }

    /// Why this store cannot serve a corpus of `expected_rows` records embedded with `model`.
    fn mismatch(&self, expected_rows: usize, model: &str) -> Option<String> {
        if self.rows.len() != expected_rows {
            return Some(format!(
                "{} rows for {} corpus records",
                self.rows.len(),
                expected_rows
            ));
        }
        if !self.model.is_empty() && self.model != model {
            return Some(format!("built with {}, configured {}", self.model, model));
        }
        None
    }

    /// Pin a store that predates the model sidecar to `embedder`, if one sample
    /// embedding has the store's dimension. `None` means the store must be rebuilt.
    async fn adopt(
        mut self,
        path: &Path,
        texts: &[String],
        embedder: &dyn Embedder,
    ) -> Result<Option<Self>, EmbeddingError> {
        if let Some(sample) = texts.first() {
            let probe = embed_one(embedder, sample).await?;
            if probe.len() != self.dim {
                tracing::warn!(
                    "Embedding store has dimension {}, {} produces {}; regenerating",
                    self.dim,
                    embedder.model(),
                    probe.len()
                );
                return Ok(None);
            }
        }

        self.model = embedder.model().to_string();
        write_atomic(&model_sidecar(path), self.model.as_bytes())?;
        tracing::info!(
            path = %path.display(),
            model = %self.model,
            "Pinned legacy embedding store to model"
        );
        Ok(Some(self))
    }

    /// Write rows and model sidecar, each via temp file + rename.
    pub fn persist(&self, path: &Path) -> Result<(), EmbeddingError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| EmbeddingError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let data = serde_json::to_vec(&self.rows)?;
        write_atomic(path, &data)?;
        write_atomic(&model_sidecar(path), self.model.as_bytes())?;

        tracing::info!(path = %path.display(), rows = self.len(), "Saved embeddings");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }
}

fn model_sidecar(path: &Path) -> PathBuf {
    path.with_extension("model")
}

/// Unique temp name per writer so concurrent builders never share a temp file.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), EmbeddingError> {
    let tmp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
    let io_err = |source| EmbeddingError::Io {
        path: path.to_path_buf(),
        source,
    };

    std::fs::write(&tmp_path, data).map_err(io_err)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        if let Err(cleanup) = std::fs::remove_file(&tmp_path) {
            tracing::debug!("Could not remove {}: {cleanup}", tmp_path.display());
        }
        return Err(io_err(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds each text as `[len, 1.0]` and counts calls.
    struct CountingEmbedder {
        calls: AtomicUsize,
        model: String,
    }

    impl CountingEmbedder {
        fn new(model: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                model: model.to_string(),
            }
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model(&self) -> &str {
            &self.model
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model(&self) -> &str {
            "broken"
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::Generation("connection refused".into()))
        }
    }

    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn model(&self) -> &str {
            "short"
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(vec![vec![1.0]])
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| "x".repeat(i + 1)).collect()
    }

    #[tokio::test]
    async fn test_build_batches_texts() {
        let embedder = CountingEmbedder::new("m");
        let store = EmbeddingStore::build(&texts(250), &embedder, 100).await.unwrap();
        assert_eq!(store.len(), 250);
        assert_eq!(store.dim(), 2);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_build_rejects_short_batch() {
        let err = EmbeddingStore::build(&texts(3), &ShortEmbedder, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_build_propagates_failure() {
        let err = EmbeddingStore::build(&texts(3), &FailingEmbedder, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::Generation(_)));
    }

    #[test]
    fn test_from_rows_rejects_ragged() {
        let err = EmbeddingStore::from_rows(vec![vec![1.0, 2.0], vec![1.0]], "m").unwrap_err();
        assert!(matches!(err, EmbeddingError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_open_or_build_persists_and_reuses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/embeddings.json");
        let embedder = CountingEmbedder::new("m");

        let first = EmbeddingStore::open_or_build(&path, &texts(5), &embedder, 100)
            .await
            .unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::read_to_string(path.with_extension("model")).unwrap(), "m");

        let second = EmbeddingStore::open_or_build(&path, &texts(5), &embedder, 100)
            .await
            .unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.rows(), second.rows());
    }

    #[tokio::test]
    async fn test_row_count_mismatch_regenerates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        std::fs::write(&path, "[[1.0, 0.0], [0.0, 1.0]]").unwrap();

        let embedder = CountingEmbedder::new("m");
        let store = EmbeddingStore::open_or_build(&path, &texts(3), &embedder, 100)
            .await
            .unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(EmbeddingStore::load(&path).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unpinned_store_with_matching_dimension_is_adopted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        std::fs::write(&path, "[[1.0, 1.0], [2.0, 1.0]]").unwrap();

        let embedder = CountingEmbedder::new("m");
        let store = EmbeddingStore::open_or_build(&path, &texts(2), &embedder, 100)
            .await
            .unwrap();
        assert_eq!(store.rows()[1], vec![2.0, 1.0]);
        assert_eq!(store.model(), "m");
        assert_eq!(std::fs::read_to_string(path.with_extension("model")).unwrap(), "m");
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);

        // Pinned now: the next open embeds nothing.
        EmbeddingStore::open_or_build(&path, &texts(2), &embedder, 100)
            .await
            .unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unpinned_store_with_other_dimension_regenerates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        std::fs::write(&path, "[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]").unwrap();

        let embedder = CountingEmbedder::new("m");
        let store = EmbeddingStore::open_or_build(&path, &texts(2), &embedder, 100)
            .await
            .unwrap();
        assert_eq!(store.dim(), 2);
        assert_eq!(store.rows()[0], vec![1.0, 1.0]);
        assert_eq!(EmbeddingStore::load(&path).unwrap().dim(), 2);
    }

    #[tokio::test]
    async fn test_model_change_regenerates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        EmbeddingStore::open_or_build(&path, &texts(2), &CountingEmbedder::new("old"), 100)
            .await
            .unwrap();

        let embedder = CountingEmbedder::new("new");
        let store = EmbeddingStore::open_or_build(&path, &texts(2), &embedder, 100)
            .await
            .unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.model(), "new");
    }

    #[test]
    fn test_load_legacy_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");

        std::fs::write(&path, "[[1.0, 2.0], [3.0, 4.0]]").unwrap();
        assert_eq!(EmbeddingStore::load(&path).unwrap().len(), 2);

        std::fs::write(&path, r#"[["P1", "P2"], [[1.0, 2.0], [3.0, 4.0]]]"#).unwrap();
        let store = EmbeddingStore::load(&path).unwrap();
        assert_eq!(store.rows()[1], vec![3.0, 4.0]);

        std::fs::write(
            &path,
            r#"{"embeddings": [[1.0, 2.0]], "position_ids": ["P1"], "model": "m"}"#,
        )
        .unwrap();
        assert_eq!(EmbeddingStore::load(&path).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_store_regenerates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = EmbeddingStore::open_or_build(&path, &texts(2), &CountingEmbedder::new("m"), 10)
            .await
            .unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_persist_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        let store = EmbeddingStore::from_rows(vec![vec![1.0, 0.0]], "m").unwrap();
        store.persist(&path).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().all(|n| !n.ends_with(".tmp")), "{names:?}");
    }
}
