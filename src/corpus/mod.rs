//! Corpus loading: parse one of the known corpus document shapes into a
//! deduplicated, ordered list of [`PositionRecord`]s.

pub mod shapes;

use std::collections::HashSet;
use std::path::Path;

use serde_json::Value;

use crate::error::CorpusError;
use crate::models::PositionRecord;

use shapes::SHAPES;

/// The normalized corpus. Record order is the embedding-store row order.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub records: Vec<PositionRecord>,
    /// Name of the shape adapter that produced the records.
    pub shape: &'static str,
    /// Records dropped because their text was empty after normalization.
    pub dropped_empty: usize,
}

impl Corpus {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn texts(&self) -> Vec<String> {
        self.records.iter().map(|r| r.text.clone()).collect()
    }
}

/// Read and normalize a corpus file.
pub fn load_corpus(path: &Path) -> Result<Corpus, CorpusError> {
    let data = std::fs::read_to_string(path).map_err(|source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: Value = serde_json::from_str(&data)?;
    let corpus = normalize(&doc)?;

    tracing::info!(
        path = %path.display(),
        shape = corpus.shape,
        records = corpus.len(),
        "Loaded corpus"
    );
    Ok(corpus)
}

/// Normalize an already-parsed corpus document.
pub fn normalize(doc: &Value) -> Result<Corpus, CorpusError> {
    let shape = SHAPES
        .iter()
        .find(|shape| (shape.detect)(doc))
        .ok_or(CorpusError::Format)?;

    let mut seen = HashSet::new();
    let unique: Vec<PositionRecord> = (shape.adapt)(doc)
        .into_iter()
        .filter(|r| seen.insert(r.id.clone()))
        .collect();

    let before = unique.len();
    let records: Vec<PositionRecord> = unique
        .into_iter()
        .filter(|r| !r.text.trim().is_empty())
        .collect();
    let dropped_empty = before - records.len();

    if dropped_empty > 0 {
        tracing::warn!("Filtered out {dropped_empty} positions with empty text");
    }

    Ok(Corpus {
        records,
        shape: shape.name,
        dropped_empty,
    })
}
