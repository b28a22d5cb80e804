//! Immutable, in-memory table of question/answer records.

use sha2::{Digest, Sha256};

use crate::error::{Result, RetrievalError};
use crate::models::CorpusRecord;

/// Ordered, read-only sequence of [`CorpusRecord`]s.
///
/// Built once at startup. Row order defines alignment with the
/// [`EmbeddingIndex`](crate::index::EmbeddingIndex).
#[derive(Debug, Clone)]
pub struct CorpusStore {
    records: Vec<CorpusRecord>,
}

impl CorpusStore {
    /// Wrap a list of records. An empty corpus cannot serve any query
    /// and is rejected as a load failure.
    pub fn new(records: Vec<CorpusRecord>) -> Result<Self> {
        if records.is_empty() {
            return Err(RetrievalError::Load("corpus contains no records".into()));
        }
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CorpusRecord> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[CorpusRecord] {
        &self.records
    }

    /// SHA-256 over every record in order, hex-encoded.
    ///
    /// Stored alongside a built index so a later load can tell whether the
    /// index rows still line up with this corpus.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for r in &self.records {
            for field in [&r.question, &r.answer, &r.source_url] {
                hasher.update((field.len() as u64).to_le_bytes());
                hasher.update(field.as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }
}
