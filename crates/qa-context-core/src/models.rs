//! Data types that flow through the retrieval pipeline.

use serde::{Deserialize, Serialize};

/// One question/answer pair from the corpus.
///
/// Identity is the record's position in the [`CorpusStore`](crate::corpus::CorpusStore);
/// row `i` of the embedding index is the embedding of record `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusRecord {
    pub question: String,
    pub answer: String,
    pub source_url: String,
}

impl CorpusRecord {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            source_url: source_url.into(),
        }
    }

    /// Text that is embedded for this record when the index is built.
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}", self.question, self.answer)
    }
}

/// A corpus row paired with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    /// Row index in the corpus / embedding index.
    pub index: usize,
    pub record: CorpusRecord,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

/// Output of a single retrieval: the rendered context plus the citation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    /// Numbered question/answer blocks joined by blank lines, in rank order.
    pub context_text: String,
    /// The rank-1 record.
    pub primary_record: CorpusRecord,
    /// The rank-1 score, unrounded.
    pub primary_score: f32,
    /// Every ranked row that went into `context_text`.
    pub ranked: Vec<RankedResult>,
}

impl RetrievalResult {
    /// Caller-facing view with the score rounded to two decimals.
    pub fn to_response(&self) -> RetrievalResponse {
        RetrievalResponse {
            context_text: self.context_text.clone(),
            primary_record: self.primary_record.clone(),
            primary_score: round2(self.primary_score),
        }
    }
}

/// Serialized shape returned to callers of the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResponse {
    pub context_text: String,
    pub primary_record: CorpusRecord,
    pub primary_score: f64,
}

/// Round a score to two decimal places.
pub fn round2(score: f32) -> f64 {
    (f64::from(score) * 100.0).round() / 100.0
}
