//! Renders ranked rows into the context block handed to a generator.

use serde::Deserialize;

use crate::corpus::CorpusStore;
use crate::error::{Result, RetrievalError};
use crate::models::{RankedResult, RetrievalResult};
use crate::rank::ScoredRow;

/// Line labels used when rendering each question/answer block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContextLabels {
    #[serde(default = "default_question_label")]
    pub question_label: String,
    #[serde(default = "default_answer_label")]
    pub answer_label: String,
}

fn default_question_label() -> String {
    "Question".to_string()
}
fn default_answer_label() -> String {
    "Answer".to_string()
}

impl Default for ContextLabels {
    fn default() -> Self {
        Self {
            question_label: default_question_label(),
            answer_label: default_answer_label(),
        }
    }
}

/// Map ranked rows back to corpus records and render the context block.
///
/// Each row becomes a two-line block numbered by its 1-based rank:
///
/// ```text
/// Question 1: <question>
/// Answer 1: <answer>
///
/// Question 2: <question>
/// Answer 2: <answer>
/// ```
///
/// The rank-1 row becomes the primary citation.
///
/// # Errors
///
/// - [`RetrievalError::EmptyResultSet`] if `ranked` is empty.
/// - [`RetrievalError::Load`] if a row index is outside the corpus, which
///   means the index and corpus were never aligned.
pub fn assemble(
    ranked: &[ScoredRow],
    corpus: &CorpusStore,
    labels: &ContextLabels,
) -> Result<RetrievalResult> {
    let first = ranked.first().ok_or(RetrievalError::EmptyResultSet)?;

    let results: Vec<RankedResult> = ranked
        .iter()
        .map(|row| {
            corpus
                .get(row.index)
                .map(|record| RankedResult {
                    index: row.index,
                    record: record.clone(),
                    score: row.score,
                })
                .ok_or_else(|| {
                    RetrievalError::Load(format!(
                        "ranked row {} is outside the corpus ({} records)",
                        row.index,
                        corpus.len()
                    ))
                })
        })
        .collect::<Result<_>>()?;

    let context_text = results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let n = i + 1;
            format!(
                "{} {}: {}\n{} {}: {}",
                labels.question_label,
                n,
                r.record.question,
                labels.answer_label,
                n,
                r.record.answer
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    Ok(RetrievalResult {
        context_text,
        primary_record: results[0].record.clone(),
        primary_score: first.score,
        ranked: results,
    })
}
