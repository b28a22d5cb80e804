//! CSV corpus loader.
//!
//! The corpus file must have a header row with `question`, `answer`, and
//! `URL` columns (matched case-insensitively; `source_url` is accepted for
//! `URL`). Extra columns are ignored. Fields may be quoted and span lines.

use anyhow::{bail, Context, Result};
use qa_context_core::corpus::CorpusStore;
use qa_context_core::models::CorpusRecord;
use std::io::Read;
use std::path::Path;

/// Load the corpus CSV at `path`.
pub fn load_corpus(path: &Path) -> Result<CorpusStore> {
    if !path.exists() {
        bail!("Corpus file not found: {}", path.display());
    }
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open corpus file: {}", path.display()))?;
    let store = read_corpus(file)
        .with_context(|| format!("Failed to read corpus file: {}", path.display()))?;
    tracing::info!(records = store.len(), path = %path.display(), "corpus loaded");
    Ok(store)
}

/// Parse corpus CSV from any reader.
pub fn read_corpus<R: Read>(reader: R) -> Result<CorpusStore> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = rdr.headers().context("Missing CSV header row")?.clone();
    let column = |names: &[&str]| -> Option<usize> {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.trim_start_matches('\u{feff}').eq_ignore_ascii_case(n)))
    };

    let q_col = column(&["question"]).context("Corpus is missing required column 'question'")?;
    let a_col = column(&["answer"]).context("Corpus is missing required column 'answer'")?;
    let u_col =
        column(&["URL", "source_url"]).context("Corpus is missing required column 'URL'")?;

    let mut records = Vec::new();
    for (i, row) in rdr.records().enumerate() {
        // Header is line 1.
        let row = row.with_context(|| format!("Malformed corpus row {}", i + 2))?;
        let field = |col: usize| row.get(col).unwrap_or("").to_string();
        records.push(CorpusRecord {
            question: field(q_col),
            answer: field(a_col),
            source_url: field(u_col),
        });
    }

    Ok(CorpusStore::new(records)?)
}
