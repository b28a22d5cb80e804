//! `qactx index build`: embed every corpus record and write the index.
//!
//! Record `i` is embedded from `"{question}\n{answer}"` and becomes row `i`.
//! Any failed batch aborts the build; a partial index would be misaligned.

use anyhow::{bail, Context, Result};
use qa_context_core::corpus::CorpusStore;
use qa_context_core::embedding::QueryEncoder;

use crate::config::{Config, IndexFormat};
use crate::corpus_file::load_corpus;
use crate::embedding::create_encoder;
use crate::index_file::write_safetensors;

/// Encode all records of `corpus` in batches of `batch_size`.
pub async fn build_index(
    corpus: &CorpusStore,
    encoder: &dyn QueryEncoder,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let texts: Vec<String> = corpus.records().iter().map(|r| r.embedding_text()).collect();
    let mut rows: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
    let mut dims = encoder.dims();

    for (n, batch) in texts.chunks(batch_size.max(1)).enumerate() {
        let start = n * batch_size.max(1);
        let vectors = encoder
            .encode_batch(batch)
            .await
            .with_context(|| format!("Embedding batch starting at row {} failed", start))?;

        if vectors.len() != batch.len() {
            bail!(
                "encoder returned {} vectors for a batch of {} (rows {}..{})",
                vectors.len(),
                batch.len(),
                start,
                start + batch.len()
            );
        }

        for (offset, v) in vectors.into_iter().enumerate() {
            if dims == 0 {
                dims = v.len();
            }
            if v.len() != dims {
                bail!(
                    "row {} has {} dims, expected {}",
                    start + offset,
                    v.len(),
                    dims
                );
            }
            if v.iter().any(|x| !x.is_finite()) {
                bail!("row {} contains a non-finite value", start + offset);
            }
            rows.push(v);
        }

        tracing::debug!(done = rows.len(), total = texts.len(), "embedded batch");
    }

    Ok(rows)
}

pub async fn run_index_build(config: &Config, batch_size_override: Option<usize>) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    if config.index.resolved_format()? != IndexFormat::Safetensors {
        bail!(
            "index build writes safetensors; set index.path to a .safetensors file (got {})",
            config.index.path.display()
        );
    }

    let corpus = load_corpus(&config.corpus.path)?;
    let encoder = create_encoder(&config.embedding).await?;
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);

    let rows = build_index(&corpus, encoder.as_ref(), batch_size).await?;
    write_safetensors(
        &config.index.path,
        &rows,
        &config.index.tensor,
        encoder.model_name(),
        &corpus,
    )?;

    println!("index build");
    println!("  model: {}", encoder.model_name());
    println!("  rows: {}", rows.len());
    println!("  dims: {}", rows.first().map(|r| r.len()).unwrap_or(0));
    println!("  fingerprint: {}", corpus.fingerprint());
    println!("  wrote: {}", config.index.path.display());
    Ok(())
}
