//! Startup wiring: config → encoder → loaded [`RetrievalEngine`].

use anyhow::Result;
use qa_context_core::embedding::QueryEncoder;
use qa_context_core::engine::RetrievalEngine;
use qa_context_core::error::RetrievalError;
use std::sync::Arc;

use crate::config::Config;
use crate::corpus_file::load_corpus;
use crate::embedding::{create_encoder, resolve_local_model};
use crate::index_file::{load_index, IndexExpectations};

/// Build the configured encoder and load the corpus and index into a new engine.
///
/// Returns the engine only if it reached `Ready`; any load failure is fatal.
pub async fn open_engine(config: &Config) -> Result<RetrievalEngine> {
    let encoder = create_encoder(&config.embedding).await?;
    let engine = load_engine(config, encoder)?;
    Ok(engine)
}

/// Load the corpus and index from `config` into an engine that uses `encoder`.
pub fn load_engine(
    config: &Config,
    encoder: Arc<dyn QueryEncoder>,
) -> Result<RetrievalEngine, RetrievalError> {
    let model = match config.embedding.provider.as_str() {
        "disabled" => None,
        "local" => Some(resolve_local_model(&config.embedding).0),
        _ => config.embedding.model.clone(),
    };
    let dims = config
        .embedding
        .dims
        .filter(|d| *d > 0)
        .or_else(|| Some(encoder.dims()).filter(|d| *d > 0));

    let mut engine = RetrievalEngine::new(encoder, config.context.clone());
    engine.load(|| {
        let corpus = load_corpus(&config.corpus.path).map_err(load_error)?;
        let fingerprint = corpus.fingerprint();
        let index = load_index(
            &config.index,
            IndexExpectations {
                dims,
                corpus_fingerprint: Some(&fingerprint),
                model: model.as_deref(),
            },
        )
        .map_err(load_error)?;
        Ok((corpus, index))
    })?;
    Ok(engine)
}

fn load_error(e: anyhow::Error) -> RetrievalError {
    RetrievalError::Load(format!("{:#}", e))
}
