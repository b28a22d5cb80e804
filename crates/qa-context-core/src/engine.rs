//! The retrieval engine: an explicit value that owns the corpus and index.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──load()──▶ Loading ──ok──▶ Ready
//!                              │
//!                              └──err──▶ Failed (terminal)
//! ```
//!
//! Queries are only served in `Ready`. A `Failed` engine refuses further
//! loads so it can never serve against partial state.

use std::fmt;
use std::sync::Arc;

use crate::context::{assemble, ContextLabels};
use crate::corpus::CorpusStore;
use crate::embedding::QueryEncoder;
use crate::error::{Result, RetrievalError};
use crate::index::EmbeddingIndex;
use crate::models::RetrievalResult;
use crate::rank::{ExactCosineRanker, Ranker};

/// Number of rows retrieved when the caller does not say otherwise.
pub const DEFAULT_TOP_K: usize = 5;

/// Observable engine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Loading,
    Ready,
    /// Carries the load error message.
    Failed(String),
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Uninitialized => write!(f, "uninitialized"),
            EngineState::Loading => write!(f, "loading"),
            EngineState::Ready => write!(f, "ready"),
            EngineState::Failed(_) => write!(f, "failed"),
        }
    }
}

struct Loaded {
    corpus: CorpusStore,
    index: EmbeddingIndex,
}

/// Query → encode → rank → assemble, over data loaded once at startup.
///
/// Holds no per-query state; wrap it in an `Arc` to share across tasks.
pub struct RetrievalEngine {
    encoder: Arc<dyn QueryEncoder>,
    ranker: Box<dyn Ranker>,
    labels: ContextLabels,
    state: EngineState,
    data: Option<Loaded>,
}

impl fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("state", &self.state)
            .field("model", &self.encoder.model_name())
            .field("rows", &self.index().map(|i| i.len()))
            .field("dims", &self.index().map(|i| i.dims()))
            .finish()
    }
}

impl RetrievalEngine {
    /// Create an engine in the `Uninitialized` state using the exact cosine ranker.
    pub fn new(encoder: Arc<dyn QueryEncoder>, labels: ContextLabels) -> Self {
        Self {
            encoder,
            ranker: Box::new(ExactCosineRanker),
            labels,
            state: EngineState::Uninitialized,
            data: None,
        }
    }

    /// Replace the ranker (e.g. with an approximate index for large corpora).
    pub fn with_ranker(mut self, ranker: Box<dyn Ranker>) -> Self {
        self.ranker = ranker;
        self
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == EngineState::Ready
    }

    pub fn encoder(&self) -> &dyn QueryEncoder {
        self.encoder.as_ref()
    }

    /// Loaded corpus, if `Ready`.
    pub fn corpus(&self) -> Option<&CorpusStore> {
        self.data.as_ref().map(|d| &d.corpus)
    }

    /// Loaded index, if `Ready`.
    pub fn index(&self) -> Option<&EmbeddingIndex> {
        self.data.as_ref().map(|d| &d.index)
    }

    /// Run the loader and move to `Ready` or `Failed`.
    ///
    /// The loader produces the corpus and index; this method validates
    /// their alignment (same row count, index dims equal to the encoder's
    /// when the encoder reports them).
    ///
    /// # Errors
    ///
    /// [`RetrievalError::Load`] if the loader fails, validation fails, or
    /// the engine is not `Uninitialized`.
    pub fn load<F>(&mut self, loader: F) -> Result<()>
    where
        F: FnOnce() -> Result<(CorpusStore, EmbeddingIndex)>,
    {
        if self.state != EngineState::Uninitialized {
            return Err(RetrievalError::Load(format!(
                "engine cannot load from state '{}'",
                self.state
            )));
        }

        self.state = EngineState::Loading;
        tracing::debug!("retrieval engine loading");

        match loader().and_then(|(corpus, index)| self.validate(corpus, index)) {
            Ok(loaded) => {
                tracing::info!(
                    rows = loaded.corpus.len(),
                    dims = loaded.index.dims(),
                    model = self.encoder.model_name(),
                    "retrieval engine ready"
                );
                self.data = Some(loaded);
                self.state = EngineState::Ready;
                Ok(())
            }
            Err(e) => {
                let msg = match &e {
                    RetrievalError::Load(m) => m.clone(),
                    other => other.to_string(),
                };
                tracing::error!(error = %msg, "retrieval engine failed to load");
                self.state = EngineState::Failed(msg.clone());
                Err(RetrievalError::Load(msg))
            }
        }
    }

    fn validate(&self, corpus: CorpusStore, index: EmbeddingIndex) -> Result<Loaded> {
        if corpus.len() != index.len() {
            return Err(RetrievalError::Load(format!(
                "corpus has {} records but embedding index has {} rows",
                corpus.len(),
                index.len()
            )));
        }
        let encoder_dims = self.encoder.dims();
        if encoder_dims > 0 && encoder_dims != index.dims() {
            return Err(RetrievalError::Load(format!(
                "embedding index has {} dims but encoder '{}' produces {}",
                index.dims(),
                self.encoder.model_name(),
                encoder_dims
            )));
        }
        Ok(Loaded { corpus, index })
    }

    /// Retrieve the `top_k` most similar records and render the context.
    ///
    /// `top_k` above the corpus size is clamped; `top_k == 0` is a caller
    /// bug and yields [`RetrievalError::EmptyResultSet`].
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::NotReady`] unless the engine is `Ready`.
    /// - [`RetrievalError::Encoding`] for empty text or encoder failure.
    /// - [`RetrievalError::DimensionMismatch`] if the encoder output does not match the index.
    pub async fn query(&self, text: &str, top_k: usize) -> Result<RetrievalResult> {
        let data = match (&self.state, &self.data) {
            (EngineState::Ready, Some(data)) => data,
            _ => return Err(RetrievalError::NotReady(self.state.to_string())),
        };

        if text.trim().is_empty() {
            return Err(RetrievalError::Encoding("query text is empty".into()));
        }

        let query_vec = self
            .encoder
            .encode(text)
            .await
            .map_err(|e| RetrievalError::Encoding(format!("{:#}", e)))?;

        if query_vec.iter().any(|v| !v.is_finite()) {
            return Err(RetrievalError::Encoding(
                "encoder produced a non-finite value".into(),
            ));
        }

        let ranked = self.ranker.rank(&query_vec, &data.index, top_k)?;
        let result = assemble(&ranked, &data.corpus, &self.labels)?;

        tracing::debug!(
            top_k,
            returned = result.ranked.len(),
            primary_index = result.ranked[0].index,
            primary_score = result.primary_score,
            "query served"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CorpusRecord;
    use async_trait::async_trait;

    /// Maps a handful of known strings to fixed vectors.
    struct TableEncoder;

    #[async_trait]
    impl QueryEncoder for TableEncoder {
        fn model_name(&self) -> &str {
            "table"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn encode(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            match text {
                "How many prayers are there?" => Ok(vec![0.1, 0.9]),
                "fasting" => Ok(vec![1.0, 0.0]),
                "nan" => Ok(vec![f32::NAN, 0.0]),
                "wide" => Ok(vec![1.0, 0.0, 0.0]),
                _ => anyhow::bail!("unknown text"),
            }
        }
    }

    /// Reports no dimensionality and returns whatever length it is asked for.
    struct LooseEncoder;

    #[async_trait]
    impl QueryEncoder for LooseEncoder {
        fn model_name(&self) -> &str {
            "loose"
        }
        fn dims(&self) -> usize {
            0
        }
        async fn encode(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![1.0; text.len()])
        }
    }

    fn corpus() -> CorpusStore {
        CorpusStore::new(vec![
            CorpusRecord::new("What breaks the fast?", "Eating or drinking deliberately.", "u1"),
            CorpusRecord::new("How many daily prayers?", "Five.", "u2"),
        ])
        .unwrap()
    }

    fn index() -> EmbeddingIndex {
        EmbeddingIndex::from_rows(vec![vec![0.9, 0.1], vec![0.2, 0.8]]).unwrap()
    }

    fn ready_engine() -> RetrievalEngine {
        let mut engine = RetrievalEngine::new(Arc::new(TableEncoder), ContextLabels::default());
        engine.load(|| Ok((corpus(), index()))).unwrap();
        engine
    }

    #[tokio::test]
    async fn test_top_1_returns_closest_record() {
        let engine = ready_engine();
        let out = engine.query("How many prayers are there?", 1).await.unwrap();
        assert_eq!(out.primary_record.answer, "Five.");
        assert_eq!(out.primary_record.source_url, "u2");
        assert_eq!(out.ranked.len(), 1);
        assert_eq!(
            out.context_text,
            "Question 1: How many daily prayers?\nAnswer 1: Five."
        );
    }

    #[tokio::test]
    async fn test_top_2_has_both_blocks_in_rank_order() {
        let engine = ready_engine();
        let out = engine.query("How many prayers are there?", 2).await.unwrap();
        let blocks: Vec<&str> = out.context_text.split("\n\n").collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].starts_with("Question 1: How many daily prayers?"));
        assert!(blocks[1].starts_with("Question 2: What breaks the fast?"));
        assert_eq!(out.primary_score, out.ranked[0].score);
        assert!((-1.0..=1.0).contains(&out.primary_score));
    }

    #[tokio::test]
    async fn test_clamps_top_k_and_is_idempotent() {
        let engine = ready_engine();
        let a = engine.query("fasting", 7).await.unwrap();
        let b = engine.query("fasting", 7).await.unwrap();
        assert_eq!(a.ranked.len(), 2);
        assert_eq!(a, b);
        assert_eq!(a.primary_record.source_url, "u1");
    }

    #[tokio::test]
    async fn test_query_before_load_is_not_ready() {
        let engine = RetrievalEngine::new(Arc::new(TableEncoder), ContextLabels::default());
        let err = engine.query("fasting", 1).await.unwrap_err();
        assert_eq!(err, RetrievalError::NotReady("uninitialized".into()));
    }

    #[tokio::test]
    async fn test_row_count_mismatch_fails_at_load() {
        let mut engine = RetrievalEngine::new(Arc::new(TableEncoder), ContextLabels::default());
        let three_rows =
            EmbeddingIndex::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]])
                .unwrap();
        let err = engine.load(|| Ok((corpus(), three_rows))).unwrap_err();
        assert!(matches!(err, RetrievalError::Load(_)));
        assert!(matches!(engine.state(), EngineState::Failed(_)));
        assert!(engine.corpus().is_none());

        let err = engine.query("fasting", 1).await.unwrap_err();
        assert_eq!(err, RetrievalError::NotReady("failed".into()));
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut engine = RetrievalEngine::new(Arc::new(TableEncoder), ContextLabels::default());
        let _ = engine.load(|| Err(RetrievalError::Load("missing file".into())));
        assert_eq!(engine.state(), &EngineState::Failed("missing file".into()));

        let err = engine.load(|| Ok((corpus(), index()))).unwrap_err();
        assert!(matches!(err, RetrievalError::Load(_)));
        assert!(!engine.is_ready());
    }

    #[test]
    fn test_debug_shows_state_and_shape() {
        let engine = ready_engine();
        let dbg = format!("{:?}", engine);
        assert!(dbg.contains("state: Ready"));
        assert!(dbg.contains("rows: Some(2)"));
        assert!(dbg.contains("dims: Some(2)"));

        let fresh = RetrievalEngine::new(Arc::new(TableEncoder), ContextLabels::default());
        assert!(format!("{:?}", fresh).contains("rows: None"));
    }

    #[test]
    fn test_ready_cannot_reload() {
        let mut engine = ready_engine();
        assert!(engine.load(|| Ok((corpus(), index()))).is_err());
        assert!(engine.is_ready());
    }

    #[test]
    fn test_encoder_dims_mismatch_fails_at_load() {
        let mut engine = RetrievalEngine::new(Arc::new(TableEncoder), ContextLabels::default());
        let wide = EmbeddingIndex::from_rows(vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]])
            .unwrap();
        assert!(engine.load(|| Ok((corpus(), wide))).is_err());
    }

    #[tokio::test]
    async fn test_empty_text_is_encoding_failure() {
        let engine = ready_engine();
        let err = engine.query("   ", 1).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Encoding(_)));
    }

    #[tokio::test]
    async fn test_encoder_error_is_encoding_failure() {
        let engine = ready_engine();
        let err = engine.query("something unknown", 1).await.unwrap_err();
        assert_eq!(err, RetrievalError::Encoding("unknown text".into()));
        let err = engine.query("nan", 1).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Encoding(_)));
    }

    #[tokio::test]
    async fn test_wrong_length_vector_is_dimension_mismatch() {
        let engine = ready_engine();
        let err = engine.query("wide", 1).await.unwrap_err();
        assert_eq!(
            err,
            RetrievalError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        );

        let mut loose = RetrievalEngine::new(Arc::new(LooseEncoder), ContextLabels::default());
        loose.load(|| Ok((corpus(), index()))).unwrap();
        assert!(loose.query("ab", 1).await.is_ok());
        assert!(matches!(
            loose.query("abc", 1).await,
            Err(RetrievalError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_top_k_zero_is_empty_result_set() {
        let engine = ready_engine();
        let err = engine.query("fasting", 0).await.unwrap_err();
        assert_eq!(err, RetrievalError::EmptyResultSet);
    }
}
