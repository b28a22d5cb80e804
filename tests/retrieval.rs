//! End-to-end retrieval through the library: CSV corpus and safetensors
//! index on disk, a table-driven encoder, and the ask service on top.

use anyhow::Result;
use async_trait::async_trait;
use qa_context::ask::AskService;
use qa_context::config::{load_config, Config};
use qa_context::corpus_file::load_corpus;
use qa_context::engine::load_engine;
use qa_context::generate::DisabledGenerator;
use qa_context::index_cmd::build_index;
use qa_context::index_file::write_safetensors;
use qa_context_core::embedding::QueryEncoder;
use qa_context_core::engine::EngineState;
use qa_context_core::error::RetrievalError;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

// ─── Fixture encoder ────────────────────────────────────────────────

/// Embeds known texts to fixed 3-d vectors; anything else fails.
struct TableEncoder;

#[async_trait]
impl QueryEncoder for TableEncoder {
    fn model_name(&self) -> &str {
        "table"
    }
    fn dims(&self) -> usize {
        3
    }
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        match text {
            // Corpus rows, embedded from "question\nanswer".
            "What breaks the fast?\nEating or drinking deliberately." => Ok(vec![1.0, 0.1, 0.0]),
            "How many daily prayers?\nFive." => Ok(vec![0.1, 1.0, 0.0]),
            "What is zakat?\nObligatory alms." => Ok(vec![0.0, 0.2, 1.0]),
            // Queries.
            "How many prayers are there?" => Ok(vec![0.2, 0.9, 0.1]),
            "Tell me about fasting" => Ok(vec![0.9, 0.0, 0.1]),
            other => anyhow::bail!("no fixture vector for {:?}", other),
        }
    }
}

const CORPUS: &str = "question,answer,URL\n\
What breaks the fast?,Eating or drinking deliberately.,u1\n\
How many daily prayers?,Five.,u2\n\
What is zakat?,Obligatory alms.,u3\n";

async fn setup(top_k: usize) -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("collected.csv"), CORPUS).unwrap();
    fs::write(
        tmp.path().join("qactx.toml"),
        format!(
            "[corpus]\npath = \"collected.csv\"\n\
             [index]\npath = \"embeddings.safetensors\"\n\
             [embedding]\nprovider = \"disabled\"\n\
             [retrieval]\ntop_k = {}\n",
            top_k
        ),
    )
    .unwrap();
    let config = load_config(&tmp.path().join("qactx.toml")).unwrap();

    let corpus = load_corpus(&config.corpus.path).unwrap();
    let rows = build_index(&corpus, &TableEncoder, 2).await.unwrap();
    write_safetensors(&config.index.path, &rows, "embeddings", "table", &corpus).unwrap();

    (tmp, config)
}

#[tokio::test]
async fn test_top1_returns_closest_record() {
    let (_tmp, config) = setup(5).await;
    let engine = load_engine(&config, Arc::new(TableEncoder)).unwrap();

    let result = engine.query("How many prayers are there?", 1).await.unwrap();
    assert_eq!(result.primary_record.answer, "Five.");
    assert_eq!(result.primary_record.source_url, "u2");
    assert_eq!(
        result.context_text,
        "Question 1: How many daily prayers?\nAnswer 1: Five."
    );
}

#[tokio::test]
async fn test_top2_renders_two_blocks_in_rank_order() {
    let (_tmp, config) = setup(5).await;
    let engine = load_engine(&config, Arc::new(TableEncoder)).unwrap();

    let result = engine.query("How many prayers are there?", 2).await.unwrap();
    let blocks: Vec<&str> = result.context_text.split("\n\n").collect();
    assert_eq!(blocks.len(), 2);
    assert!(blocks[0].starts_with("Question 1: How many daily prayers?"));
    assert!(blocks[1].starts_with("Question 2: "));
    assert!(result.ranked[0].score >= result.ranked[1].score);
    assert_eq!(result.primary_score, result.ranked[0].score);
}

#[tokio::test]
async fn test_top_k_is_clamped_to_corpus_size() {
    let (_tmp, config) = setup(5).await;
    let engine = load_engine(&config, Arc::new(TableEncoder)).unwrap();

    let result = engine.query("Tell me about fasting", 50).await.unwrap();
    assert_eq!(result.ranked.len(), 3);
    assert_eq!(result.primary_record.source_url, "u1");
    assert!(result.primary_score <= 1.0 && result.primary_score >= -1.0);
}

#[tokio::test]
async fn test_repeated_queries_are_identical() {
    let (_tmp, config) = setup(5).await;
    let engine = load_engine(&config, Arc::new(TableEncoder)).unwrap();

    let a = engine.query("Tell me about fasting", 3).await.unwrap();
    let b = engine.query("Tell me about fasting", 3).await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_encoder_failure_is_per_query() {
    let (_tmp, config) = setup(5).await;
    let engine = load_engine(&config, Arc::new(TableEncoder)).unwrap();

    let err = engine.query("unknown question", 3).await.unwrap_err();
    assert!(matches!(err, RetrievalError::Encoding(_)));
    assert_eq!(*engine.state(), EngineState::Ready);
    assert!(engine.query("Tell me about fasting", 1).await.is_ok());
}

#[tokio::test]
async fn test_added_corpus_row_fails_load() {
    let (_tmp, config) = setup(5).await;
    fs::write(
        &config.corpus.path,
        format!("{}What is hajj?,Pilgrimage.,u4\n", CORPUS),
    )
    .unwrap();

    let err = load_engine(&config, Arc::new(TableEncoder)).unwrap_err();
    assert!(matches!(err, RetrievalError::Load(_)));
}

#[tokio::test]
async fn test_ask_service_uses_configured_top_k() {
    let (_tmp, config) = setup(1).await;
    let engine = load_engine(&config, Arc::new(TableEncoder)).unwrap();
    let service = AskService::new(
        Arc::new(engine),
        Arc::new(DisabledGenerator),
        config.retrieval.top_k,
    );

    let response = service.ask("How many prayers are there?", None).await.unwrap();
    assert_eq!(response.answer, None);
    assert_eq!(response.original_question, "How many daily prayers?");
    assert_eq!(response.source_url, "u2");
    assert!(response.confidence > 0.9 && response.confidence <= 1.0);
}

#[tokio::test]
async fn test_engine_shared_across_tasks() {
    let (_tmp, config) = setup(5).await;
    let engine = Arc::new(load_engine(&config, Arc::new(TableEncoder)).unwrap());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.query("How many prayers are there?", 1).await
        }));
    }
    for h in handles {
        let result = h.await.unwrap().unwrap();
        assert_eq!(result.primary_record.source_url, "u2");
    }
}
