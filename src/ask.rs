//! Retrieval plus generation: the `ask` command, the REPL, and the
//! service the HTTP server shares across requests.

use anyhow::Result;
use qa_context_core::engine::RetrievalEngine;
use qa_context_core::error::RetrievalError;
use qa_context_core::generate::Generator;
use qa_context_core::models::round2;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;

use crate::config::Config;
use crate::engine::open_engine;
use crate::generate::create_generator;

/// Answer to one question, with the best-matching corpus record as citation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AskResponse {
    /// Generated answer; `None` when generation is disabled.
    pub answer: Option<String>,
    pub original_answer: String,
    pub original_question: String,
    pub source_url: String,
    /// Rank-1 cosine similarity, two decimals.
    pub confidence: f64,
}

/// Engine plus generator, cheap to clone.
#[derive(Clone)]
pub struct AskService {
    engine: Arc<RetrievalEngine>,
    generator: Arc<dyn Generator>,
    top_k: usize,
}

impl AskService {
    pub fn new(engine: Arc<RetrievalEngine>, generator: Arc<dyn Generator>, top_k: usize) -> Self {
        Self {
            engine,
            generator,
            top_k,
        }
    }

    /// Open the engine and generator described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let engine = open_engine(config).await?;
        let generator = create_generator(&config.generation)?;
        Ok(Self::new(
            Arc::new(engine),
            generator,
            config.retrieval.top_k,
        ))
    }

    pub fn engine(&self) -> &RetrievalEngine {
        &self.engine
    }

    pub fn generator(&self) -> &dyn Generator {
        self.generator.as_ref()
    }

    /// `top_k` used when a request does not set one.
    pub fn default_top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve context for `question` and, if enabled, generate an answer from it.
    pub async fn ask(
        &self,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<AskResponse, RetrievalError> {
        let result = self
            .engine
            .query(question, top_k.unwrap_or(self.top_k))
            .await?;

        let answer = if self.generator.is_enabled() {
            let text = self
                .generator
                .generate(&result.context_text, question)
                .await
                .map_err(|e| {
                    tracing::warn!(
                        generator = self.generator.name(),
                        error = %format!("{:#}", e),
                        "generation failed"
                    );
                    RetrievalError::Generation(format!("{:#}", e))
                })?;
            Some(text)
        } else {
            None
        };

        Ok(AskResponse {
            answer,
            original_answer: result.primary_record.answer,
            original_question: result.primary_record.question,
            source_url: result.primary_record.source_url,
            confidence: round2(result.primary_score),
        })
    }
}

/// `qactx ask`: answer one question and print it.
pub async fn run_ask(config: &Config, question: &str, top_k: Option<usize>, json: bool) -> Result<()> {
    let service = AskService::from_config(config).await?;
    let response = service.ask(question, top_k).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }
    Ok(())
}

/// `qactx repl`: read questions from stdin until `exit` or EOF.
pub async fn run_repl(config: &Config, top_k: Option<usize>) -> Result<()> {
    let service = AskService::from_config(config).await?;
    println!(
        "Ready: {} records. Type a question, or 'exit' to quit.",
        service.engine().corpus().map(|c| c.len()).unwrap_or(0)
    );

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let question = line.trim();
        if question.eq_ignore_ascii_case("exit") {
            break;
        }
        if question.is_empty() {
            continue;
        }

        match service.ask(question, top_k).await {
            Ok(response) => print_response(&response),
            Err(e) => eprintln!("Error: {}", e),
        }
        println!();
    }
    Ok(())
}

fn print_response(response: &AskResponse) {
    match response.answer {
        Some(ref answer) => println!("{}", answer),
        None => println!("(generation disabled)"),
    }
    println!();
    println!("closest question: {}", response.original_question);
    println!("closest answer:   {}", response.original_answer.replace('\n', " "));
    if !response.source_url.is_empty() {
        println!("source:           {}", response.source_url);
    }
    println!("confidence:       {:.2}", response.confidence);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use qa_context_core::context::ContextLabels;
    use qa_context_core::corpus::CorpusStore;
    use qa_context_core::embedding::QueryEncoder;
    use qa_context_core::index::EmbeddingIndex;
    use qa_context_core::models::CorpusRecord;
    use std::sync::Mutex;

    struct FixedEncoder;

    #[async_trait]
    impl QueryEncoder for FixedEncoder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn encode(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![0.1, 0.9])
        }
    }

    /// Records what it was asked and echoes a canned answer.
    struct RecordingGenerator {
        seen: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl Generator for RecordingGenerator {
        fn name(&self) -> &str {
            "recording"
        }
        async fn generate(&self, context: &str, question: &str) -> anyhow::Result<String> {
            self.seen
                .lock()
                .unwrap()
                .push((context.to_string(), question.to_string()));
            if self.fail {
                anyhow::bail!("model crashed");
            }
            Ok("Five.".to_string())
        }
    }

    struct Off;

    #[async_trait]
    impl Generator for Off {
        fn name(&self) -> &str {
            "off"
        }
        fn is_enabled(&self) -> bool {
            false
        }
        async fn generate(&self, _: &str, _: &str) -> anyhow::Result<String> {
            unreachable!("disabled generator must not be called")
        }
    }

    fn engine() -> Arc<RetrievalEngine> {
        let mut engine = RetrievalEngine::new(Arc::new(FixedEncoder), ContextLabels::default());
        engine
            .load(|| {
                let corpus = CorpusStore::new(vec![
                    CorpusRecord::new("What breaks the fast?", "Eating.", "u0"),
                    CorpusRecord::new("How many daily prayers?", "Five.", "u1"),
                ])?;
                let index = EmbeddingIndex::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0]])?;
                Ok((corpus, index))
            })
            .unwrap();
        Arc::new(engine)
    }

    #[tokio::test]
    async fn test_ask_generates_from_context() {
        let generator = Arc::new(RecordingGenerator {
            seen: Mutex::new(Vec::new()),
            fail: false,
        });
        let service = AskService::new(engine(), generator.clone(), 5);
        let response = service.ask("prayers?", None).await.unwrap();

        assert_eq!(response.answer.as_deref(), Some("Five."));
        assert_eq!(response.original_question, "How many daily prayers?");
        assert_eq!(response.source_url, "u1");
        assert_eq!(response.confidence, 0.99);

        let seen = generator.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0.starts_with("Question 1: How many daily prayers?"));
        assert_eq!(seen[0].1, "prayers?");
    }

    #[tokio::test]
    async fn test_ask_without_generation() {
        let service = AskService::new(engine(), Arc::new(Off), 1);
        let response = service.ask("prayers?", None).await.unwrap();
        assert_eq!(response.answer, None);
        assert_eq!(response.original_answer, "Five.");
    }

    #[tokio::test]
    async fn test_ask_generation_failure_is_reported() {
        let generator = Arc::new(RecordingGenerator {
            seen: Mutex::new(Vec::new()),
            fail: true,
        });
        let service = AskService::new(engine(), generator.clone(), 5);
        let err = service.ask("prayers?", None).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Generation(ref m) if m.contains("model crashed")));
        assert_eq!(generator.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ask_empty_question() {
        let service = AskService::new(engine(), Arc::new(Off), 5);
        let err = service.ask("   ", None).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Encoding(_)));
    }
}
