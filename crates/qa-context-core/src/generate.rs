//! Capability interface for the answer-generation collaborator.
//!
//! The retrieval core never spawns processes or calls generation services
//! itself; hosts plug a [`Generator`] in next to the engine.

use anyhow::Result;
use async_trait::async_trait;

/// Default prompt. `{question}` and `{context}` are substituted by [`build_prompt`].
pub const DEFAULT_PROMPT_TEMPLATE: &str = "You are a subject-matter expert. Answer the user's \
question using the context retrieved from the knowledge base. If the question concerns basic, \
well-established facts that the context does not cover, answer briefly from general knowledge. \
Do not repeat the questions from the context; give only the final answer.

Question: {question}

Context from the knowledge base:
{context}

Answer:";

/// Text in, text out.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Backend identifier for logs and health output.
    fn name(&self) -> &str;

    /// `false` when generation is switched off; callers skip [`generate`](Generator::generate).
    fn is_enabled(&self) -> bool {
        true
    }

    /// Produce an answer for `question` grounded in `context`.
    async fn generate(&self, context: &str, question: &str) -> Result<String>;
}

/// Substitute `{question}` and `{context}` into `template`.
///
/// The question is substituted last so text inside the context that looks
/// like a placeholder is never expanded.
pub fn build_prompt(template: &str, context: &str, question: &str) -> String {
    let mut parts = template.split("{context}");
    let mut out = String::with_capacity(template.len() + context.len() + question.len());
    if let Some(head) = parts.next() {
        out.push_str(&head.replace("{question}", question));
    }
    for part in parts {
        out.push_str(context);
        out.push_str(&part.replace("{question}", question));
    }
    out
}
