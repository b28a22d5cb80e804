//! Answer-generation backends.
//!
//! | Provider | Behavior |
//! |----------|----------|
//! | `command` | Spawns `<command> run <model>` (or `<command> <args..>`), writes the prompt to stdin, reads the answer from stdout |
//! | `ollama` | `POST {url}/api/generate` with `stream: false` |
//! | `disabled` | No generation; callers return retrieval results only |
//!
//! Every backend makes a single attempt. A failure surfaces as an error
//! the caller maps to `generation_failed`.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use qa_context_core::generate::{build_prompt, Generator, DEFAULT_PROMPT_TEMPLATE};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::config::GenerationConfig;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Build the generator selected by `[generation].provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    let template = config
        .prompt_template
        .clone()
        .unwrap_or_else(|| DEFAULT_PROMPT_TEMPLATE.to_string());
    let timeout = Duration::from_secs(config.timeout_secs);

    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "command" => {
            let args = config
                .args
                .clone()
                .unwrap_or_else(|| vec!["run".to_string(), config.model.clone()]);
            Ok(Arc::new(CommandGenerator {
                program: config.command.clone(),
                args,
                template,
                timeout,
            }))
        }
        "ollama" => {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .context("Failed to build HTTP client")?;
            Ok(Arc::new(OllamaGenerator {
                client,
                url: config
                    .url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
                model: config.model.clone(),
                template,
            }))
        }
        other => bail!("Unknown generation provider: '{}'", other),
    }
}

/// Generation switched off.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn generate(&self, _context: &str, _question: &str) -> Result<String> {
        bail!("generation is disabled")
    }
}

/// Runs a local CLI (by default `ollama run <model>`) once per request.
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
    template: String,
    timeout: Duration,
}

impl CommandGenerator {
    async fn run(&self, prompt: &str) -> Result<String> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to execute '{}'. Is it installed?", self.program))?;

        // stdin is written concurrently with draining stdout/stderr.
        let writer = child.stdin.take().map(|mut stdin| {
            let prompt = prompt.to_owned();
            tokio::spawn(async move {
                stdin.write_all(prompt.as_bytes()).await?;
                stdin.shutdown().await
            })
        });

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for generator process")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }

        if let Some(writer) = writer {
            match writer.await.context("Generator stdin task panicked")? {
                Ok(()) => {}
                // A child that exits successfully without reading all input is fine.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => {
                    return Err(e).context("Failed to write prompt to generator stdin");
                }
            }
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl Generator for CommandGenerator {
    fn name(&self) -> &str {
        "command"
    }

    async fn generate(&self, context: &str, question: &str) -> Result<String> {
        let prompt = build_prompt(&self.template, context, question);
        tokio::time::timeout(self.timeout, self.run(&prompt))
            .await
            .map_err(|_| anyhow!("'{}' timed out after {:?}", self.program, self.timeout))?
    }
}

/// Calls Ollama's non-streaming `/api/generate`.
pub struct OllamaGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    template: String,
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, context: &str, question: &str) -> Result<String> {
        let prompt = build_prompt(&self.template, context, question);
        let url = format!("{}/api/generate", self.url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Ollama request to {} failed", url))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, text);
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .context("Ollama returned invalid JSON")?;
        parse_generate_response(&json)
    }
}

fn parse_generate_response(json: &serde_json::Value) -> Result<String> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow!("Ollama response has no 'response' field"))
}
