//! TOML configuration.
//!
//! Relative paths in `[corpus]` and `[index]` resolve against the directory
//! containing the config file, so a config can travel with its data.

use anyhow::{Context, Result};
use qa_context_core::context::ContextLabels;
use qa_context_core::engine::DEFAULT_TOP_K;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub context: ContextLabels,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// CSV file with `question`, `answer`, and `URL` columns.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub path: PathBuf,
    /// `"safetensors"` or `"raw-f32"`. Inferred from the extension when absent.
    #[serde(default)]
    pub format: Option<String>,
    /// Tensor name inside a safetensors file.
    #[serde(default = "default_tensor")]
    pub tensor: String,
}

fn default_tensor() -> String {
    "embeddings".to_string()
}

/// On-disk layout of the embedding index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Safetensors,
    RawF32,
}

impl IndexConfig {
    pub fn resolved_format(&self) -> Result<IndexFormat> {
        match self.format.as_deref() {
            Some("safetensors") => Ok(IndexFormat::Safetensors),
            Some("raw-f32") => Ok(IndexFormat::RawF32),
            Some(other) => anyhow::bail!(
                "Unknown index format: '{}'. Must be safetensors or raw-f32.",
                other
            ),
            None => match self.path.extension().and_then(|e| e.to_str()) {
                Some("safetensors") => Ok(IndexFormat::Safetensors),
                Some("f32") | Some("bin") => Ok(IndexFormat::RawF32),
                _ => anyhow::bail!(
                    "Cannot infer index format from '{}'; set index.format",
                    self.path.display()
                ),
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `"command"`, `"ollama"`, or `"disabled"`.
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Executable for the `command` provider; invoked as `<command> run <model>`.
    #[serde(default = "default_generation_command")]
    pub command: String,
    /// Extra arguments that replace the default `run <model>` for the `command` provider.
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub prompt_template: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            command: default_generation_command(),
            args: None,
            url: None,
            timeout_secs: default_generation_timeout(),
            prompt_template: None,
        }
    }
}

fn default_generation_provider() -> String {
    "command".to_string()
}
fn default_generation_model() -> String {
    "gemma3:4b".to_string()
}
fn default_generation_command() -> String {
    "ollama".to_string()
}
fn default_generation_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}
fn default_request_timeout() -> u64 {
    180
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    config.corpus.path = resolve(base, &config.corpus.path);
    config.index.path = resolve(base, &config.index.path);

    validate(&config)?;
    Ok(config)
}

fn resolve(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

pub fn validate(config: &Config) -> Result<()> {
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, local, ollama, or openai.",
            other
        ),
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    if config.index.resolved_format()? == IndexFormat::RawF32
        && config.embedding.dims.unwrap_or(0) == 0
    {
        anyhow::bail!("embedding.dims must be set to read a raw-f32 index");
    }

    match config.generation.provider.as_str() {
        "disabled" | "command" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled, command, or ollama.",
            other
        ),
    }

    if let Some(ref t) = config.generation.prompt_template {
        if !t.contains("{question}") || !t.contains("{context}") {
            anyhow::bail!("generation.prompt_template must contain {{question}} and {{context}}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, body: &str) -> PathBuf {
        let p = dir.path().join("qactx.toml");
        fs::write(&p, body).unwrap();
        p
    }

    const MINIMAL: &str = r#"
[corpus]
path = "data/collected.csv"

[index]
path = "models/embeddings.safetensors"
"#;

    #[test]
    fn test_minimal_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = load_config(&write(&dir, MINIMAL)).unwrap();
        assert_eq!(cfg.retrieval.top_k, 5);
        assert_eq!(cfg.embedding.provider, "local");
        assert_eq!(cfg.generation.provider, "command");
        assert_eq!(cfg.generation.model, "gemma3:4b");
        assert_eq!(cfg.context.question_label, "Question");
        assert_eq!(cfg.server.bind, "127.0.0.1:5000");
        assert_eq!(cfg.index.tensor, "embeddings");
        assert_eq!(cfg.index.resolved_format().unwrap(), IndexFormat::Safetensors);
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let dir = TempDir::new().unwrap();
        let cfg = load_config(&write(&dir, MINIMAL)).unwrap();
        assert_eq!(cfg.corpus.path, dir.path().join("data/collected.csv"));
        assert_eq!(
            cfg.index.path,
            dir.path().join("models/embeddings.safetensors")
        );
    }

    #[test]
    fn test_top_k_zero_rejected() {
        let dir = TempDir::new().unwrap();
        let body = format!("{}\n[retrieval]\ntop_k = 0\n", MINIMAL);
        let err = load_config(&write(&dir, &body)).unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn test_raw_index_requires_dims() {
        let dir = TempDir::new().unwrap();
        let body = "[corpus]\npath = \"c.csv\"\n[index]\npath = \"e.f32\"\n";
        let err = load_config(&write(&dir, body)).unwrap_err();
        assert!(err.to_string().contains("raw-f32"));

        let body = format!("{}[embedding]\ndims = 4\n", body);
        let cfg = load_config(&write(&dir, &body)).unwrap();
        assert_eq!(cfg.index.resolved_format().unwrap(), IndexFormat::RawF32);
    }

    #[test]
    fn test_unknown_providers_rejected() {
        let dir = TempDir::new().unwrap();
        let body = format!("{}\n[embedding]\nprovider = \"magic\"\n", MINIMAL);
        assert!(load_config(&write(&dir, &body)).is_err());

        let body = format!("{}\n[generation]\nprovider = \"magic\"\n", MINIMAL);
        assert!(load_config(&write(&dir, &body)).is_err());
    }

    #[test]
    fn test_ollama_embedding_requires_model_and_dims() {
        let dir = TempDir::new().unwrap();
        let body = format!("{}\n[embedding]\nprovider = \"ollama\"\n", MINIMAL);
        assert!(load_config(&write(&dir, &body)).is_err());

        let body = format!(
            "{}\n[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\ndims = 768\n",
            MINIMAL
        );
        assert!(load_config(&write(&dir, &body)).is_ok());
    }

    #[test]
    fn test_prompt_template_needs_placeholders() {
        let dir = TempDir::new().unwrap();
        let body = format!(
            "{}\n[generation]\nprompt_template = \"just {{question}}\"\n",
            MINIMAL
        );
        assert!(load_config(&write(&dir, &body)).is_err());
    }

    #[test]
    fn test_example_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/qactx.example.toml");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.context.question_label, "السؤال");
        assert_eq!(cfg.context.answer_label, "الإجابة");

        let template = cfg.generation.prompt_template.unwrap();
        assert!(template.starts_with("أنت مفتي وخبير شرعي."));
        assert!(template.contains("السؤال: {question}"));
        assert!(template.contains("السياق من قاعدة البيانات:\n{context}"));
        assert!(template.ends_with("الإجابة:"));
    }

    #[test]
    fn test_unknown_format_rejected() {
        let dir = TempDir::new().unwrap();
        let body = "[corpus]\npath = \"c.csv\"\n[index]\npath = \"e.pt\"\n";
        assert!(load_config(&write(&dir, body)).is_err());
    }
}
