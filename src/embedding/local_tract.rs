//! Tract-based local embedding (fallback for musl and Intel Mac).
//!
//! Pure-Rust path: loads the ONNX model with tract-onnx and tokenizes with
//! the tokenizers crate. No ONNX Runtime or system deps.
#![cfg_attr(
    all(feature = "local-embeddings-fastembed", feature = "local-embeddings-tract"),
    allow(dead_code)
)]

use anyhow::{anyhow, bail, Result};
use std::path::{Path, PathBuf};
use tract_onnx::prelude::*;

const DEFAULT_MAX_LEN: usize = 256;

type RunFn = Box<dyn Fn(TVec<TValue>) -> TractResult<TVec<TValue>> + Send + Sync>;

/// Model manifest: name -> (HF repo, onnx path in repo, tokenizer path in repo, dims).
fn model_manifest(model_name: &str) -> Result<(&'static str, &'static str, &'static str, usize)> {
    match model_name {
        "all-minilm-l6-v2" => Ok((
            "sentence-transformers/all-MiniLM-L6-v2",
            "onnx/model.onnx",
            "tokenizer.json",
            384,
        )),
        "multilingual-e5-small" => Ok((
            "intfloat/multilingual-e5-small",
            "onnx/model.onnx",
            "tokenizer.json",
            384,
        )),
        "paraphrase-multilingual-minilm-l12-v2" => Ok((
            "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2",
            "onnx/model.onnx",
            "tokenizer.json",
            384,
        )),
        _ => bail!(
            "Tract backend supports all-minilm-l6-v2, multilingual-e5-small, and \
             paraphrase-multilingual-minilm-l12-v2. Requested: '{}'",
            model_name
        ),
    }
}

fn cache_dir() -> Result<PathBuf> {
    let base = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let dir = PathBuf::from(base)
        .join(".cache")
        .join("qa-context")
        .join("models");
    std::fs::create_dir_all(&dir).map_err(|e| anyhow!("Create cache dir: {}", e))?;
    Ok(dir)
}

fn download_to_cache(repo: &str, path: &str, cache_path: &Path) -> Result<()> {
    if cache_path.exists() {
        return Ok(());
    }
    let url = format!(
        "https://huggingface.co/{}/resolve/main/{}",
        repo,
        path.replace(' ', "%20")
    );
    tracing::info!(%url, "downloading model file");
    let resp = reqwest::blocking::get(&url)
        .map_err(|e| anyhow!("Download {}: {}", url, e))?
        .error_for_status()
        .map_err(|e| anyhow!("Download {}: {}", url, e))?;
    let bytes = resp.bytes().map_err(|e| anyhow!("Read body: {}", e))?;
    if let Some(parent) = cache_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| anyhow!("Create cache parent: {}", e))?;
    }
    std::fs::write(cache_path, &bytes).map_err(|e| anyhow!("Write cache: {}", e))?;
    Ok(())
}

/// A loaded ONNX sentence encoder plus its tokenizer.
pub struct TractModel {
    tokenizer: tokenizers::Tokenizer,
    run: RunFn,
    dims: usize,
}

impl TractModel {
    /// Download (first run) and load `model_name`. Blocking.
    pub fn load(model_name: &str) -> Result<Self> {
        let (repo, onnx_rel, tokenizer_rel, dims) = model_manifest(model_name)?;
        let model_dir = cache_dir()?.join(model_name);
        let onnx_path = model_dir.join(onnx_rel);
        let tokenizer_path = model_dir.join(tokenizer_rel);
        download_to_cache(repo, onnx_rel, &onnx_path)?;
        download_to_cache(repo, tokenizer_rel, &tokenizer_path)?;

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Load tokenizer: {}", e))?;

        let plan = tract_onnx::onnx()
            .model_for_path(&onnx_path)
            .map_err(|e| anyhow!("Load ONNX: {}", e))?
            .into_optimized()
            .map_err(|e| anyhow!("Optimize: {}", e))?
            .into_runnable()
            .map_err(|e| anyhow!("Build tract runnable: {}", e))?;

        Ok(Self {
            tokenizer,
            run: Box::new(move |inputs| plan.run(inputs)),
            dims,
        })
    }

    /// Embed `texts` in batches of `batch_size`, mean-pooled and L2-normalized.
    pub fn embed(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(batch_size.max(1)) {
            let encodings = chunk
                .iter()
                .map(|s| {
                    self.tokenizer
                        .encode(s.as_str(), true)
                        .map_err(|e| anyhow!("Tokenize: {}", e))
                })
                .collect::<Result<Vec<_>>>()?;

            let max_len = encodings
                .iter()
                .map(|e| e.get_ids().len())
                .max()
                .unwrap_or(1)
                .clamp(1, DEFAULT_MAX_LEN);

            let rows = encodings.len();
            let mut input_ids = vec![0i64; rows * max_len];
            let mut attention_mask = vec![0i64; rows * max_len];

            for (i, enc) in encodings.iter().enumerate() {
                for (j, &id) in enc.get_ids().iter().take(max_len).enumerate() {
                    input_ids[i * max_len + j] = id as i64;
                    attention_mask[i * max_len + j] = 1;
                }
            }

            let input_ids_t: Tensor = ndarray::Array2::from_shape_vec((rows, max_len), input_ids)
                .map_err(|e| anyhow!("Input ids shape: {}", e))?
                .into();
            let attention_mask_t: Tensor =
                ndarray::Array2::from_shape_vec((rows, max_len), attention_mask)
                    .map_err(|e| anyhow!("Attention mask shape: {}", e))?
                    .into();

            let result = (self.run)(tvec!(input_ids_t.into(), attention_mask_t.into()))?;
            let output = result
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("No output tensor"))?;
            let view = output
                .to_array_view::<f32>()
                .map_err(|e| anyhow!("Output to array: {}", e))?;

            // [batch, dims] is already pooled; [batch, seq, dims] is last_hidden_state.
            let shape = view.shape().to_vec();
            match shape.len() {
                2 => {
                    for i in 0..shape[0] {
                        let row: Vec<f32> = view.slice(ndarray::s![i, ..]).iter().copied().collect();
                        all_embeddings.push(normalize_l2(row));
                    }
                }
                3 => {
                    let seq_len = shape[1];
                    for (i, enc) in encodings.iter().enumerate() {
                        let valid_len = enc.get_ids().len().min(seq_len).min(max_len);
                        let mut sum = vec![0f32; self.dims];
                        for j in 0..valid_len {
                            for (k, &v) in view.slice(ndarray::s![i, j, ..]).iter().enumerate() {
                                if k < self.dims {
                                    sum[k] += v;
                                }
                            }
                        }
                        if valid_len > 0 {
                            for x in &mut sum {
                                *x /= valid_len as f32;
                            }
                        }
                        all_embeddings.push(normalize_l2(sum));
                    }
                }
                _ => bail!("Unexpected output shape: {:?}", shape),
            }
        }

        Ok(all_embeddings)
    }
}

fn normalize_l2(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-9 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}
