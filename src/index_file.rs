//! Embedding index files.
//!
//! Two layouts are supported:
//!
//! | Format | Layout |
//! |--------|--------|
//! | `safetensors` | One 2-D `F32` (or `F64`) tensor, plus optional header metadata |
//! | `raw-f32` | Little-endian `f32` stream, row-major; dims come from config |
//!
//! Indexes written by `qactx index build` carry this metadata:
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `model` | Embedding model used to build the rows |
//! | `dims` | Row width |
//! | `rows` | Row count |
//! | `corpus_sha256` | [`CorpusStore::fingerprint`] of the corpus the rows were built from |
//!
//! A `corpus_sha256` that disagrees with the loaded corpus is a load
//! failure, and so is a `rows` or `dims` value that disagrees with the
//! tensor shape. A `model` mismatch is only logged, since the configured model
//! name may be an alias.

use anyhow::{anyhow, bail, Context, Result};
use qa_context_core::corpus::CorpusStore;
use qa_context_core::embedding::{blob_f64_to_vec, blob_to_vec, vec_to_blob};
use qa_context_core::index::EmbeddingIndex;
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use std::collections::HashMap;
use std::path::Path;

use crate::config::{IndexConfig, IndexFormat};

pub const META_MODEL: &str = "model";
pub const META_DIMS: &str = "dims";
pub const META_ROWS: &str = "rows";
pub const META_CORPUS_SHA256: &str = "corpus_sha256";

/// What the loader checks the index against.
#[derive(Debug, Clone, Copy)]
pub struct IndexExpectations<'a> {
    /// Row width, required for `raw-f32`.
    pub dims: Option<usize>,
    /// Fingerprint of the loaded corpus.
    pub corpus_fingerprint: Option<&'a str>,
    /// Configured embedding model name.
    pub model: Option<&'a str>,
}

/// Load the index described by `config`.
pub fn load_index(config: &IndexConfig, expect: IndexExpectations<'_>) -> Result<EmbeddingIndex> {
    let path = &config.path;
    if !path.exists() {
        bail!("Embedding index not found: {}", path.display());
    }
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read embedding index: {}", path.display()))?;

    let index = match config.resolved_format()? {
        IndexFormat::Safetensors => read_safetensors(&bytes, &config.tensor, expect)?,
        IndexFormat::RawF32 => {
            let dims = expect
                .dims
                .filter(|d| *d > 0)
                .context("embedding.dims is required for a raw-f32 index")?;
            read_raw_f32(&bytes, dims)?
        }
    };

    tracing::info!(
        rows = index.len(),
        dims = index.dims(),
        path = %path.display(),
        "embedding index loaded"
    );
    Ok(index)
}

/// Decode a raw little-endian `f32` buffer of `rows × dims` values.
pub fn read_raw_f32(bytes: &[u8], dims: usize) -> Result<EmbeddingIndex> {
    let row_bytes = dims * 4;
    if bytes.is_empty() || bytes.len() % row_bytes != 0 {
        bail!(
            "raw-f32 index is {} bytes, not a positive multiple of {} (dims {} x 4)",
            bytes.len(),
            row_bytes,
            dims
        );
    }
    Ok(EmbeddingIndex::from_flat(blob_to_vec(bytes), dims)?)
}

/// Decode a safetensors buffer and check its metadata.
pub fn read_safetensors(
    bytes: &[u8],
    tensor_name: &str,
    expect: IndexExpectations<'_>,
) -> Result<EmbeddingIndex> {
    let (_, header) = SafeTensors::read_metadata(bytes)
        .map_err(|e| anyhow!("Invalid safetensors header: {:?}", e))?;
    let st = SafeTensors::deserialize(bytes)
        .map_err(|e| anyhow!("Invalid safetensors file: {:?}", e))?;

    let names = st.names();
    let name = if names.iter().any(|n| n.as_str() == tensor_name) {
        tensor_name.to_string()
    } else if names.len() == 1 {
        names[0].to_string()
    } else {
        bail!(
            "safetensors file has no tensor '{}' (found: {})",
            tensor_name,
            names
                .iter()
                .map(|n| n.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    };

    let view = st
        .tensor(&name)
        .map_err(|e| anyhow!("Cannot read tensor '{}': {:?}", name, e))?;

    let shape = view.shape();
    if shape.len() != 2 {
        bail!(
            "tensor '{}' must be 2-D (rows x dims), got shape {:?}",
            name,
            shape
        );
    }
    let (rows, dims) = (shape[0], shape[1]);

    let values = match view.dtype() {
        Dtype::F32 => blob_to_vec(view.data()),
        Dtype::F64 => blob_f64_to_vec(view.data()),
        other => bail!(
            "tensor '{}' has dtype {:?}; expected F32 or F64",
            name,
            other
        ),
    };

    if let Some(meta) = header.metadata() {
        check_metadata(meta, expect, rows, dims)?;
    }

    Ok(EmbeddingIndex::from_flat(values, dims)?)
}

fn check_metadata(
    meta: &HashMap<String, String>,
    expect: IndexExpectations<'_>,
    rows: usize,
    dims: usize,
) -> Result<()> {
    for (key, actual) in [(META_ROWS, rows), (META_DIMS, dims)] {
        if let Some(stored) = meta.get(key) {
            let stored: usize = stored
                .trim()
                .parse()
                .with_context(|| format!("index metadata '{}' is not a number: {}", key, stored))?;
            if stored != actual {
                bail!(
                    "index metadata says {} {} but the tensor has {}",
                    key,
                    stored,
                    actual
                );
            }
        }
    }
    if let (Some(stored), Some(actual)) = (meta.get(META_CORPUS_SHA256), expect.corpus_fingerprint)
    {
        if stored != actual {
            bail!(
                "embedding index was built from a different corpus \
                 (index corpus_sha256 {}, loaded corpus {}); rebuild with `qactx index build`",
                stored,
                actual
            );
        }
    }
    if let (Some(stored), Some(configured)) = (meta.get(META_MODEL), expect.model) {
        if stored != configured {
            tracing::warn!(
                index_model = %stored,
                configured_model = %configured,
                "embedding index was built with a different model name"
            );
        }
    }
    Ok(())
}

/// Serialize rows to safetensors bytes with build metadata.
pub fn encode_safetensors(
    rows: &[Vec<f32>],
    tensor_name: &str,
    model: &str,
    corpus: &CorpusStore,
) -> Result<Vec<u8>> {
    let dims = rows.first().map(|r| r.len()).unwrap_or(0);
    if dims == 0 {
        bail!("cannot write an empty embedding index");
    }
    if let Some((i, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != dims) {
        bail!("embedding row {} has {} dims, expected {}", i, r.len(), dims);
    }

    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    let data = vec_to_blob(&flat);
    let view = TensorView::new(Dtype::F32, vec![rows.len(), dims], &data)
        .map_err(|e| anyhow!("Invalid tensor shape: {:?}", e))?;

    let mut meta = HashMap::new();
    meta.insert(META_MODEL.to_string(), model.to_string());
    meta.insert(META_DIMS.to_string(), dims.to_string());
    meta.insert(META_ROWS.to_string(), rows.len().to_string());
    meta.insert(META_CORPUS_SHA256.to_string(), corpus.fingerprint());

    safetensors::serialize([(tensor_name, view)], &Some(meta))
        .map_err(|e| anyhow!("Failed to serialize embedding index: {:?}", e))
}

/// Write rows to `path` as a safetensors index.
pub fn write_safetensors(
    path: &Path,
    rows: &[Vec<f32>],
    tensor_name: &str,
    model: &str,
    corpus: &CorpusStore,
) -> Result<()> {
    let bytes = encode_safetensors(rows, tensor_name, model, corpus)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, bytes)
        .with_context(|| format!("Failed to write embedding index: {}", path.display()))?;
    Ok(())
}
