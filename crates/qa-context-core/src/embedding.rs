//! Query encoder trait and vector utilities.
//!
//! Defines the [`QueryEncoder`] trait that every embedding backend
//! implements, plus helpers for the raw little-endian `f32` index format.
//!
//! Concrete encoders (fastembed, tract, Ollama, OpenAI) live in the
//! `qa-context` app crate.

use anyhow::Result;
use async_trait::async_trait;

/// Maps text into the vector space the embedding index was built in.
///
/// Implementations must be deterministic for a fixed model and input and
/// must not normalize beyond what the underlying model does itself.
/// Callers guarantee `text` is non-empty.
#[async_trait]
pub trait QueryEncoder: Send + Sync {
    /// Returns the model identifier (e.g. `"multilingual-e5-small"`).
    fn model_name(&self) -> &str;

    /// Returns the vector dimensionality, or `0` if the backend does not know it up front.
    fn dims(&self) -> usize;

    /// Embed a single text.
    async fn encode(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, preserving input order.
    ///
    /// The default implementation calls [`encode`](QueryEncoder::encode)
    /// once per text; backends with native batching override it.
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.encode(t).await?);
        }
        Ok(out)
    }
}

/// Encode a float vector as little-endian `f32` bytes.
///
/// # Example
///
/// ```rust
/// use qa_context_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian `f32` bytes. Trailing bytes that do not form a
/// whole value are ignored; callers check the length first.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Decode little-endian `f64` bytes, narrowing to `f32`.
pub fn blob_f64_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(8)
        .map(|chunk| {
            let mut b = [0u8; 8];
            b.copy_from_slice(chunk);
            f64::from_le_bytes(b) as f32
        })
        .collect()
}
