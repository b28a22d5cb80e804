//! Precomputed `N × D` embedding matrix, row-aligned with the corpus.

use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::error::{Result, RetrievalError};

/// Dense embedding matrix with one row per corpus record.
///
/// Row L2 norms are computed once at construction. Norms and dot products
/// are accumulated in `f64` so very small or very large finite vectors
/// still score by direction alone.
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    matrix: Array2<f32>,
    norms: Array1<f64>,
}

impl EmbeddingIndex {
    /// Build from an owned matrix. Rejects empty shapes and non-finite values.
    pub fn from_matrix(matrix: Array2<f32>) -> Result<Self> {
        let (rows, dims) = matrix.dim();
        if rows == 0 || dims == 0 {
            return Err(RetrievalError::Load(format!(
                "embedding index has degenerate shape {}x{}",
                rows, dims
            )));
        }
        if let Some(pos) = matrix.iter().position(|v| !v.is_finite()) {
            return Err(RetrievalError::Load(format!(
                "embedding index contains a non-finite value at row {}",
                pos / dims
            )));
        }
        let norms = matrix.map_axis(Axis(1), |row| l2_norm(row.iter().copied()));
        if let Some(pos) = norms.iter().position(|n| !n.is_finite()) {
            return Err(RetrievalError::Load(format!(
                "embedding index row {} has a non-finite norm",
                pos
            )));
        }
        Ok(Self { matrix, norms })
    }

    /// Build from a row-major flat buffer of `rows × dims` values.
    pub fn from_flat(data: Vec<f32>, dims: usize) -> Result<Self> {
        if dims == 0 {
            return Err(RetrievalError::Load("embedding dims must be > 0".into()));
        }
        if data.len() % dims != 0 {
            return Err(RetrievalError::Load(format!(
                "embedding buffer of {} values is not a multiple of dims {}",
                data.len(),
                dims
            )));
        }
        let rows = data.len() / dims;
        let matrix = Array2::from_shape_vec((rows, dims), data)
            .map_err(|e| RetrievalError::Load(format!("embedding shape: {}", e)))?;
        Self::from_matrix(matrix)
    }

    /// Build from one vector per row. All rows must share a length.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let dims = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some((i, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != dims) {
            return Err(RetrievalError::Load(format!(
                "embedding row {} has {} dims, expected {}",
                i,
                r.len(),
                dims
            )));
        }
        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        Self::from_flat(flat, dims)
    }

    /// Number of rows (`N`).
    pub fn len(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.nrows() == 0
    }

    /// Embedding dimensionality (`D`).
    pub fn dims(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn row(&self, index: usize) -> Option<ArrayView1<'_, f32>> {
        (index < self.len()).then(|| self.matrix.row(index))
    }

    pub fn matrix(&self) -> &Array2<f32> {
        &self.matrix
    }

    /// Cosine similarity between `query` and every row, in row order.
    ///
    /// A zero-norm row (or a zero-norm query) scores `0.0`. Results are
    /// clamped to `[-1.0, 1.0]`.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::DimensionMismatch`] if `query.len() != dims`.
    /// - [`RetrievalError::Encoding`] if the query has a non-finite value or norm.
    pub fn cosine_all(&self, query: &[f32]) -> Result<Vec<f32>> {
        if query.len() != self.dims() {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dims(),
                actual: query.len(),
            });
        }
        let q_norm = l2_norm(query.iter().copied());
        if !q_norm.is_finite() {
            return Err(RetrievalError::Encoding(
                "query vector has a non-finite norm".into(),
            ));
        }

        Ok(self
            .matrix
            .rows()
            .into_iter()
            .zip(self.norms.iter())
            .map(|(row, &norm)| {
                if norm == 0.0 || q_norm == 0.0 {
                    return 0.0;
                }
                let dot: f64 = row
                    .iter()
                    .zip(query)
                    .map(|(&a, &b)| f64::from(a) * f64::from(b))
                    .sum();
                (dot / (norm * q_norm)).clamp(-1.0, 1.0) as f32
            })
            .collect())
    }
}

fn l2_norm(values: impl Iterator<Item = f32>) -> f64 {
    values.map(|v| f64::from(v) * f64::from(v)).sum::<f64>().sqrt()
}
