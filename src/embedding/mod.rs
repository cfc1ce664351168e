//! Embedding capability (§6): deterministic fixed-dimension vectors, an
//! external collaborator the clusterer consumes. Out of scope per §1
//! ("clustering embedding model choice"), but the narrow interface and a
//! Gemini-backed implementation belong to the ambient stack the same way
//! the LLM client does.

pub mod gemini;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("transient embedding failure: {0}")]
    Transient(String),
    #[error("permanent embedding failure: {0}")]
    Permanent(String),
}

impl From<EmbeddingError> for crate::error::PipelineError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::Transient(msg) => crate::error::TransientError::Transport(msg).into(),
            EmbeddingError::Permanent(msg) => crate::error::PermanentError::Malformed(msg).into(),
        }
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Cosine similarity between two equal-length vectors, hand-rolled rather
/// than pulled from a dot-product crate (see DESIGN.md).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn zero_vector_yields_zero_similarity_without_dividing_by_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
