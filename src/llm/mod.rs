//! LLM capability (§6, §9 "dynamic dispatch"): a narrow interface the
//! pipeline consumes, swapped via configuration, backed by a manual
//! JSON-over-`reqwest` REST client (no SDK).

pub mod error;
pub mod gemini;

pub use error::LlmError;

use async_trait::async_trait;
use futures::stream::BoxStream;

/// `generate` / `generate_stream` (§6). `generate_stream` returns a finite,
/// non-restartable lazy sequence of tokens (§9 "generators/iterators") —
/// callers must fully consume it or explicitly cancel.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str, system: Option<&str>, json_mode: bool) -> Result<String, LlmError>;

    async fn generate_stream<'a>(
        &'a self,
        prompt: &'a str,
        system: Option<&'a str>,
    ) -> Result<BoxStream<'a, Result<String, LlmError>>, LlmError>;
}

/// Rough token accounting used against `token_budget` (§5, §6): the
/// common heuristic of ~4 characters per token, good enough for a budget
/// estimate without pulling in a tokenizer crate.
pub fn estimate_tokens(text: &str) -> u64 {
    ((text.chars().count() as f64) / 4.0).ceil() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_is_roughly_proportional_to_length() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }
}
