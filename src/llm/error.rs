//! LLM-specific errors, collapsing to the two kinds §6 promises callers:
//! `LLMTransient` (retryable) and `LLMPermanent` (do not retry).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("transient LLM failure: {0}")]
    Transient(String),
    #[error("permanent LLM failure: {0}")]
    Permanent(String),
    #[error("response did not conform to the requested schema: {0}")]
    SchemaMismatch(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Transient(_))
    }
}

impl From<LlmError> for crate::error::PipelineError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Transient(msg) => {
                crate::error::TransientError::Transport(msg).into()
            }
            LlmError::Permanent(msg) => {
                crate::error::PermanentError::Malformed(msg).into()
            }
            LlmError::SchemaMismatch(msg) => crate::error::ParseError(msg).into(),
        }
    }
}
