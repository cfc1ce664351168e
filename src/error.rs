//! Top-level error type composing the six behavioral categories of §7.

use crate::model::Phase;
use thiserror::Error;

/// An external call failed transiently (rate limit, timeout, 5xx). Retried
/// locally up to 3 times with exponential backoff before surfacing here.
#[derive(Error, Debug)]
pub enum TransientError {
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
}

/// An external call failed permanently (malformed response, 4xx, blocked domain).
#[derive(Error, Debug)]
pub enum PermanentError {
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("client error {status}: {message}")]
    Client { status: u16, message: String },
    #[error("domain is blocked: {0}")]
    BlockedDomain(String),
}

/// An LLM call returned non-conforming JSON after the allotted retry.
#[derive(Error, Debug)]
#[error("could not parse structured output after retry: {0}")]
pub struct ParseError(pub String);

/// An internal invariant was broken. Never recovered locally; always a
/// terminal phase failure.
#[derive(Error, Debug)]
pub enum ContractViolation {
    #[error("claim {claim_id} references nonexistent span {span_id}")]
    DanglingSpanReference { claim_id: String, span_id: String },
    #[error("study card {card_id} references span {span_id} belonging to a different paper")]
    CrossPaperSpanReference { card_id: String, span_id: String },
    #[error("taxonomy cell references card {card_id} outside the included set")]
    TaxonomyCellOutOfScope { card_id: String },
    #[error("duplicate span id {0} produced by different snippets")]
    DuplicateSpanId(String),
    #[error("repository integrity violated: {0}")]
    RepositoryIntegrity(String),
}

/// Top-level pipeline error. Carries enough context for the orchestrator to
/// decide whether to degrade (item failure), gate (budget), or terminate
/// (contract violation / cancellation).
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Transient(#[from] TransientError),

    #[error(transparent)]
    Permanent(#[from] PermanentError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("contract violation: {0}")]
    Contract(#[from] ContractViolation),

    #[error("token budget exceeded in phase {phase:?}: used {used}, budget {budget}")]
    BudgetExceeded {
        phase: Phase,
        used: u64,
        budget: u64,
    },

    #[error("cancelled during phase {0:?}")]
    Cancelled(Phase),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Behavioral classification used by the orchestrator's propagation
    /// policy (§7): item failures degrade the session; only these two
    /// terminate it outright.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineError::Contract(_) | PipelineError::Repository(_)
        )
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, PipelineError::Cancelled(_))
    }
}
