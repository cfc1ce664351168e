//! `Session` (§3): a research run, and the source of truth for resume.

use super::{Phase, Plan};
use crate::config::Mode;
use crate::ids::{PaperId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateKind {
    PdfDownload,
    ExternalCrawl,
    TokenBudget,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingApproval {
    pub gate: GateKind,
    pub context: serde_json::Value,
    pub raised_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationCause {
    Completed,
    Cancelled,
    Failed { phase: Phase, reason: String },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub writes_failed: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub topic: String,
    pub language: String,
    pub mode: Mode,
    pub phase: Phase,
    pub phase_history: Vec<Phase>,
    pub plan: Option<Plan>,
    pub paper_ids: Vec<PaperId>,
    pub cache_metrics: CacheMetrics,
    pub pending_approval: Option<PendingApproval>,
    pub termination: Option<TerminationCause>,
    pub created_at: DateTime<Utc>,
    /// Running count of tokens spent on LLM calls this session (§5), checked
    /// against `token_budget` before each call that would consume more.
    #[serde(default)]
    pub token_usage: u64,
}

impl Session {
    pub fn new(id: SessionId, topic: String, language: String, mode: Mode, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            topic,
            language,
            mode,
            phase: Phase::Idle,
            phase_history: vec![Phase::Idle],
            plan: None,
            paper_ids: Vec::new(),
            cache_metrics: CacheMetrics::default(),
            pending_approval: None,
            termination: None,
            created_at,
            token_usage: 0,
        }
    }

    /// Advances to `next`, recording it in history. Callers are expected to
    /// have already checked `next` is the phase after `self.phase` in the
    /// session's declared sequence.
    pub fn advance_to(&mut self, next: Phase) {
        self.phase = next;
        self.phase_history.push(next);
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        let phase = self.phase;
        self.termination = Some(TerminationCause::Failed {
            phase,
            reason: reason.into(),
        });
        self.phase = Phase::Failed;
        self.phase_history.push(Phase::Failed);
    }

    pub fn cancel(&mut self) {
        self.termination = Some(TerminationCause::Cancelled);
    }

    pub fn complete(&mut self) {
        self.termination = Some(TerminationCause::Completed);
    }

    /// §8 universal invariant: "the session's phase history is a prefix of
    /// the declared phase sequence for its mode" (allowing the terminal
    /// `Failed` state to follow any prefix).
    pub fn phase_history_is_valid_prefix(&self) -> bool {
        let sequence = Phase::sequence_for(self.mode);
        let mut history = self.phase_history.iter();
        for &expected in sequence {
            match history.next() {
                Some(&actual) if actual == expected => continue,
                Some(&Phase::Failed) => return history.next().is_none(),
                _ => return false,
            }
        }
        history.next().is_none()
    }
}
