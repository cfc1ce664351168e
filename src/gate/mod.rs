//! Approval-gate manager (§4.13): pauses execution pending an external
//! decision.

use crate::model::session::GateKind;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Hosts the pipeline's own source clients and PDF loader already talk to
/// (§4.3): any other host reached by an included paper's landing or PDF
/// URL trips the `external_crawl` gate.
pub const KNOWN_SAFE_HOSTS: &[&str] = &[
    "arxiv.org",
    "export.arxiv.org",
    "openalex.org",
    "api.openalex.org",
    "huggingface.co",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateDecision {
    Approve,
    Skip,
    Cancel,
}

/// §4.13: a decision timeout is equivalent to cancel unless auto-approve is
/// configured.
pub fn decision_on_timeout(auto_approve: bool) -> GateDecision {
    if auto_approve {
        GateDecision::Approve
    } else {
        GateDecision::Cancel
    }
}

pub struct GateManager {
    gate_timeout_seconds: u64,
    gate_auto_approve: bool,
}

impl GateManager {
    pub fn new(gate_timeout_seconds: u64, gate_auto_approve: bool) -> Self {
        Self {
            gate_timeout_seconds,
            gate_auto_approve,
        }
    }

    /// §4.13's pdf_download predicate: included-paper count × expected
    /// per-paper download cost exceeds `threshold`.
    pub fn pdf_download_triggered(&self, included_count: usize, expected_bytes_per_pdf: u64, threshold: u64) -> bool {
        (included_count as u64) * expected_bytes_per_pdf > threshold
    }

    pub fn external_crawl_triggered(&self, hosts: &[String], known_safe: &[&str]) -> bool {
        hosts.iter().any(|host| !known_safe.contains(&host.as_str()))
    }

    pub fn token_budget_triggered(&self, projected_remaining_use: u64, budget_remaining: u64) -> bool {
        projected_remaining_use > budget_remaining
    }

    pub fn context_for(&self, gate: GateKind, details: serde_json::Value) -> serde_json::Value {
        json!({ "gate": format!("{gate:?}"), "details": details })
    }

    /// Waits for a decision on `rx`, or `decision_on_timeout` if none
    /// arrives within the configured window (§4.13, §5).
    pub async fn await_decision(
        &self,
        rx: tokio::sync::oneshot::Receiver<GateDecision>,
    ) -> GateDecision {
        let timeout = tokio::time::Duration::from_secs(self.gate_timeout_seconds);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(_)) | Err(_) => decision_on_timeout(self.gate_auto_approve),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_without_auto_approve_cancels() {
        assert_eq!(decision_on_timeout(false), GateDecision::Cancel);
    }

    #[test]
    fn timeout_with_auto_approve_approves() {
        assert_eq!(decision_on_timeout(true), GateDecision::Approve);
    }

    #[test]
    fn pdf_download_gate_triggers_above_threshold() {
        let manager = GateManager::new(3600, false);
        assert!(manager.pdf_download_triggered(40, 1, 15));
        assert!(!manager.pdf_download_triggered(10, 1, 15));
    }

    #[test]
    fn external_crawl_gate_triggers_on_unsafe_host() {
        let manager = GateManager::new(3600, false);
        let hosts = vec!["arxiv.org".to_string(), "sketchy-mirror.example".to_string()];
        assert!(manager.external_crawl_triggered(&hosts, KNOWN_SAFE_HOSTS));
        assert!(!manager.external_crawl_triggered(&["arxiv.org".to_string()], KNOWN_SAFE_HOSTS));
    }

    #[test]
    fn token_budget_gate_triggers_when_projection_exceeds_remaining() {
        let manager = GateManager::new(3600, false);
        assert!(manager.token_budget_triggered(5_000, 1_000));
        assert!(!manager.token_budget_triggered(500, 1_000));
    }

    #[tokio::test]
    async fn await_decision_returns_timeout_cancel_when_sender_dropped() {
        let manager = GateManager::new(0, false);
        let (tx, rx) = tokio::sync::oneshot::channel();
        drop(tx);
        assert_eq!(manager.await_decision(rx).await, GateDecision::Cancel);
    }
}
