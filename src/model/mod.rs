//! The data model (§3): entities shared by every pipeline stage.
//!
//! Ids are opaque strings (`crate::ids`); cross-entity references are by id,
//! never by pointer, so the whole graph stays a DAG that is trivial to
//! persist (§9 "Cyclic graphs").

pub mod claim;
pub mod evidence;
pub mod paper;
pub mod plan;
pub mod report;
pub mod screening;
pub mod session;
pub mod study_card;
pub mod taxonomy;

pub use claim::Claim;
pub use evidence::{EvidenceSpan, FieldTag, Locator};
pub use paper::{Paper, PageMapEntry, PaperStatus, SourceTag};
pub use plan::{Plan, PlanStep, StepAction};
pub use report::Report;
pub use screening::{ReasonCode, ScreeningRecord, Tier};
pub use session::{Session, TerminationCause};
pub use study_card::StudyCard;
pub use taxonomy::TaxonomyMatrix;

use serde::{Deserialize, Serialize};

/// The totally ordered phase sequence of §4.1. FULL mode visits every
/// variant in declaration order; QUICK mode visits only the prefix
/// `Planning, Collection, Dedup, Persist` before jumping to `Complete`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Planning,
    Collection,
    Dedup,
    Persist,
    Screening,
    GatePdf,
    PdfLoading,
    EvidenceExtraction,
    Clustering,
    Taxonomy,
    ClaimGeneration,
    GapMining,
    GroundedWriting,
    CitationAudit,
    Publish,
    Complete,
    /// Terminal; not part of the ordered sequence proper. Carries no data
    /// itself — the failure cause lives on `Session::termination`.
    Failed,
}

impl Phase {
    /// The FULL-mode sequence, in order, `Idle` through `Complete`.
    pub const FULL_SEQUENCE: &'static [Phase] = &[
        Phase::Idle,
        Phase::Planning,
        Phase::Collection,
        Phase::Dedup,
        Phase::Persist,
        Phase::Screening,
        Phase::GatePdf,
        Phase::PdfLoading,
        Phase::EvidenceExtraction,
        Phase::Clustering,
        Phase::Taxonomy,
        Phase::ClaimGeneration,
        Phase::GapMining,
        Phase::GroundedWriting,
        Phase::CitationAudit,
        Phase::Publish,
        Phase::Complete,
    ];

    /// The abbreviated QUICK-mode sequence of §4.1.
    pub const QUICK_SEQUENCE: &'static [Phase] = &[
        Phase::Idle,
        Phase::Planning,
        Phase::Collection,
        Phase::Dedup,
        Phase::Persist,
        Phase::Complete,
    ];

    pub fn sequence_for(mode: crate::config::Mode) -> &'static [Phase] {
        match mode {
            crate::config::Mode::Quick => Self::QUICK_SEQUENCE,
            crate::config::Mode::Full => Self::FULL_SEQUENCE,
        }
    }

    /// The phase immediately following `self` in `sequence`, if any.
    pub fn next_in(self, sequence: &[Phase]) -> Option<Phase> {
        let idx = sequence.iter().position(|&p| p == self)?;
        sequence.get(idx + 1).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;

    #[test]
    fn quick_sequence_is_a_prefix_style_subset_of_full() {
        for phase in Phase::QUICK_SEQUENCE {
            if *phase == Phase::Complete {
                continue;
            }
            assert!(Phase::FULL_SEQUENCE.contains(phase));
        }
    }

    #[test]
    fn next_in_walks_the_declared_order() {
        let seq = Phase::sequence_for(Mode::Quick);
        assert_eq!(Phase::Planning.next_in(seq), Some(Phase::Collection));
        assert_eq!(Phase::Complete.next_in(seq), None);
    }
}
