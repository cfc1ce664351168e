//! Persistent store for papers, spans, cards, claims, and reports (§3, §6):
//! the same bundled-sqlite connection idiom as a single-table store, but
//! one table per collection plus a referential-integrity check across the
//! span/claim graph.

pub mod schema;
pub mod sqlite;

use crate::ids::{ClaimId, PaperId, SessionId, SpanId};
use crate::model::{Claim, EvidenceSpan, Report, ScreeningRecord, Session, StudyCard};
use async_trait::async_trait;

/// One operation set per entity kind (§6): "put, get_by_id, list_by_session,
/// update_status". Idempotent on `(session_id, entity_id)`.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn put_session(&self, session: &Session) -> crate::error::Result<()>;
    async fn get_session(&self, id: &SessionId) -> crate::error::Result<Option<Session>>;

    async fn put_paper_ref(&self, session: &SessionId, paper: &PaperId) -> crate::error::Result<()>;
    async fn list_papers(&self, session: &SessionId) -> crate::error::Result<Vec<PaperId>>;

    async fn put_screening_record(
        &self,
        session: &SessionId,
        record: &ScreeningRecord,
    ) -> crate::error::Result<()>;
    async fn list_screening_records(
        &self,
        session: &SessionId,
    ) -> crate::error::Result<Vec<ScreeningRecord>>;

    async fn put_evidence_span(
        &self,
        session: &SessionId,
        span: &EvidenceSpan,
    ) -> crate::error::Result<()>;
    async fn get_evidence_span(&self, id: &SpanId) -> crate::error::Result<Option<EvidenceSpan>>;
    async fn list_evidence_spans(
        &self,
        session: &SessionId,
    ) -> crate::error::Result<Vec<EvidenceSpan>>;

    async fn put_study_card(&self, session: &SessionId, card: &StudyCard) -> crate::error::Result<()>;
    async fn list_study_cards(&self, session: &SessionId) -> crate::error::Result<Vec<StudyCard>>;

    async fn put_claim(&self, session: &SessionId, claim: &Claim) -> crate::error::Result<()>;
    async fn get_claim(&self, id: &ClaimId) -> crate::error::Result<Option<Claim>>;
    async fn list_claims(&self, session: &SessionId) -> crate::error::Result<Vec<Claim>>;

    async fn put_report(&self, session: &SessionId, report: &Report) -> crate::error::Result<()>;
    async fn get_report(&self, session: &SessionId) -> crate::error::Result<Option<Report>>;

    /// §6: "every span-id referenced by a study card or claim must exist".
    /// Checked explicitly rather than relying on a foreign key, since spans,
    /// cards and claims are serialized as opaque blobs (see `schema`).
    async fn check_referential_integrity(&self, session: &SessionId) -> crate::error::Result<()> {
        let spans: std::collections::HashSet<SpanId> = self
            .list_evidence_spans(session)
            .await?
            .into_iter()
            .map(|s| s.span_id)
            .collect();

        for card in self.list_study_cards(session).await? {
            for span_id in &card.evidence_span_ids {
                if !spans.contains(span_id) {
                    return Err(crate::error::ContractViolation::DanglingSpanReference {
                        claim_id: card.paper_id.to_string(),
                        span_id: span_id.to_string(),
                    }
                    .into());
                }
            }
        }
        for claim in self.list_claims(session).await? {
            for span_id in &claim.evidence_span_ids {
                if !spans.contains(span_id) {
                    return Err(crate::error::ContractViolation::DanglingSpanReference {
                        claim_id: claim.id.to_string(),
                        span_id: span_id.to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}
