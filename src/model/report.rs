//! `Report` (§3): the final Markdown artifact.

use crate::ids::ClaimId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Report {
    pub content: String,
    pub referenced_claim_ids: Vec<ClaimId>,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

impl Report {
    /// Every `[C<claim_id>]` citation in the body must resolve to a claim
    /// the writer actually cited (§4.11, S1's end-to-end check).
    pub fn all_citations_resolve(&self) -> bool {
        self.referenced_claim_ids.iter().all(|id| {
            self.content.contains(&format!("[C{id}]"))
        })
    }
}
