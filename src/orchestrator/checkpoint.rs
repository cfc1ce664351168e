//! Checkpointing (§4.1): advisory per-`(session, phase)` snapshots that let
//! `resume` restart from the next phase without redoing completed work.

use crate::cache::{self, ttl, Cache};
use crate::ids::{PaperId, SessionId, SpanId};
use crate::model::Phase;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Exactly the data required to restart the phase after the one that
/// produced this checkpoint (§4.1) — not a full session dump.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    pub paper_ids: Vec<PaperId>,
    pub screened_paper_ids: Vec<PaperId>,
    pub span_ids: Vec<SpanId>,
    pub cancelled: bool,
}

pub struct CheckpointStore {
    cache: Arc<dyn Cache>,
}

impl CheckpointStore {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    pub async fn write(&self, session: &SessionId, phase: Phase, checkpoint: &Checkpoint) {
        let key = cache::checkpoint_key(session.as_str(), &format!("{phase:?}"));
        if let Ok(encoded) = serde_json::to_vec(checkpoint) {
            self.cache.set(&key, encoded, ttl::checkpoint()).await;
        }
        // A write failure here is swallowed per §4.4; the orchestrator
        // simply has one fewer resumable checkpoint, not a failed phase.
    }

    /// Returns `None` on a cache miss or corrupt blob (§4.1: "checkpoints
    /// are advisory; if missing or corrupt, the orchestrator restarts from
    /// the previous available checkpoint").
    pub async fn read(&self, session: &SessionId, phase: Phase) -> Option<Checkpoint> {
        let key = cache::checkpoint_key(session.as_str(), &format!("{phase:?}"));
        let bytes = self.cache.get(&key).await?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn cancelled_checkpoint() -> Checkpoint {
        Checkpoint {
            cancelled: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCache;

    #[tokio::test]
    async fn checkpoint_round_trips() {
        let store = CheckpointStore::new(Arc::new(MemoryCache::new()));
        let session = SessionId::new();
        let checkpoint = Checkpoint {
            paper_ids: vec![PaperId::from_raw("p1")],
            ..Default::default()
        };
        store.write(&session, Phase::Collection, &checkpoint).await;
        let loaded = store.read(&session, Phase::Collection).await.unwrap();
        assert_eq!(loaded.paper_ids, checkpoint.paper_ids);
    }

    #[tokio::test]
    async fn missing_checkpoint_is_none_not_an_error() {
        let store = CheckpointStore::new(Arc::new(MemoryCache::new()));
        let session = SessionId::new();
        assert!(store.read(&session, Phase::Collection).await.is_none());
    }
}
