//! Per-phase postcondition checks (§4.1: "a phase fails if it violates its
//! postcondition").

use crate::model::Session;

/// §8: "zero papers collected: pipeline must terminate cleanly in COMPLETE
/// (QUICK) or FAILED with cause empty_corpus (FULL)."
pub fn empty_corpus_is_fatal(session: &Session) -> bool {
    matches!(session.mode, crate::config::Mode::Full) && session.paper_ids.is_empty()
}
