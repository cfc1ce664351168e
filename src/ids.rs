//! Opaque stable identifiers for the data model (§3).

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;

macro_rules! opaque_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}{}", $prefix, uuid::Uuid::new_v4()))
            }

            pub fn from_raw(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

opaque_id!(PaperId, "paper_");
opaque_id!(CardId, "card_");
opaque_id!(ClaimId, "claim_");
opaque_id!(SessionId, "sess_");

/// Evidence span ids are deterministic, not random: `{paper_id}#{8 hex of SHA1(snippet)}` (§3).
///
/// Re-running extraction on the same paper text with the same snippet must
/// reproduce the same id (§8 round-trip law), so this is a pure function of
/// its inputs rather than a `new()` constructor.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpanId(pub String);

impl SpanId {
    pub const MAX_SNIPPET_CHARS: usize = 300;

    /// Truncates `snippet` to [`Self::MAX_SNIPPET_CHARS`] *before* hashing, per §3's
    /// invariant that over-length snippets are truncated prior to id derivation.
    pub fn derive(paper_id: &PaperId, snippet: &str) -> (Self, String) {
        let truncated = truncate_chars(snippet, Self::MAX_SNIPPET_CHARS);
        let digest = Sha1::digest(truncated.as_bytes());
        let hex = format!("{:x}", digest);
        let short = &hex[..8];
        (Self(format!("{}#{}", paper_id.as_str(), short)), truncated)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_id_is_deterministic() {
        let paper = PaperId::from_raw("paper_abc");
        let (id1, _) = SpanId::derive(&paper, "we use a 12-layer encoder");
        let (id2, _) = SpanId::derive(&paper, "we use a 12-layer encoder");
        assert_eq!(id1, id2);
        assert!(id1.as_str().starts_with("paper_abc#"));
        assert_eq!(id1.as_str().len(), "paper_abc#".len() + 8);
    }

    #[test]
    fn span_id_truncates_long_snippets_before_hashing() {
        let paper = PaperId::from_raw("p1");
        let long = "x".repeat(400);
        let (id, truncated) = SpanId::derive(&paper, &long);
        assert_eq!(truncated.chars().count(), SpanId::MAX_SNIPPET_CHARS);
        let (id2, _) = SpanId::derive(&paper, &"x".repeat(SpanId::MAX_SNIPPET_CHARS));
        assert_eq!(id, id2);
    }
}
