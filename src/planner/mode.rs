//! QUICK/FULL mode selection heuristics (§4.2).

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Quick,
    Full,
}

impl From<Mode> for crate::config::Mode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Quick => crate::config::Mode::Quick,
            Mode::Full => crate::config::Mode::Full,
        }
    }
}

const QUICK_MARKERS: &[&str] = &["quick", "just find", "briefly", "fast"];
const FULL_MARKERS: &[&str] = &["comprehensive", "survey", "deep dive", "thorough"];

/// Surface heuristics on the topic text (§4.2); default FULL when no
/// marker matches.
pub fn infer_mode(topic: &str, configured: Option<crate::config::Mode>) -> Mode {
    if let Some(configured) = configured {
        return match configured {
            crate::config::Mode::Quick => Mode::Quick,
            crate::config::Mode::Full => Mode::Full,
        };
    }
    let lower = topic.to_lowercase();
    if QUICK_MARKERS.iter().any(|m| lower.contains(m)) {
        return Mode::Quick;
    }
    if FULL_MARKERS.iter().any(|m| lower.contains(m)) {
        return Mode::Full;
    }
    Mode::Full
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quick_marker_selects_quick_mode() {
        assert_eq!(infer_mode("just find papers on attention", None), Mode::Quick);
    }

    #[test]
    fn full_marker_selects_full_mode() {
        assert_eq!(infer_mode("a comprehensive survey of transformers", None), Mode::Full);
    }

    #[test]
    fn default_with_no_marker_is_full() {
        assert_eq!(infer_mode("transformer architectures", None), Mode::Full);
    }

    #[test]
    fn explicit_configuration_overrides_heuristics() {
        assert_eq!(
            infer_mode("a comprehensive survey", Some(crate::config::Mode::Quick)),
            Mode::Quick
        );
    }
}
