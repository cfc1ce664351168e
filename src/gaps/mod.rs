//! Gap miner (§4.10): future-research directions from limitations and
//! taxonomy holes/contradictions.

use crate::clustering::taxonomy::Contradiction;
use crate::ids::{CardId, SpanId};
use crate::model::EvidenceSpan;
use serde::Serialize;
use std::collections::HashMap;

pub const MAX_DIRECTIONS: usize = 10;

#[derive(Clone, Debug, Serialize)]
pub struct GapDirection {
    pub text: String,
    pub citing_span_ids: Vec<SpanId>,
    /// `frequency * cluster_size`, the §4.10 ranking key.
    pub rank_score: f64,
}

pub struct GapMiner;

impl GapMiner {
    /// Source 1: top-K most frequently mentioned limitation spans.
    /// `limitation_spans_by_card` groups limitation spans per card so
    /// frequency can be weighted by how many distinct cards raise the
    /// same limitation text.
    pub fn from_limitations(
        limitation_spans: &[(CardId, EvidenceSpan)],
        cluster_size_by_card: &HashMap<CardId, usize>,
    ) -> Vec<GapDirection> {
        let mut grouped: HashMap<String, Vec<(CardId, SpanId)>> = HashMap::new();
        for (card_id, span) in limitation_spans {
            grouped
                .entry(span.snippet.clone())
                .or_default()
                .push((card_id.clone(), span.span_id.clone()));
        }

        grouped
            .into_iter()
            .map(|(text, occurrences)| {
                let frequency = occurrences.len() as f64;
                let cluster_size = occurrences
                    .iter()
                    .filter_map(|(card_id, _)| cluster_size_by_card.get(card_id))
                    .max()
                    .copied()
                    .unwrap_or(1) as f64;
                GapDirection {
                    text,
                    citing_span_ids: occurrences.into_iter().map(|(_, span_id)| span_id).collect(),
                    rank_score: frequency * cluster_size,
                }
            })
            .collect()
    }

    /// Source 2: taxonomy holes, each phrased as a direction. Holes carry
    /// no evidence span by construction, so they are only emitted when at
    /// least one limitation span from the same theme can anchor the
    /// citation requirement (§4.10: "each produced direction must cite at
    /// least one evidence span").
    pub fn from_holes(
        holes: &[(String, String)],
        anchor_span_by_theme: &HashMap<String, SpanId>,
    ) -> Vec<GapDirection> {
        holes
            .iter()
            .filter_map(|(theme, dimension)| {
                let anchor = anchor_span_by_theme.get(theme)?;
                Some(GapDirection {
                    text: format!("No reported results for {dimension} within the \"{theme}\" theme"),
                    citing_span_ids: vec![anchor.clone()],
                    rank_score: 1.0,
                })
            })
            .collect()
    }

    /// Source 3: contradictions.
    pub fn from_contradictions(
        contradictions: &[Contradiction],
        anchor_span_by_card: &HashMap<CardId, SpanId>,
    ) -> Vec<GapDirection> {
        contradictions
            .iter()
            .filter_map(|c| {
                let anchor = anchor_span_by_card.get(&c.card_a).or_else(|| anchor_span_by_card.get(&c.card_b))?;
                Some(GapDirection {
                    text: format!(
                        "Conflicting results reported for {} within the \"{}\" theme",
                        c.dimension, c.theme
                    ),
                    citing_span_ids: vec![anchor.clone()],
                    rank_score: 2.0,
                })
            })
            .collect()
    }

    /// Merges all sources and returns the top `MAX_DIRECTIONS` by
    /// `rank_score` descending (§4.10).
    pub fn rank_and_truncate(mut directions: Vec<GapDirection>) -> Vec<GapDirection> {
        directions.sort_by(|a, b| b.rank_score.partial_cmp(&a.rank_score).unwrap_or(std::cmp::Ordering::Equal));
        directions.truncate(MAX_DIRECTIONS);
        directions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PaperId;
    use crate::model::{FieldTag, Locator};

    #[test]
    fn limitation_frequency_weights_by_cluster_size() {
        let paper = PaperId::from_raw("p1");
        let span = EvidenceSpan::new(paper, FieldTag::Limitation, "small eval set", Locator::default(), 0.7, "u".into());
        let card_a = CardId::new();
        let card_b = CardId::new();
        let spans = vec![(card_a.clone(), span.clone()), (card_b.clone(), span)];
        let mut sizes = HashMap::new();
        sizes.insert(card_a, 5);
        sizes.insert(card_b, 5);

        let directions = GapMiner::from_limitations(&spans, &sizes);
        assert_eq!(directions.len(), 1);
        assert_eq!(directions[0].rank_score, 2.0 * 5.0);
    }

    #[test]
    fn rank_and_truncate_caps_at_max_directions() {
        let directions: Vec<GapDirection> = (0..15)
            .map(|i| GapDirection {
                text: format!("direction {i}"),
                citing_span_ids: vec![],
                rank_score: i as f64,
            })
            .collect();
        let top = GapMiner::rank_and_truncate(directions);
        assert_eq!(top.len(), MAX_DIRECTIONS);
        assert_eq!(top[0].rank_score, 14.0);
    }
}
