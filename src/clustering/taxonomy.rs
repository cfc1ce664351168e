//! Taxonomy builder (§4.8): enumerates dataset/metric dimensions and builds
//! the dense themes × dimensions matrix, plus holes and contradictions.

use super::ClusteredTheme;
use crate::ids::CardId;
use crate::model::{StudyCard, TaxonomyMatrix};
use indexmap::IndexSet;
use std::collections::{BTreeMap, HashMap};

pub struct TaxonomyBuilder;

/// A numeric result reported by a card for a (dataset, metric) pair, used
/// to detect contradictory directions between cards in the same theme.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Direction {
    Improves,
    Degrades,
}

#[derive(Clone, Debug)]
pub struct Contradiction {
    pub theme: String,
    pub dimension: String,
    pub card_a: CardId,
    pub card_b: CardId,
}

impl TaxonomyBuilder {
    /// Normalizes (lowercase, trim) and unions dataset+metric labels across
    /// every included card (§4.8).
    pub fn dimensions(cards: &[StudyCard]) -> IndexSet<String> {
        let mut dims = IndexSet::new();
        for card in cards {
            for dataset in &card.datasets {
                dims.insert(normalize(dataset));
            }
            for metric in &card.metrics {
                dims.insert(normalize(metric));
            }
        }
        dims
    }

    pub fn build(
        themes: &[ClusteredTheme],
        cards_by_id: &HashMap<CardId, StudyCard>,
    ) -> TaxonomyMatrix {
        let all_cards: Vec<StudyCard> = cards_by_id.values().cloned().collect();
        let dimensions = Self::dimensions(&all_cards);
        let theme_names: IndexSet<String> = themes.iter().map(|t| t.name.clone()).collect();

        let mut matrix = TaxonomyMatrix::new(theme_names, dimensions.clone());
        for theme in themes {
            for card_id in &theme.card_ids {
                let Some(card) = cards_by_id.get(card_id) else { continue };
                for dataset in &card.datasets {
                    matrix.record(&theme.name, &normalize(dataset), card_id.clone());
                }
                for metric in &card.metrics {
                    matrix.record(&theme.name, &normalize(metric), card_id.clone());
                }
            }
        }
        matrix
    }

    /// §4.8: "two cards in the same theme reporting conflicting numeric
    /// result directions for the same (dataset, metric) pair." Direction is
    /// supplied by the caller (derived from the card's `results` text by an
    /// upstream LLM pass); this just finds the conflicts.
    pub fn contradictions(
        themes: &[ClusteredTheme],
        directions: &HashMap<(CardId, String), Direction>,
    ) -> Vec<Contradiction> {
        let mut contradictions = Vec::new();
        for theme in themes {
            let mut by_dimension: BTreeMap<String, Vec<(CardId, Direction)>> = BTreeMap::new();
            for card_id in &theme.card_ids {
                for ((id, dimension), direction) in directions {
                    if id == card_id {
                        by_dimension
                            .entry(dimension.clone())
                            .or_default()
                            .push((card_id.clone(), *direction));
                    }
                }
            }
            for (dimension, entries) in by_dimension {
                for i in 0..entries.len() {
                    for j in (i + 1)..entries.len() {
                        if entries[i].1 != entries[j].1 {
                            contradictions.push(Contradiction {
                                theme: theme.name.clone(),
                                dimension: dimension.clone(),
                                card_a: entries[i].0.clone(),
                                card_b: entries[j].0.clone(),
                            });
                        }
                    }
                }
            }
        }
        contradictions
    }
}

impl TaxonomyBuilder {
    /// Heuristic result-direction classifier feeding [`Self::contradictions`]:
    /// scans each card's free-text `results` field for a mention of the
    /// dimension alongside improvement/degradation language. Conservative —
    /// a dimension with no nearby sentiment keyword yields no entry rather
    /// than a guessed direction, so it can never manufacture a spurious
    /// contradiction.
    pub fn infer_directions(cards_by_id: &HashMap<CardId, StudyCard>) -> HashMap<(CardId, String), Direction> {
        const IMPROVES: &[&str] = &["improve", "outperform", "increase", "higher", "better", "gain", "surpass"];
        const DEGRADES: &[&str] = &["degrade", "underperform", "decrease", "lower", "worse", "drop", "fail"];

        let mut directions = HashMap::new();
        for (card_id, card) in cards_by_id {
            let results: Vec<char> = card.results.to_lowercase().chars().collect();
            let results_str: String = results.iter().collect();
            let dimensions: IndexSet<String> =
                card.datasets.iter().chain(card.metrics.iter()).map(|d| normalize(d)).collect();
            for dimension in dimensions {
                let Some(byte_idx) = results_str.find(&dimension) else {
                    continue;
                };
                let char_idx = results_str[..byte_idx].chars().count();
                let window_start = char_idx.saturating_sub(40);
                let window_end = (char_idx + dimension.chars().count() + 40).min(results.len());
                let window: String = results[window_start..window_end].iter().collect();
                if IMPROVES.iter().any(|kw| window.contains(kw)) {
                    directions.insert((card_id.clone(), dimension), Direction::Improves);
                } else if DEGRADES.iter().any(|kw| window.contains(kw)) {
                    directions.insert((card_id.clone(), dimension), Direction::Degrades);
                }
            }
        }
        directions
    }
}

fn normalize(label: &str) -> String {
    label.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PaperId;

    fn card_with(datasets: &[&str], metrics: &[&str]) -> StudyCard {
        let mut card = StudyCard::new(PaperId::new());
        card.datasets = datasets.iter().map(|s| s.to_string()).collect();
        card.metrics = metrics.iter().map(|s| s.to_string()).collect();
        card
    }

    #[test]
    fn dimensions_are_normalized_and_deduplicated() {
        let cards = vec![card_with(&["SQuAD", " squad "], &["F1"])];
        let dims = TaxonomyBuilder::dimensions(&cards);
        assert_eq!(dims.len(), 2);
        assert!(dims.contains("squad"));
        assert!(dims.contains("f1"));
    }

    #[test]
    fn contradictions_detected_within_a_theme() {
        let card_a = CardId::new();
        let card_b = CardId::new();
        let themes = vec![ClusteredTheme {
            name: "theme_1".into(),
            card_ids: vec![card_a.clone(), card_b.clone()],
        }];
        let mut directions = HashMap::new();
        directions.insert((card_a.clone(), "squad".to_string()), Direction::Improves);
        directions.insert((card_b.clone(), "squad".to_string()), Direction::Degrades);

        let contradictions = TaxonomyBuilder::contradictions(&themes, &directions);
        assert_eq!(contradictions.len(), 1);
    }

    #[test]
    fn infer_directions_detects_improvement_language_near_the_dimension() {
        let card_id = CardId::new();
        let mut card = card_with(&["squad"], &[]);
        card.results = "Our method improves squad F1 by four points over the baseline.".to_string();
        let mut cards_by_id = HashMap::new();
        cards_by_id.insert(card_id.clone(), card);

        let directions = TaxonomyBuilder::infer_directions(&cards_by_id);
        assert_eq!(directions.get(&(card_id, "squad".to_string())), Some(&Direction::Improves));
    }

    #[test]
    fn infer_directions_is_silent_when_no_sentiment_keyword_is_nearby() {
        let card_id = CardId::new();
        let mut card = card_with(&["squad"], &[]);
        card.results = "We report squad results in Table 2.".to_string();
        let mut cards_by_id = HashMap::new();
        cards_by_id.insert(card_id.clone(), card);

        let directions = TaxonomyBuilder::infer_directions(&cards_by_id);
        assert!(directions.is_empty());
    }
}
