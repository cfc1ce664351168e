//! `TaxonomyMatrix` (§3, §4.8): themes × dimensions analytical backbone.

use crate::ids::CardId;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A dataset-or-metric column label, normalized lowercase+trim per §4.8.
pub type Dimension = String;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaxonomyCell {
    pub cards: Vec<CardId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaxonomyMatrix {
    /// Row labels, stable within a session (cluster theme ids/names).
    pub themes: IndexSet<String>,
    /// Column labels: the union of normalized dataset and metric labels.
    pub dimensions: IndexSet<Dimension>,
    /// Sparse cell map, keyed `(theme, dimension)`.
    cells: BTreeMap<(String, Dimension), TaxonomyCell>,
}

impl TaxonomyMatrix {
    pub fn new(themes: IndexSet<String>, dimensions: IndexSet<Dimension>) -> Self {
        Self {
            themes,
            dimensions,
            cells: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, theme: &str, dimension: &str, card_id: CardId) {
        self.cells
            .entry((theme.to_string(), dimension.to_string()))
            .or_default()
            .cards
            .push(card_id);
    }

    pub fn cell(&self, theme: &str, dimension: &str) -> Option<&TaxonomyCell> {
        self.cells.get(&(theme.to_string(), dimension.to_string()))
    }

    /// Cells with zero cards in a theme whose total card count is ≥ 3
    /// (§4.8 "holes"). `theme_card_counts` maps theme -> total cards assigned.
    pub fn holes(&self, theme_card_counts: &BTreeMap<String, usize>) -> Vec<(String, Dimension)> {
        let mut holes = Vec::new();
        for theme in &self.themes {
            let Some(&count) = theme_card_counts.get(theme) else {
                continue;
            };
            if count < 3 {
                continue;
            }
            for dimension in &self.dimensions {
                let populated = self
                    .cell(theme, dimension)
                    .map(|c| !c.cards.is_empty())
                    .unwrap_or(false);
                if !populated {
                    holes.push((theme.clone(), dimension.clone()));
                }
            }
        }
        holes
    }

    /// Every card referenced by a cell must belong to `included`, per §3's
    /// invariant ("no cell references a card outside the included set").
    pub fn all_cards_included(&self, included: &std::collections::HashSet<CardId>) -> bool {
        self.cells
            .values()
            .flat_map(|cell| cell.cards.iter())
            .all(|id| included.contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holes_only_considered_for_themes_with_at_least_three_cards() {
        let mut themes = IndexSet::new();
        themes.insert("attention".to_string());
        let mut dims = IndexSet::new();
        dims.insert("glue".to_string());
        let matrix = TaxonomyMatrix::new(themes, dims);

        let mut counts = BTreeMap::new();
        counts.insert("attention".to_string(), 2);
        assert!(matrix.holes(&counts).is_empty());

        counts.insert("attention".to_string(), 3);
        assert_eq!(matrix.holes(&counts), vec![("attention".to_string(), "glue".to_string())]);
    }

    #[test]
    fn recording_populates_a_cell() {
        let mut themes = IndexSet::new();
        themes.insert("attention".to_string());
        let mut dims = IndexSet::new();
        dims.insert("glue".to_string());
        let mut matrix = TaxonomyMatrix::new(themes, dims);
        matrix.record("attention", "glue", CardId::from_raw("card_1"));
        assert_eq!(matrix.cell("attention", "glue").unwrap().cards.len(), 1);
    }
}
