//! Clusterer + Taxonomy builder (§4.8): semantic grouping of study cards
//! into themes, and the themes × dimensions matrix derived from them.

pub mod taxonomy;

use crate::embedding::{cosine_similarity, Embedder};
use crate::ids::CardId;
use crate::model::StudyCard;
use std::collections::HashMap;
use std::sync::Arc;

pub const MIN_CLUSTER_SIZE: usize = 3;
pub const MISCELLANEOUS_THEME: &str = "miscellaneous";

pub struct Clusterer {
    embedder: Arc<dyn Embedder>,
    min_cluster_size: usize,
    similarity_threshold: f32,
}

pub struct ClusteredTheme {
    pub name: String,
    pub card_ids: Vec<CardId>,
}

impl Clusterer {
    pub fn new(embedder: Arc<dyn Embedder>, min_cluster_size: usize) -> Self {
        Self {
            embedder,
            min_cluster_size,
            similarity_threshold: 0.75,
        }
    }

    /// Greedy single-link clustering over `problem+method` embeddings.
    /// Clusters below `min_cluster_size` are folded into "miscellaneous"
    /// (§4.8) rather than discarded, so every card keeps a theme.
    pub async fn cluster(&self, cards: &[(CardId, StudyCard)]) -> Vec<ClusteredTheme> {
        let mut embeddings = Vec::with_capacity(cards.len());
        for (id, card) in cards {
            let text = format!("{} {}", card.problem, card.method);
            let embedding = self.embedder.embed(&text).await.unwrap_or_default();
            embeddings.push((id.clone(), embedding));
        }

        let mut assigned = vec![false; embeddings.len()];
        let mut raw_clusters: Vec<Vec<usize>> = Vec::new();

        for i in 0..embeddings.len() {
            if assigned[i] {
                continue;
            }
            let mut cluster = vec![i];
            assigned[i] = true;
            for j in (i + 1)..embeddings.len() {
                if assigned[j] {
                    continue;
                }
                if cosine_similarity(&embeddings[i].1, &embeddings[j].1) >= self.similarity_threshold {
                    cluster.push(j);
                    assigned[j] = true;
                }
            }
            raw_clusters.push(cluster);
        }

        let mut themes = Vec::new();
        let mut misc = Vec::new();
        let mut theme_idx = 0;
        for cluster in raw_clusters {
            if cluster.len() >= self.min_cluster_size {
                theme_idx += 1;
                themes.push(ClusteredTheme {
                    name: format!("theme_{theme_idx}"),
                    card_ids: cluster.into_iter().map(|idx| embeddings[idx].0.clone()).collect(),
                });
            } else {
                misc.extend(cluster.into_iter().map(|idx| embeddings[idx].0.clone()));
            }
        }
        if !misc.is_empty() {
            themes.push(ClusteredTheme {
                name: MISCELLANEOUS_THEME.to_string(),
                card_ids: misc,
            });
        }
        themes
    }
}

/// Convenience for callers that already know which card belongs to which
/// theme (e.g. resuming from a checkpoint) and just need the count map
/// `TaxonomyMatrix::holes` requires.
pub fn theme_card_counts(themes: &[ClusteredTheme]) -> HashMap<String, usize> {
    themes.iter().map(|t| (t.name.clone(), t.card_ids.len())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingError;
    use async_trait::async_trait;

    struct StubEmbedder;
    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            // Two clear directions in 2D space so similarity threshold
            // trivially separates the two groups.
            if text.contains("attention") {
                Ok(vec![1.0, 0.0])
            } else {
                Ok(vec![0.0, 1.0])
            }
        }
    }

    fn card(problem: &str) -> StudyCard {
        let mut card = StudyCard::new(crate::ids::PaperId::new());
        card.problem = problem.to_string();
        card
    }

    #[tokio::test]
    async fn small_clusters_fold_into_miscellaneous() {
        let clusterer = Clusterer::new(Arc::new(StubEmbedder), MIN_CLUSTER_SIZE);
        let cards = vec![
            (CardId::new(), card("attention mechanisms")),
            (CardId::new(), card("attention mechanisms")),
            (CardId::new(), card("graph neural networks")),
        ];
        let themes = clusterer.cluster(&cards).await;
        assert!(themes.iter().any(|t| t.name == MISCELLANEOUS_THEME));
    }

    #[tokio::test]
    async fn large_enough_group_becomes_its_own_theme() {
        let clusterer = Clusterer::new(Arc::new(StubEmbedder), MIN_CLUSTER_SIZE);
        let cards = vec![
            (CardId::new(), card("attention mechanisms")),
            (CardId::new(), card("attention mechanisms")),
            (CardId::new(), card("attention mechanisms")),
        ];
        let themes = clusterer.cluster(&cards).await;
        assert_eq!(themes.len(), 1);
        assert_eq!(themes[0].card_ids.len(), 3);
    }
}
