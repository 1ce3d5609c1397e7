//! The online matching pipeline: segment, embed, score, rank.

use std::cmp::Ordering;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::embedding::{cosine_similarity, Embedder, EmbeddingError};
use crate::index::SearchIndex;
use crate::keywords::extract_keywords;
use crate::segmenter::Segmenter;

use super::config::ScoringConfig;
use super::duty_match::{match_duties_to_segments, DutyMatch};

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("top_k must be at least 1, got {0}")]
    InvalidTopK(usize),
    #[error("job description is empty")]
    EmptyDescription,
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// One ranked taxonomy entity with its component scores and explanation.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntity {
    /// Index into the loaded index's entity list.
    pub entity_index: usize,
    pub code: String,
    /// Whole-profile similarity of the full input against the entity.
    pub overall_score: f32,
    /// Mean of the entity's top retained duty scores, 0 when none.
    pub duty_score: f32,
    /// `overall_weight * overall + duty_weight * duty`.
    pub combined_score: f32,
    /// Retained duty matches, sorted by descending score.
    pub matched_duties: Vec<DutyMatch>,
}

/// Result of one match request.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub results: Vec<RankedEntity>,
    /// Highlight keywords extracted from the input, for presentation.
    pub keywords: Vec<String>,
}

/// Stateless across requests: holds only the shared read-only index, the
/// embedding capability, and tuning constants. Cheap to construct per
/// request; safe to call from concurrent threads.
pub struct MatchEngine {
    index: Arc<SearchIndex>,
    embedder: Arc<dyn Embedder>,
    segmenter: Segmenter,
    config: ScoringConfig,
}

impl MatchEngine {
    pub fn new(
        index: Arc<SearchIndex>,
        embedder: Arc<dyn Embedder>,
        config: ScoringConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            segmenter: Segmenter::default(),
            config,
        }
    }

    pub fn with_segmenter(mut self, segmenter: Segmenter) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub fn index(&self) -> &Arc<SearchIndex> {
        &self.index
    }

    /// Ranks taxonomy entities against a free-text job description.
    ///
    /// Input validation happens before any embedding work. The full text
    /// and its segments go through the embedding capability as one
    /// batched call; everything after that is pure arithmetic over the
    /// loaded index.
    pub fn match_description(
        &self,
        description: &str,
        top_k: usize,
    ) -> Result<MatchOutcome, MatchError> {
        if top_k < 1 {
            return Err(MatchError::InvalidTopK(top_k));
        }
        let trimmed = description.trim();
        if trimmed.is_empty() {
            return Err(MatchError::EmptyDescription);
        }

        let segments = self.segmenter.extract(trimmed);
        debug!(segments = segments.len(), "extracted responsibility segments");

        // Row 0 is the whole description, the rest are the segments.
        let mut inputs = Vec::with_capacity(segments.len() + 1);
        inputs.push(trimmed.to_string());
        inputs.extend(segments.iter().cloned());

        let mut vectors = self.embedder.embed(&inputs)?;
        if vectors.len() != inputs.len() {
            return Err(EmbeddingError::CountMismatch {
                sent: inputs.len(),
                received: vectors.len(),
            }
            .into());
        }
        let expected = self.index.manifest.dimension;
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != expected) {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: bad.len(),
            }
            .into());
        }

        let query_vector = vectors.remove(0);
        let segment_vectors = vectors;

        let overall: Vec<f32> = self
            .index
            .profile_vectors
            .rows()
            .map(|row| cosine_similarity(&query_vector, row))
            .collect();

        let mut grouped = match_duties_to_segments(
            &segments,
            &segment_vectors,
            &self.index,
            self.config.duty_threshold,
        );

        let entity_count = self.index.entities.len();
        let mut scored: Vec<(usize, f32, f32)> = Vec::with_capacity(entity_count);
        for entity_index in 0..entity_count {
            let duty_score = grouped
                .get(&entity_index)
                .map(|matches| top_mean(matches, self.config.top_duties))
                .unwrap_or(0.0);
            let combined = self.config.overall_weight * overall[entity_index]
                + self.config.duty_weight * duty_score;
            scored.push((entity_index, duty_score, combined));
        }

        // Stable sort: equal combined scores keep taxonomy store order.
        scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal));

        let results = scored
            .into_iter()
            .take(top_k.min(entity_count))
            .map(|(entity_index, duty_score, combined_score)| {
                let mut matched_duties = grouped.remove(&entity_index).unwrap_or_default();
                matched_duties
                    .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

                RankedEntity {
                    entity_index,
                    code: self.index.entities[entity_index].code.clone(),
                    overall_score: overall[entity_index],
                    duty_score,
                    combined_score,
                    matched_duties,
                }
            })
            .collect();

        Ok(MatchOutcome {
            results,
            keywords: extract_keywords(trimmed),
        })
    }
}

/// Mean of the `take` highest scores.
fn top_mean(matches: &[DutyMatch], take: usize) -> f32 {
    let mut scores: Vec<f32> = matches.iter().map(|m| m.score).collect();
    scores.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
    scores.truncate(take.max(1));
    scores.iter().sum::<f32>() / scores.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::index::IndexBuilder;
    use crate::taxonomy::TaxonomyStore;
    use crate::Entity;

    fn engine_with(entities: Vec<Entity>) -> MatchEngine {
        let store = TaxonomyStore::from_entities(entities).unwrap();
        let embedder = Arc::new(HashEmbedder::new(256));
        let index = IndexBuilder::new(embedder.as_ref()).build(&store).unwrap();
        MatchEngine::new(Arc::new(index), embedder, ScoringConfig::default())
    }

    fn developer_entity() -> Entity {
        Entity {
            code: "21232".into(),
            title: "Software developers and programmers".into(),
            description: "Write, modify, integrate and test software code.".into(),
            duties: vec![
                "Write, modify, integrate and test software code".into(),
                "Maintain existing computer programs by making modifications".into(),
                "Identify and communicate technical problems and solutions".into(),
            ],
            ..Entity::default()
        }
    }

    fn nurse_entity() -> Entity {
        Entity {
            code: "31301".into(),
            title: "Registered nurses".into(),
            description: "Provide direct nursing care to patients.".into(),
            duties: vec![
                "Administer medications and treatments to patients".into(),
                "Monitor patient vital signs and conditions".into(),
            ],
            ..Entity::default()
        }
    }

    fn chef_entity() -> Entity {
        Entity {
            code: "62200".into(),
            title: "Chefs".into(),
            description: "Plan and direct food preparation in kitchens.".into(),
            duties: vec![
                "Plan menus and estimate food requirements".into(),
                "Prepare and cook complete meals".into(),
            ],
            ..Entity::default()
        }
    }

    #[test]
    fn rejects_zero_top_k_before_embedding() {
        let engine = engine_with(vec![developer_entity()]);

        let err = engine.match_description("Develop software applications", 0).unwrap_err();

        assert!(matches!(err, MatchError::InvalidTopK(0)));
    }

    #[test]
    fn rejects_blank_description() {
        let engine = engine_with(vec![developer_entity()]);

        let err = engine.match_description("   \n  ", 10).unwrap_err();

        assert!(matches!(err, MatchError::EmptyDescription));
    }

    #[test]
    fn top_k_is_clamped_to_entity_count() {
        let engine = engine_with(vec![developer_entity(), nurse_entity()]);

        let outcome = engine
            .match_description("Write and test software code for clients", 50)
            .unwrap();

        assert_eq!(outcome.results.len(), 2);
    }

    #[test]
    fn combined_score_is_the_weighted_sum_of_components() {
        let engine = engine_with(vec![developer_entity(), nurse_entity(), chef_entity()]);

        let outcome = engine
            .match_description(
                "Write, modify, integrate and test software code. \
                 Maintain existing computer programs by making modifications.",
                3,
            )
            .unwrap();

        let config = ScoringConfig::default();
        for result in &outcome.results {
            let expected = config.overall_weight * result.overall_score
                + config.duty_weight * result.duty_score;
            assert!((result.combined_score - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn matching_entity_ranks_first_with_higher_duty_score() {
        let engine = engine_with(vec![nurse_entity(), developer_entity(), chef_entity()]);

        let outcome = engine
            .match_description(
                "We need someone to write, modify, integrate and test software code. \
                 The role will maintain existing computer programs by making modifications. \
                 Identify and communicate technical problems and solutions.",
                3,
            )
            .unwrap();

        assert_eq!(outcome.results[0].code, "21232");
        let developer = &outcome.results[0];
        for other in &outcome.results[1..] {
            assert!(developer.duty_score > other.duty_score);
        }
        assert!(!developer.matched_duties.is_empty());
    }

    #[test]
    fn matched_duties_are_sorted_descending() {
        let engine = engine_with(vec![developer_entity(), nurse_entity()]);

        let outcome = engine
            .match_description(
                "Write, modify, integrate and test software code. \
                 Maintain existing computer programs by making modifications. \
                 Identify and communicate technical problems and solutions.",
                1,
            )
            .unwrap();

        let duties = &outcome.results[0].matched_duties;
        assert!(duties
            .windows(2)
            .all(|pair| pair[0].score >= pair[1].score));
    }

    #[test]
    fn trivial_description_scores_only_the_profile_component() {
        // Nine characters: the segmenter drops everything, so no duty can
        // be retained and combined = overall_weight * overall.
        let engine = engine_with(vec![developer_entity(), nurse_entity()]);

        let outcome = engine.match_description("developer", 2).unwrap();

        let config = ScoringConfig::default();
        for result in &outcome.results {
            assert_eq!(result.duty_score, 0.0);
            assert!(result.matched_duties.is_empty());
            let expected = config.overall_weight * result.overall_score;
            assert!((result.combined_score - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn equal_scores_keep_taxonomy_order() {
        // Codes are not part of the searchable text, so two entities with
        // identical content get identical vectors and tie exactly.
        let mut first = developer_entity();
        first.code = "11111".into();
        let mut second = developer_entity();
        second.code = "22222".into();
        let engine = engine_with(vec![first, second]);

        let outcome = engine
            .match_description("Write, modify, integrate and test software code", 2)
            .unwrap();

        assert_eq!(outcome.results[0].combined_score, outcome.results[1].combined_score);
        assert_eq!(outcome.results[0].code, "11111");
        assert_eq!(outcome.results[1].code, "22222");
    }

    #[test]
    fn identical_requests_return_identical_results() {
        let engine = engine_with(vec![developer_entity(), nurse_entity(), chef_entity()]);
        let description = "Plan menus and estimate food requirements. Prepare and cook meals.";

        let first = engine.match_description(description, 3).unwrap();
        let second = engine.match_description(description, 3).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn top_mean_averages_only_the_best_five() {
        let matches: Vec<DutyMatch> = [0.5, 0.9, 0.3001, 0.7, 0.4, 0.8, 0.6]
            .iter()
            .map(|score| DutyMatch {
                duty: "duty".into(),
                position: 0,
                score: *score,
                matched_segment: "segment".into(),
            })
            .collect();

        let mean = top_mean(&matches, 5);

        assert!((mean - 0.7).abs() < 1e-6);
    }

    #[test]
    fn top_mean_with_fewer_matches_averages_them_all() {
        let matches: Vec<DutyMatch> = [0.4, 0.6]
            .iter()
            .map(|score| DutyMatch {
                duty: "duty".into(),
                position: 0,
                score: *score,
                matched_segment: "segment".into(),
            })
            .collect();

        assert!((top_mean(&matches, 5) - 0.5).abs() < 1e-6);
    }
}
