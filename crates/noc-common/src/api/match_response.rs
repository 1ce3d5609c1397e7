use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::index::SearchIndex;
use crate::matching::RankedEntity;

/// One ranked taxonomy entity for GUI and export consumers. Carries the
/// full display bundle so no second lookup is needed to render a card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResponse {
    /// 1-based rank in this result list.
    pub rank: usize,
    pub noc_code: String,
    pub title: String,
    pub description: String,

    // === Scores ===
    /// Whole-profile similarity of the full input text.
    pub overall_score: f32,
    /// Aggregate of the best duty-level matches (0 when none retained).
    pub duty_score: f32,
    /// Final ranking score.
    pub combined_score: f32,

    // === Explanation ===
    /// Duty matches above the relevance threshold, best first.
    pub matched_duties: Vec<MatchedDutyDto>,

    // === Display metadata ===
    pub main_duties: Vec<String>,
    pub example_titles: Vec<String>,
    pub employment_requirements: String,
    pub additional_information: String,
    pub exclusions: Vec<String>,
    pub url: String,
    /// Highlight keywords extracted from the request text.
    pub keywords: Vec<String>,

    // === Metadata ===
    pub embedder: String,
    pub model_version: String,
    pub matched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedDutyDto {
    pub duty: String,
    pub score: f32,
    /// Input segment that best matched this duty.
    pub matched_segment: String,
}

impl MatchResponse {
    pub fn from_ranked(
        rank: usize,
        ranked: &RankedEntity,
        index: &SearchIndex,
        keywords: &[String],
        matched_at: DateTime<Utc>,
    ) -> Self {
        let entity = &index.entities[ranked.entity_index];

        Self {
            rank,
            noc_code: ranked.code.clone(),
            title: entity.title.clone(),
            description: entity.description.clone(),
            overall_score: ranked.overall_score,
            duty_score: ranked.duty_score,
            combined_score: ranked.combined_score,
            matched_duties: ranked
                .matched_duties
                .iter()
                .map(|m| MatchedDutyDto {
                    duty: m.duty.clone(),
                    score: m.score,
                    matched_segment: m.matched_segment.clone(),
                })
                .collect(),
            main_duties: entity.duties.clone(),
            example_titles: entity.example_titles.clone(),
            employment_requirements: entity.requirements.clone(),
            additional_information: entity.additional_info.clone(),
            exclusions: entity.exclusions.clone(),
            url: entity.reference_url.clone(),
            keywords: keywords.to_vec(),
            embedder: index.manifest.embedder.clone(),
            model_version: index.manifest.model_version.clone(),
            matched_at,
        }
    }
}
