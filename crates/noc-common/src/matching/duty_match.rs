//! Assigns each taxonomy duty its best-matching input segment.

use std::collections::HashMap;

use crate::embedding::pairwise_cosine;
use crate::index::SearchIndex;

/// One taxonomy duty retained by the matcher, with the input segment
/// that triggered it.
#[derive(Debug, Clone, PartialEq)]
pub struct DutyMatch {
    pub duty: String,
    /// Position of the duty within its owning entity's duty list.
    pub position: usize,
    pub score: f32,
    pub matched_segment: String,
}

/// For every duty, takes the maximum similarity over the query segments
/// and the segment achieving it (earliest segment wins ties). Duties at
/// or below `threshold` are excluded entirely; they do not contribute a
/// zero. Returns retained duties grouped by owning entity index.
///
/// An empty segment list produces an empty grouping for every entity.
pub fn match_duties_to_segments(
    segments: &[String],
    segment_vectors: &[Vec<f32>],
    index: &SearchIndex,
    threshold: f32,
) -> HashMap<usize, Vec<DutyMatch>> {
    let mut grouped: HashMap<usize, Vec<DutyMatch>> = HashMap::new();
    if segments.is_empty() {
        return grouped;
    }

    let similarities = pairwise_cosine(segment_vectors, &index.duty_vectors);

    for (duty_index, duty) in index.duties.iter().enumerate() {
        let mut best_segment = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (segment_index, row) in similarities.iter().enumerate() {
            if row[duty_index] > best_score {
                best_score = row[duty_index];
                best_segment = segment_index;
            }
        }

        if best_score > threshold {
            grouped.entry(duty.entity).or_default().push(DutyMatch {
                duty: duty.text.clone(),
                position: duty.position,
                score: best_score,
                matched_segment: segments[best_segment].clone(),
            });
        }
    }

    grouped
}
