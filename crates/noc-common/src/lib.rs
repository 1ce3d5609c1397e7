pub mod api;
pub mod embedding;
pub mod index;
pub mod keywords;
pub mod logging;
pub mod matching;
pub mod segmenter;
pub mod taxonomy;

use serde::{Deserialize, Serialize};

// Commonly used data model shared by the index builder and the matchers.

/// One occupational unit group as published in the classification taxonomy.
///
/// `duties` keeps the source order; a duty's identity is the pair of this
/// entity's index in the store and the duty's position in this list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Hierarchical classification code (5-digit for unit groups).
    pub code: String,
    pub title: String,
    pub description: String,
    /// Discrete responsibility statements, source order preserved.
    pub duties: Vec<String>,
    pub example_titles: Vec<String>,
    pub requirements: String,
    pub additional_info: String,
    pub exclusions: Vec<String>,
    /// Broad category label from the hierarchy, when present.
    pub broad_category: String,
    /// Major group label from the hierarchy, when present.
    pub major_group: String,
    /// Link to the published profile page.
    pub reference_url: String,
}

pub use embedding::{create_embedder, Embedder, EmbedderConfig, EmbeddingError};
pub use index::{DutyRecord, IndexError, IndexManifest, IndexStore, SearchIndex, VectorMatrix};
pub use matching::{MatchEngine, MatchError, MatchOutcome, RankedEntity, ScoringConfig};
pub use segmenter::{Segmenter, SegmenterConfig};
pub use taxonomy::{DataError, ListFieldPolicy, TaxonomyStore};
