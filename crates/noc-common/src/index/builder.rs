//! Offline index build: weighted searchable text per entity, batched
//! embedding of profiles and duties, manifest assembly.

use chrono::Utc;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::embedding::{Embedder, EmbeddingError};
use crate::taxonomy::{DataError, TaxonomyStore};
use crate::Entity;

use super::{DutyRecord, IndexManifest, SearchIndex, VectorMatrix, INDEX_FORMAT_VERSION};

const DEFAULT_EMBED_BATCH: usize = 32;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Index(#[from] super::IndexError),
}

pub struct IndexBuilder<'a> {
    embedder: &'a dyn Embedder,
    batch_size: usize,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(embedder: &'a dyn Embedder) -> Self {
        Self {
            embedder,
            batch_size: DEFAULT_EMBED_BATCH,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Builds the full index from the taxonomy store. Embedding failures
    /// abort the build; nothing partial escapes this function.
    pub fn build(&self, store: &TaxonomyStore) -> Result<SearchIndex, BuildError> {
        if store.is_empty() {
            return Err(DataError::EmptyStore.into());
        }
        for entity in store.entities() {
            for (field, value) in [("title", &entity.title), ("description", &entity.description)]
            {
                if value.trim().is_empty() {
                    return Err(DataError::MissingField {
                        code: entity.code.clone(),
                        field,
                    }
                    .into());
                }
            }
        }

        let searchable_texts: Vec<String> =
            store.entities().iter().map(searchable_text).collect();

        let mut duties = Vec::new();
        let mut duty_texts = Vec::new();
        for (entity_index, entity) in store.entities().iter().enumerate() {
            for (position, duty) in entity.duties.iter().enumerate() {
                if duty.trim().is_empty() {
                    continue;
                }
                duties.push(DutyRecord {
                    text: duty.clone(),
                    entity: entity_index,
                    position,
                });
                duty_texts.push(duty.clone());
            }
        }

        info!(
            entities = searchable_texts.len(),
            duties = duty_texts.len(),
            embedder = self.embedder.name(),
            "embedding taxonomy"
        );

        let profile_vectors = self.embed_in_batches(&searchable_texts)?;
        let duty_vectors = self.embed_in_batches(&duty_texts)?;

        let manifest = IndexManifest {
            format_version: INDEX_FORMAT_VERSION,
            embedder: self.embedder.name().to_string(),
            model_version: self.embedder.model_version().to_string(),
            dimension: self.embedder.dimension(),
            entity_count: store.len(),
            duty_count: duties.len(),
            source_checksum: source_checksum(&searchable_texts, &duty_texts),
            built_at: Utc::now(),
        };

        let index = SearchIndex {
            manifest,
            entities: store.entities().to_vec(),
            duties,
            profile_vectors,
            duty_vectors,
        };
        index.validate()?;

        Ok(index)
    }

    fn embed_in_batches(&self, texts: &[String]) -> Result<VectorMatrix, EmbeddingError> {
        let mut matrix = VectorMatrix::with_dimension(self.embedder.dimension());

        for batch in texts.chunks(self.batch_size) {
            let vectors = self.embedder.embed(batch)?;
            if vectors.len() != batch.len() {
                return Err(EmbeddingError::CountMismatch {
                    sent: batch.len(),
                    received: vectors.len(),
                });
            }
            for vector in &vectors {
                if !matrix.push_row(vector) {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected: self.embedder.dimension(),
                        actual: vector.len(),
                    });
                }
            }
        }

        Ok(matrix)
    }
}

/// Assembles the weighted searchable text for one entity.
///
/// The repetitions are a weighting device: the title is stated twice, the
/// description gets a truncated repeat, and the duties appear under three
/// different labels to triple their pull on the profile vector. The exact
/// counts are part of the index format; changing them changes every
/// profile vector.
pub fn searchable_text(entity: &Entity) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push(format!("Title: {} {}", entity.title, entity.title));

    parts.push(format!("Description: {}", entity.description));
    parts.push(truncate_chars(&entity.description, 200));

    if !entity.duties.is_empty() {
        let joined = entity.duties.join(" ");
        parts.push(format!("Main duties: {joined}"));
        parts.push(format!("Responsibilities: {joined}"));
        parts.push(format!("Key duties: {joined}"));
    }

    if !entity.example_titles.is_empty() {
        parts.push(format!("Example titles: {}", entity.example_titles.join(" ")));
    }

    if !entity.requirements.is_empty() {
        parts.push(format!("Requirements: {}", entity.requirements));
    }

    if !entity.additional_info.is_empty() {
        parts.push(truncate_chars(&entity.additional_info, 100));
    }

    if !entity.exclusions.is_empty() {
        let first_three: Vec<&str> = entity
            .exclusions
            .iter()
            .take(3)
            .map(String::as_str)
            .collect();
        parts.push(format!("Exclusions: {}", first_three.join(" ")));
    }

    if !entity.broad_category.is_empty() {
        parts.push(format!("Category: {}", entity.broad_category));
    }
    if !entity.major_group.is_empty() {
        parts.push(format!("Group: {}", entity.major_group));
    }

    parts.retain(|part| !part.is_empty());
    parts.join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Checksum over everything that was embedded; recorded in the manifest
/// so a loaded triple can be matched against its source.
fn source_checksum(searchable_texts: &[String], duty_texts: &[String]) -> String {
    let mut hasher = Sha256::new();
    for text in searchable_texts.iter().chain(duty_texts) {
        hasher.update(text.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    let mut hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex.truncate(16);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::taxonomy::TaxonomyStore;

    fn entity(code: &str, title: &str, duties: &[&str]) -> Entity {
        Entity {
            code: code.into(),
            title: title.into(),
            description: format!("{title} description long enough to matter"),
            duties: duties.iter().map(|d| d.to_string()).collect(),
            ..Entity::default()
        }
    }

    #[test]
    fn searchable_text_repeats_title_and_duty_labels() {
        let entity = Entity {
            code: "21232".into(),
            title: "Software developers".into(),
            description: "Write, modify and test code.".into(),
            duties: vec!["Write code".into(), "Test code".into()],
            example_titles: vec!["developer".into()],
            requirements: "A degree.".into(),
            additional_info: "Progression to management is possible.".into(),
            exclusions: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            broad_category: "Sciences".into(),
            major_group: "Professional".into(),
            reference_url: String::new(),
        };

        let text = searchable_text(&entity);

        assert!(text.starts_with("Title: Software developers Software developers"));
        assert_eq!(text.matches("Write code Test code").count(), 3);
        assert!(text.contains("Main duties:"));
        assert!(text.contains("Responsibilities:"));
        assert!(text.contains("Key duties:"));
        assert!(text.contains("Exclusions: a b c"));
        assert!(!text.contains(" d "), "only the first three exclusions are used");
        assert!(text.contains("Category: Sciences"));
        assert!(text.contains("Group: Professional"));
    }

    #[test]
    fn searchable_text_omits_empty_sections() {
        let entity = entity("00011", "Legislators", &[]);

        let text = searchable_text(&entity);

        assert!(!text.contains("Main duties:"));
        assert!(!text.contains("Example titles:"));
        assert!(!text.contains("Requirements:"));
        assert!(!text.contains("Exclusions:"));
    }

    #[test]
    fn duty_order_is_entity_order_then_position() {
        let store = TaxonomyStore::from_entities(vec![
            entity("00011", "Legislators", &["Enact laws", "Represent constituents"]),
            entity("21232", "Software developers", &["Write code"]),
        ])
        .unwrap();
        let embedder = HashEmbedder::new(64);

        let index = IndexBuilder::new(&embedder).build(&store).unwrap();

        assert_eq!(index.duties.len(), 3);
        assert_eq!((index.duties[0].entity, index.duties[0].position), (0, 0));
        assert_eq!((index.duties[1].entity, index.duties[1].position), (0, 1));
        assert_eq!((index.duties[2].entity, index.duties[2].position), (1, 0));
        assert_eq!(index.duty_vectors.len(), 3);
        assert_eq!(index.profile_vectors.len(), 2);
    }

    #[test]
    fn blank_duty_strings_are_skipped() {
        let store = TaxonomyStore::from_entities(vec![entity(
            "00011",
            "Legislators",
            &["Enact laws", "   ", ""],
        )])
        .unwrap();
        let embedder = HashEmbedder::new(64);

        let index = IndexBuilder::new(&embedder).build(&store).unwrap();

        assert_eq!(index.duties.len(), 1);
        assert_eq!(index.manifest.duty_count, 1);
    }

    #[test]
    fn empty_store_is_a_data_error() {
        let store = TaxonomyStore::from_entities(vec![]).unwrap();
        let embedder = HashEmbedder::new(64);

        let err = IndexBuilder::new(&embedder).build(&store).unwrap_err();

        assert!(matches!(err, BuildError::Data(DataError::EmptyStore)));
    }

    #[test]
    fn missing_description_is_a_data_error() {
        let mut bad = entity("21232", "Software developers", &[]);
        bad.description = "   ".into();
        let store = TaxonomyStore::from_entities(vec![bad]).unwrap();
        let embedder = HashEmbedder::new(64);

        let err = IndexBuilder::new(&embedder).build(&store).unwrap_err();

        assert!(matches!(
            err,
            BuildError::Data(DataError::MissingField { field: "description", .. })
        ));
    }

    #[test]
    fn build_is_deterministic_for_a_fixed_embedder() {
        let store = TaxonomyStore::from_entities(vec![
            entity("00011", "Legislators", &["Enact laws"]),
            entity("21232", "Software developers", &["Write code"]),
        ])
        .unwrap();
        let embedder = HashEmbedder::new(64);

        let first = IndexBuilder::new(&embedder).build(&store).unwrap();
        let second = IndexBuilder::new(&embedder).with_batch_size(1).build(&store).unwrap();

        assert_eq!(first.profile_vectors, second.profile_vectors);
        assert_eq!(first.duty_vectors, second.duty_vectors);
        assert_eq!(first.manifest.source_checksum, second.manifest.source_checksum);
    }
}
