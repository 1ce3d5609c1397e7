//! The embedding index: two parallel vector matrices plus the metadata
//! needed to render results. Built offline, loaded once, then read-only.

pub mod builder;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Entity;

pub use builder::{BuildError, IndexBuilder};
pub use store::{IndexError, IndexStore};

/// Dense row-major matrix of embedding vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatrix {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorMatrix {
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn from_rows(dimension: usize, rows: Vec<Vec<f32>>) -> Option<Self> {
        if rows.iter().any(|row| row.len() != dimension) {
            return None;
        }
        Some(Self {
            dimension,
            data: rows.into_iter().flatten().collect(),
        })
    }

    /// Appends a row. Rows of the wrong length are refused.
    pub fn push_row(&mut self, row: &[f32]) -> bool {
        if row.len() != self.dimension {
            return false;
        }
        self.data.extend_from_slice(row);
        true
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn row(&self, index: usize) -> &[f32] {
        let start = index * self.dimension;
        &self.data[start..start + self.dimension]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimension.max(1))
    }
}

/// One duty with its explicit owner identity. The owner is stored, never
/// inferred from array position, so a change in build order cannot
/// silently corrupt the backreferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DutyRecord {
    pub text: String,
    /// Index of the owning entity, in taxonomy store order.
    pub entity: usize,
    /// Position of this duty within the owning entity's duty list.
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    /// Embedder implementation name ("hash", "http").
    pub embedder: String,
    /// Model generation the vectors were produced with.
    pub model_version: String,
    pub dimension: usize,
    pub entity_count: usize,
    pub duty_count: usize,
    /// Checksum over the embedded texts; ties the triple together.
    pub source_checksum: String,
    pub built_at: DateTime<Utc>,
}

pub const INDEX_FORMAT_VERSION: u32 = 1;

/// The loaded index. Immutable after construction; share via `Arc` and
/// read from any number of concurrent match requests.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchIndex {
    pub manifest: IndexManifest,
    /// Display metadata, indexed identically to `profile_vectors`.
    pub entities: Vec<Entity>,
    /// Global duty list, indexed identically to `duty_vectors`.
    pub duties: Vec<DutyRecord>,
    pub profile_vectors: VectorMatrix,
    pub duty_vectors: VectorMatrix,
}

impl SearchIndex {
    /// Cross-checks the invariants tying the triple together. Any
    /// violation means the persisted bundle is corrupt or mismatched.
    pub fn validate(&self) -> Result<(), IndexError> {
        let fail = |detail: String| Err(IndexError::Corrupt(detail));

        if self.profile_vectors.len() != self.entities.len() {
            return fail(format!(
                "{} profile vectors for {} entities",
                self.profile_vectors.len(),
                self.entities.len()
            ));
        }
        if self.duty_vectors.len() != self.duties.len() {
            return fail(format!(
                "{} duty vectors for {} duty records",
                self.duty_vectors.len(),
                self.duties.len()
            ));
        }
        if self.manifest.entity_count != self.entities.len()
            || self.manifest.duty_count != self.duties.len()
        {
            return fail("manifest counts disagree with metadata".into());
        }
        if self.profile_vectors.dimension() != self.manifest.dimension
            || self.duty_vectors.dimension() != self.manifest.dimension
        {
            return fail("matrix dimensions disagree with manifest".into());
        }

        for (index, duty) in self.duties.iter().enumerate() {
            let Some(entity) = self.entities.get(duty.entity) else {
                return fail(format!("duty {index} references entity {}", duty.entity));
            };
            match entity.duties.get(duty.position) {
                Some(text) if *text == duty.text => {}
                _ => {
                    return fail(format!(
                        "duty {index} does not match entity {} position {}",
                        duty.entity, duty.position
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_matrix_round_trips_rows() {
        let mut matrix = VectorMatrix::with_dimension(3);
        assert!(matrix.push_row(&[1.0, 2.0, 3.0]));
        assert!(matrix.push_row(&[4.0, 5.0, 6.0]));
        assert!(!matrix.push_row(&[1.0]));

        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix.row(1), &[4.0, 5.0, 6.0]);
        assert_eq!(matrix.rows().count(), 2);
    }

    #[test]
    fn from_rows_rejects_ragged_input() {
        assert!(VectorMatrix::from_rows(2, vec![vec![1.0, 2.0], vec![3.0]]).is_none());
    }
}
