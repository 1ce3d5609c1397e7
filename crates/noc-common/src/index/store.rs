//! Durable storage for the index triple. The three files are written to
//! a staging directory and swapped in by rename, so a crash mid-build
//! leaves any previously persisted index loadable.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::Entity;

use super::{DutyRecord, IndexManifest, SearchIndex, VectorMatrix, INDEX_FORMAT_VERSION};

pub const PROFILE_VECTORS_FILE: &str = "profile_vectors.bin";
pub const DUTY_VECTORS_FILE: &str = "duty_vectors.bin";
pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("persisted index at {dir} is missing {file}; run a full rebuild")]
    MissingFile { dir: PathBuf, file: &'static str },
    #[error("persisted index is corrupt ({0}); run a full rebuild")]
    Corrupt(String),
    #[error("unsupported index format version {found} (expected {expected}); run a full rebuild")]
    FormatVersion { found: u32, expected: u32 },
}

/// Everything except the two vector matrices, serialized as one JSON
/// document so the metadata cannot be split across versions.
#[derive(Serialize, Deserialize)]
struct MetadataBundle {
    manifest: IndexManifest,
    entities: Vec<Entity>,
    duties: Vec<DutyRecord>,
}

pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.join(METADATA_FILE).is_file()
    }

    /// Loads the persisted triple as a unit and re-validates every
    /// cross-file invariant. A missing or inconsistent file fails the
    /// whole load; there is no partial fallback.
    pub fn load(&self) -> Result<SearchIndex, IndexError> {
        let metadata_bytes = self.read_file(METADATA_FILE)?;
        let bundle: MetadataBundle = serde_json::from_slice(&metadata_bytes)
            .map_err(|err| IndexError::Corrupt(format!("metadata: {err}")))?;

        if bundle.manifest.format_version != INDEX_FORMAT_VERSION {
            return Err(IndexError::FormatVersion {
                found: bundle.manifest.format_version,
                expected: INDEX_FORMAT_VERSION,
            });
        }

        let profile_vectors = self.read_matrix(PROFILE_VECTORS_FILE)?;
        let duty_vectors = self.read_matrix(DUTY_VECTORS_FILE)?;

        let index = SearchIndex {
            manifest: bundle.manifest,
            entities: bundle.entities,
            duties: bundle.duties,
            profile_vectors,
            duty_vectors,
        };
        index.validate()?;

        info!(
            dir = %self.root.display(),
            entities = index.manifest.entity_count,
            duties = index.manifest.duty_count,
            model = %index.manifest.model_version,
            "loaded embedding index"
        );
        Ok(index)
    }

    /// Persists the triple, replacing any prior version. All three files
    /// land in a staging directory first; only a fully written staging
    /// directory is promoted, so an interrupted build never damages the
    /// index currently on disk.
    pub fn persist(&self, index: &SearchIndex) -> Result<(), IndexError> {
        index.validate()?;

        let staging = self.sibling("staging");
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|source| IndexError::Io {
                path: staging.clone(),
                source,
            })?;
        }
        fs::create_dir_all(&staging).map_err(|source| IndexError::Io {
            path: staging.clone(),
            source,
        })?;

        let bundle = MetadataBundle {
            manifest: index.manifest.clone(),
            entities: index.entities.clone(),
            duties: index.duties.clone(),
        };
        let metadata = serde_json::to_vec_pretty(&bundle)
            .map_err(|err| IndexError::Corrupt(format!("metadata encode: {err}")))?;

        write_file(&staging.join(METADATA_FILE), &metadata)?;
        write_matrix(&staging.join(PROFILE_VECTORS_FILE), &index.profile_vectors)?;
        write_matrix(&staging.join(DUTY_VECTORS_FILE), &index.duty_vectors)?;

        let retired = self.sibling("old");
        if retired.exists() {
            fs::remove_dir_all(&retired).map_err(|source| IndexError::Io {
                path: retired.clone(),
                source,
            })?;
        }
        if self.root.exists() {
            fs::rename(&self.root, &retired).map_err(|source| IndexError::Io {
                path: self.root.clone(),
                source,
            })?;
        }
        fs::rename(&staging, &self.root).map_err(|source| IndexError::Io {
            path: staging.clone(),
            source,
        })?;
        if retired.exists() {
            if let Err(err) = fs::remove_dir_all(&retired) {
                warn!(path = %retired.display(), error = %err, "failed to remove retired index");
            }
        }

        info!(
            dir = %self.root.display(),
            entities = index.manifest.entity_count,
            duties = index.manifest.duty_count,
            "persisted embedding index"
        );
        Ok(())
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let name = self
            .root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index".to_string());
        self.root.with_file_name(format!("{name}.{suffix}"))
    }

    fn read_file(&self, file: &'static str) -> Result<Vec<u8>, IndexError> {
        let path = self.root.join(file);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(IndexError::MissingFile {
                dir: self.root.clone(),
                file,
            }),
            Err(source) => Err(IndexError::Io { path, source }),
        }
    }

    fn read_matrix(&self, file: &'static str) -> Result<VectorMatrix, IndexError> {
        let bytes = self.read_file(file)?;
        bincode::deserialize(&bytes).map_err(|err| IndexError::Corrupt(format!("{file}: {err}")))
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    fs::write(path, bytes).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_matrix(path: &Path, matrix: &VectorMatrix) -> Result<(), IndexError> {
    let bytes = bincode::serialize(matrix)
        .map_err(|err| IndexError::Corrupt(format!("matrix encode: {err}")))?;
    write_file(path, &bytes)
}
