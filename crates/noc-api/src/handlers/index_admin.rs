use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use noc_common::index::IndexBuilder;
use noc_common::{IndexStore, SearchIndex, TaxonomyStore};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::SharedState;

#[derive(Debug, Serialize)]
pub struct IndexStatus {
    pub embedder: String,
    pub model_version: String,
    pub dimension: usize,
    pub entity_count: usize,
    pub duty_count: usize,
    pub source_checksum: String,
    pub built_at: DateTime<Utc>,
}

impl IndexStatus {
    fn from_index(index: &SearchIndex) -> Self {
        let manifest = &index.manifest;
        Self {
            embedder: manifest.embedder.clone(),
            model_version: manifest.model_version.clone(),
            dimension: manifest.dimension,
            entity_count: manifest.entity_count,
            duty_count: manifest.duty_count,
            source_checksum: manifest.source_checksum.clone(),
            built_at: manifest.built_at,
        }
    }
}

pub async fn status(
    State(state): State<SharedState>,
    _auth: AuthUser,
) -> Result<Json<IndexStatus>, ApiError> {
    let index = state.current_index();
    Ok(Json(IndexStatus::from_index(&index)))
}

/// Rebuilds the index from the configured taxonomy CSV, persists it, and
/// swaps it in. At most one rebuild runs at a time; match requests keep
/// serving the previous index until the swap.
pub async fn rebuild(
    State(state): State<SharedState>,
    _auth: AuthUser,
) -> Result<Json<IndexStatus>, ApiError> {
    let Ok(_guard) = state.rebuild_lock.try_lock() else {
        return Err(ApiError::Conflict("index rebuild already in progress".into()));
    };

    let csv = state.config.taxonomy_csv.clone();
    let index_dir = state.config.index_dir.clone();
    let policy = state.config.list_policy;
    let embedder = state.embedder.clone();

    info!(csv = %csv.display(), "index rebuild started");

    let new_index = tokio::task::spawn_blocking(move || -> Result<SearchIndex, ApiError> {
        let store = TaxonomyStore::load_csv(&csv, policy)?;
        let index = IndexBuilder::new(embedder.as_ref()).build(&store)?;
        IndexStore::new(index_dir).persist(&index)?;
        Ok(index)
    })
    .await
    .map_err(|err| ApiError::Internal(format!("rebuild task failed: {err}")))??;

    let status = IndexStatus::from_index(&new_index);
    state.install_index(Arc::new(new_index));

    info!(
        entities = status.entity_count,
        duties = status.duty_count,
        "index rebuild complete"
    );

    Ok(Json(status))
}
