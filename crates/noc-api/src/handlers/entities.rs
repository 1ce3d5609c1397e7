use axum::{
    extract::{Path, State},
    Json,
};

use noc_common::Entity;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::SharedState;

/// Full stored record for one taxonomy code, for profile rendering.
pub async fn get_entity(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    _auth: AuthUser,
) -> Result<Json<Entity>, ApiError> {
    let index = state.current_index();

    let entity = index
        .entities
        .iter()
        .find(|entity| entity.code == code)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("entity {code} not found")))?;

    Ok(Json(entity))
}
