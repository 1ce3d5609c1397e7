use axum::{extract::State, http::StatusCode};

use crate::SharedState;

pub async fn livez() -> &'static str {
    "ok"
}

/// Ready only while the process is serving and holds a loaded index;
/// flips to 503 during shutdown drain.
pub async fn readyz(State(state): State<SharedState>) -> Result<&'static str, StatusCode> {
    if state.readiness.load(std::sync::atomic::Ordering::SeqCst) {
        Ok("ready")
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}
