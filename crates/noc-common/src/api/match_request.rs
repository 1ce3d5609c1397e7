use serde::Deserialize;

/// Match request from the HTTP API.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchRequest {
    /// Free-text job description to rank the taxonomy against.
    pub description: String,
    /// Number of results to return; server default when omitted.
    #[serde(default)]
    pub top_k: Option<usize>,
}
