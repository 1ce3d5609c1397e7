use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use crate::error::ApiError;

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Expected `X-API-Key` value. When unset, authentication is
    /// disabled and every request is accepted.
    pub api_key: Option<String>,
}

/// Extractor that enforces API-key authentication on a handler.
pub struct AuthUser;

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AuthConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AuthConfig::from_ref(state);
        let Some(expected) = config.api_key else {
            return Ok(AuthUser);
        };

        let provided = parts
            .headers
            .get("x-api-key")
            .and_then(|value| value.to_str().ok());

        match provided {
            Some(key) if constant_time_eq(key.as_bytes(), expected.as_bytes()) => Ok(AuthUser),
            _ => Err(ApiError::Unauthorized("invalid or missing api key".into())),
        }
    }
}

/// Compares the full length of both inputs regardless of where they
/// first differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_equal_inputs() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
    }
}
