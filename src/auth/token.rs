use crate::error::AssetwayError;
use axum::http::{HeaderMap, header::AUTHORIZATION};

/// Extracts bearer token from request headers
pub struct TokenExtractor;

impl TokenExtractor {
    /// Extract the bearer token from the Authorization header.
    ///
    /// Returns `Ok(None)` when no credential was presented at all, so the
    /// caller can report a missing token rather than an invalid one.
    pub fn from_headers(headers: &HeaderMap) -> Result<Option<String>, AssetwayError> {
        let Some(value) = headers.get(AUTHORIZATION) else {
            return Ok(None);
        };

        let auth_header = value
            .to_str()
            .map_err(|_| AssetwayError::invalid_token("authorization header is not ASCII"))?;

        let Some(token) = auth_header.strip_prefix("Bearer ") else {
            return Err(AssetwayError::invalid_token(
                "Invalid authorization header format. Expected: Bearer <token>",
            ));
        };

        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }

        Ok(Some(token.to_string()))
    }
}
