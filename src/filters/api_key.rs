use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Header check behind the middleware. `None` disables authentication.
pub fn check_api_key(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if provided.is_empty() || provided != expected {
        return Err(ApiError::Unauthorized);
    }

    Ok(())
}

/// Rejects requests lacking a valid `X-API-Key` when a key is configured.
pub async fn require_api_key(
    State(expected): State<Option<String>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Err(e) = check_api_key(req.headers(), expected.as_deref()) {
        tracing::warn!("rejected request with missing or invalid API key");
        return Err(e);
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn accepts_valid_header() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("secret"));

        assert!(check_api_key(&headers, Some("secret")).is_ok());
    }

    #[test]
    fn rejects_missing_or_invalid_header() {
        let headers = HeaderMap::new();
        assert!(matches!(
            check_api_key(&headers, Some("secret")),
            Err(ApiError::Unauthorized)
        ));

        let mut invalid = HeaderMap::new();
        invalid.insert(API_KEY_HEADER, HeaderValue::from_static("wrong"));
        assert!(matches!(
            check_api_key(&invalid, Some("secret")),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn passes_everything_when_no_key_is_configured() {
        let headers = HeaderMap::new();
        assert!(check_api_key(&headers, None).is_ok());
    }

    #[test]
    fn rejects_non_utf8_header_value() {
        let mut headers = HeaderMap::new();
        let non_utf8 = HeaderValue::from_bytes(&[0xFF, 0xFE, 0xFD]).unwrap();
        headers.insert(API_KEY_HEADER, non_utf8);

        assert!(matches!(
            check_api_key(&headers, Some("secret")),
            Err(ApiError::Unauthorized)
        ));
    }
}
