//! `session_id` cookie handling.

use std::convert::Infallible;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "session_id";

const MAX_SESSION_ID_LEN: usize = 128;

/// Session identifier taken from the request cookie, or freshly generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        SessionId(Uuid::new_v4().to_string())
    }

    /// Accept a client-supplied id only if it is a plain token.
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_SESSION_ID_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        valid.then(|| SessionId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn set_cookie_value(&self) -> String {
        format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, self.0)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(extract_cookie_value(&parts.headers, SESSION_COOKIE)
            .and_then(|raw| SessionId::parse(&raw))
            .unwrap_or_else(SessionId::generate))
    }
}

/// Extract a cookie value by name from the request headers.
fn extract_cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .map(str::trim)
        .find_map(|part| part.strip_prefix(&prefix).map(str::to_string))
}

/// Attach the `Set-Cookie` header for `session` to a response.
pub fn with_session_cookie(response: impl IntoResponse, session: &SessionId) -> Response {
    let mut response = response.into_response();
    if let Ok(value) = HeaderValue::from_str(&session.set_cookie_value()) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_named_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session_id=abc-123; lang=en"),
        );
        assert_eq!(
            extract_cookie_value(&headers, SESSION_COOKIE).as_deref(),
            Some("abc-123")
        );
        assert_eq!(extract_cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(SessionId::parse("").is_none());
        assert!(SessionId::parse("a b").is_none());
        assert!(SessionId::parse("x;y").is_none());
        assert!(SessionId::parse(&"a".repeat(200)).is_none());
        assert_eq!(SessionId::parse("abc_123").unwrap().as_str(), "abc_123");
    }

    #[test]
    fn generated_ids_are_valid_tokens() {
        let id = SessionId::generate();
        assert!(SessionId::parse(id.as_str()).is_some());
    }

    #[test]
    fn cookie_is_attached() {
        let session = SessionId::parse("abc").unwrap();
        let response = with_session_cookie("ok", &session);
        let cookie = response.headers().get(header::SET_COOKIE).unwrap();
        assert_eq!(cookie, "session_id=abc; Path=/; HttpOnly; SameSite=Lax");
    }
}
