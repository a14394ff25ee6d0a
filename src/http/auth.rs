use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use http::{HeaderMap, StatusCode};

use crate::application::user_service::UserService;
use crate::domain::user::UserId;
use crate::http::routes::users::AppState;
use crate::http::types::ApiResponse;

const KEYWORD: &str = "Token";

/// The caller resolved from a valid access token.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: UserId,
    pub username: String,
}

/// Rejects requests that do not carry `Authorization: Token <key>` for an active user.
pub async fn require_token<S: UserService + Clone>(State(state): State<AppState<S>>, mut request: Request, next: Next) -> Response {
    let key = match token_from_headers(request.headers()) {
        Ok(Some(key)) => key.to_owned(),
        Ok(None) => return unauthorized("API_NOT_AUTHENTICATED", "Authentication credentials were not provided."),
        Err(message) => return unauthorized("API_AUTHENTICATION_FAILED", message),
    };

    let user = match state.service.authenticate(&key).await {
        Ok(Some(user)) => user,
        Ok(None) => return unauthorized("API_AUTHENTICATION_FAILED", "Invalid token."),
        Err(e) => {
            tracing::error!(error = %e, "token lookup failed");
            return ApiResponse::failure(StatusCode::INTERNAL_SERVER_ERROR, "API_AUTHENTICATION_ERROR", "Failed to authenticate request.", e)
                .into_response();
        }
    };
    if !user.is_active {
        return unauthorized("API_AUTHENTICATION_FAILED", "User inactive or deleted.");
    }

    tracing::debug!(user_id = %user.id, "request authenticated");
    request.extensions_mut().insert(AuthUser { id: user.id, username: user.username });
    next.run(request).await
}

/// `Ok(None)` when no token credentials are present at all.
fn token_from_headers(headers: &HeaderMap) -> Result<Option<&str>, &'static str> {
    let Some(value) = headers.get(AUTHORIZATION) else { return Ok(None) };
    let value = value
        .to_str()
        .map_err(|_| "Invalid token header. Token string should not contain invalid characters.")?;
    let mut parts = value.split_whitespace();
    match parts.next() {
        Some(keyword) if keyword.eq_ignore_ascii_case(KEYWORD) => {}
        _ => return Ok(None),
    }
    match (parts.next(), parts.next()) {
        (None, _) => Err("Invalid token header. No credentials provided."),
        (Some(_), Some(_)) => Err("Invalid token header. Token string should not contain spaces."),
        (Some(key), None) => Ok(Some(key)),
    }
}

fn unauthorized(code: &str, message: &str) -> Response {
    let mut response = ApiResponse::status(StatusCode::UNAUTHORIZED, code, message).into_response();
    response.headers_mut().insert(WWW_AUTHENTICATE, http::HeaderValue::from_static(KEYWORD));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn parses_token_keyword_case_insensitively() {
        assert_eq!(token_from_headers(&headers("token abc")), Ok(Some("abc")));
        assert_eq!(token_from_headers(&headers("Token abc")), Ok(Some("abc")));
    }

    #[test]
    fn other_schemes_count_as_missing() {
        assert_eq!(token_from_headers(&headers("Bearer abc")), Ok(None));
        assert_eq!(token_from_headers(&HeaderMap::new()), Ok(None));
    }

    #[test]
    fn malformed_token_headers_are_rejected() {
        assert!(token_from_headers(&headers("Token")).is_err());
        assert!(token_from_headers(&headers("Token a b")).is_err());
    }
}
