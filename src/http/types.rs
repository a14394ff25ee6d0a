use std::fmt::Display;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::validation::FieldErrors;

/// The `{code, message, ...}` JSON envelope every endpoint answers with.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Option<Value>,
}

impl ApiResponse {
    /// Success carrying the serialized entity or collection under `key`.
    pub fn success(status: StatusCode, code: &str, message: &str, key: &str, value: &impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Self::with_extra(status, code, message, Some((key, value))),
            Err(e) => {
                tracing::error!(error = %e, code, "failed to serialize response");
                Self::failure(StatusCode::INTERNAL_SERVER_ERROR, code, "Failed to format response", e)
            }
        }
    }

    pub fn status(status: StatusCode, code: &str, message: &str) -> Self {
        Self::with_extra(status, code, message, None)
    }

    /// 400 with per-field messages under `errors`.
    pub fn invalid(code: &str, message: &str, errors: &FieldErrors) -> Self {
        let errors = serde_json::to_value(errors).unwrap_or_default();
        Self::with_extra(StatusCode::BAD_REQUEST, code, message, Some(("errors", errors)))
    }

    /// Failure carrying the raw error text under `error`.
    pub fn failure(status: StatusCode, code: &str, message: &str, error: impl Display) -> Self {
        Self::with_extra(status, code, message, Some(("error", Value::String(error.to_string()))))
    }

    pub fn no_content() -> Self { Self { status: StatusCode::NO_CONTENT, body: None } }

    fn with_extra(status: StatusCode, code: &str, message: &str, extra: Option<(&str, Value)>) -> Self {
        let mut body = Map::new();
        body.insert("code".into(), Value::String(code.into()));
        body.insert("message".into(), Value::String(message.into()));
        if let Some((key, value)) = extra {
            body.insert(key.into(), value);
        }
        Self { status, body: Some(Value::Object(body)) }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        match self.body {
            Some(body) => (self.status, axum::Json(body)).into_response(),
            None => self.status.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invalid_envelope_lists_field_errors() {
        let response = ApiResponse::invalid("API_TASK_CREATE_ERROR", "Failed to create task", &FieldErrors::single("title", "This field is required."));
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.body.unwrap(),
            json!({
                "code": "API_TASK_CREATE_ERROR",
                "message": "Failed to create task",
                "errors": { "title": ["This field is required."] }
            })
        );
    }

    #[test]
    fn success_envelope_nests_entity() {
        let response = ApiResponse::success(StatusCode::OK, "OK", "fine", "items", &vec![1, 2]);
        assert_eq!(response.body.unwrap()["items"], json!([1, 2]));
    }

    #[test]
    fn no_content_has_no_body() {
        assert!(ApiResponse::no_content().body.is_none());
    }
}
