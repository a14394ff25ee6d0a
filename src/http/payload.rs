//! Request body decoding shared by the resource routes.
//!
//! JSON bodies must be objects. Multipart forms are flattened into the same
//! shape: text parts become string fields (repeated names become lists) and
//! file parts are reported by size without being buffered.

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request};
use axum::response::{IntoResponse, Response};
use http::header::CONTENT_TYPE;
use http::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::domain::user::{Avatar, MAX_AVATAR_BYTES};
use crate::domain::validation::{self, FieldErrors, Payload};
use crate::http::types::ApiResponse;

/// Form fields that always decode to a list, even when sent once.
const LIST_FIELDS: &[&str] = &["groups"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: Option<String>,
    pub size: usize,
}

#[derive(Debug, Default)]
pub struct RequestPayload {
    pub fields: Payload,
    pub files: Vec<UploadedFile>,
}

impl RequestPayload {
    pub fn avatar(&self) -> Option<Avatar> {
        self.files
            .iter()
            .find(|f| f.field == "avatar")
            .map(|f| Avatar { file_name: f.file_name.clone(), size: f.size })
    }

    fn push_text(&mut self, name: String, text: String) {
        let text = Value::String(text);
        match self.fields.get_mut(&name) {
            Some(Value::Array(items)) => items.push(text),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, text]);
            }
            None if LIST_FIELDS.contains(&name.as_str()) => {
                self.fields.insert(name, Value::Array(vec![text]));
            }
            None => {
                self.fields.insert(name, text);
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum PayloadRejection {
    #[error("JSON parse error - {0}")]
    Json(String),
    #[error("Invalid data. Expected a dictionary, but got {0}.")]
    NotAnObject(&'static str),
    #[error("Multipart form parse error - {0}")]
    Multipart(String),
    #[error("Unsupported media type \"{0}\" in request.")]
    UnsupportedMediaType(String),
}

impl PayloadRejection {
    pub fn field_errors(&self) -> FieldErrors {
        FieldErrors::single("non_field_errors", self.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PayloadRejection::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// The error envelope under an operation's failure `code` and `message`.
    pub fn to_response(&self, code: &str, message: &str) -> ApiResponse {
        let mut response = ApiResponse::invalid(code, message, &self.field_errors());
        response.status = self.status();
        response
    }
}

impl IntoResponse for PayloadRejection {
    fn into_response(self) -> Response {
        self.to_response("API_INVALID_PAYLOAD", "Invalid request body").into_response()
    }
}

#[async_trait]
impl<S> FromRequest<S> for RequestPayload
where
    S: Send + Sync,
{
    type Rejection = PayloadRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| PayloadRejection::Multipart(e.to_string()))?;
            return read_multipart(multipart).await;
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| PayloadRejection::Json(e.to_string()))?;
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        if !(content_type.is_empty() || content_type.starts_with("application/json") || content_type.contains("+json")) {
            return Err(PayloadRejection::UnsupportedMediaType(content_type));
        }
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(fields)) => Ok(Self { fields, files: Vec::new() }),
            Ok(other) => Err(PayloadRejection::NotAnObject(validation::type_name(&other))),
            Err(e) => Err(PayloadRejection::Json(e.to_string())),
        }
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<RequestPayload, PayloadRejection> {
    let mut payload = RequestPayload::default();
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| PayloadRejection::Multipart(e.to_string()))?
    {
        let Some(name) = field.name().map(str::to_owned) else { continue };
        if let Some(file_name) = field.file_name().map(str::to_owned) {
            let mut size = 0;
            while let Some(chunk) = field.chunk().await.map_err(|e| PayloadRejection::Multipart(e.to_string()))? {
                size += chunk.len();
                // An oversized avatar rejects the request, so the rest of the body is never needed.
                if name == "avatar" && size > MAX_AVATAR_BYTES {
                    tracing::debug!(file_name = %file_name, size, "avatar over limit, body left unread");
                    payload.files.push(UploadedFile { field: name, file_name: Some(file_name), size });
                    return Ok(payload);
                }
            }
            tracing::debug!(field = %name, file_name = %file_name, size, "received upload");
            payload.files.push(UploadedFile { field: name, file_name: Some(file_name), size });
        } else {
            let text = field.text().await.map_err(|e| PayloadRejection::Multipart(e.to_string()))?;
            payload.push_text(name, text);
        }
    }
    Ok(payload)
}
