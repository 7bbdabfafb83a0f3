use std::collections::HashMap;

use axum::{
    Json,
    body::Bytes,
    extract::Multipart,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use quickdrop_core::{AggregateId, UserId};
use quickdrop_infra::storage::MAX_OBJECT_BYTES;

use crate::app::dto::ListResponse;
use crate::app::errors;

pub type HandlerResult = Result<Response, Response>;

pub fn parse_aggregate_id(raw: &str, what: &str) -> Result<AggregateId, Response> {
    raw.parse().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {what} id"),
        )
    })
}

pub fn parse_user_id(raw: &str) -> Result<UserId, Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid user id"))
}

pub fn ok<T: Serialize>(body: T) -> HandlerResult {
    Ok((StatusCode::OK, Json(body)).into_response())
}

pub fn created<T: Serialize>(body: T) -> HandlerResult {
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

pub fn list<T: Serialize>(items: Vec<T>) -> HandlerResult {
    ok(ListResponse::new(items))
}

/// Decode an optional JSON body; an empty body yields `T::default()`.
pub fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| errors::bad_request(format!("invalid JSON body: {e}")))
}

#[derive(Debug)]
pub struct UploadedFile {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl UploadedFile {
    /// File extension for the stored object, from the declared content type.
    pub fn extension(&self) -> &'static str {
        match self.content_type.as_str() {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/webp" => "webp",
            "application/pdf" => "pdf",
            _ => "bin",
        }
    }
}

/// Text fields plus at most one file part of a multipart form.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub fields: HashMap<String, String>,
    pub file: Option<UploadedFile>,
}

impl UploadForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.trim())
    }

    pub fn require_file(self) -> Result<(HashMap<String, String>, UploadedFile), Response> {
        match self.file {
            Some(file) => Ok((self.fields, file)),
            None => Err(errors::bad_request("missing file part")),
        }
    }
}

/// Read a multipart form. The part named `file_field` is the upload; all
/// other parts are text fields.
pub async fn read_upload(
    mut multipart: Multipart,
    file_field: &str,
) -> Result<UploadForm, Response> {
    let mut form = UploadForm::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(errors::bad_request(format!("malformed multipart body: {e}"))),
        };
        let name = field.name().unwrap_or_default().to_string();

        if name == file_field {
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| errors::bad_request(format!("failed to read upload: {e}")))?;
            if bytes.len() > MAX_OBJECT_BYTES {
                return Err(errors::json_error(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "too_large",
                    format!("uploads are limited to {MAX_OBJECT_BYTES} bytes"),
                ));
            }
            form.file = Some(UploadedFile {
                bytes: bytes.to_vec(),
                content_type,
            });
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| errors::bad_request(format!("failed to read field {name}: {e}")))?;
            form.fields.insert(name, text);
        }
    }
    Ok(form)
}
