//! Public download of uploaded objects at `/files/:bucket/*path`.
//!
//! Only used when objects are kept in memory; a storage directory is served
//! straight from disk instead.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::header,
    response::IntoResponse,
};

use quickdrop_infra::storage::{Bucket, StorageError};

use crate::app::errors;
use crate::app::routes::common::HandlerResult;
use crate::app::services::AppServices;

pub async fn download(
    Extension(services): Extension<Arc<AppServices>>,
    Path((bucket, path)): Path<(String, String)>,
) -> HandlerResult {
    let bucket: Bucket = bucket.parse().map_err(|_| errors::not_found("file"))?;
    match services.storage.read(bucket, path.trim_start_matches('/')).await {
        Ok(Some(object)) => {
            Ok(([(header::CONTENT_TYPE, object.content_type)], object.bytes).into_response())
        }
        Ok(None) | Err(StorageError::InvalidPath(_)) => Err(errors::not_found("file")),
        Err(e) => Err(errors::storage_error_to_response(e)),
    }
}
