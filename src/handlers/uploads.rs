use axum::{
    Json,
    extract::{
        Multipart, Path, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{
        StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS},
    },
    response::IntoResponse,
};
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::debug;

use crate::db::UploadRow;
use crate::middleware::CurrentUser;
use crate::upload::fit_within;
use crate::{TollgateError, router::AppState};

const IMAGE_FIELD: &str = "image";

static STORED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{32}\.(png|jpg|gif|webp)$").expect("stored name pattern is valid")
});

#[derive(Debug, Serialize)]
pub struct UploadView {
    pub id: i64,
    pub original_name: String,
    pub url: String,
    pub thumb_url: String,
    pub mime: String,
    pub width: i64,
    pub height: i64,
    pub thumb_width: u32,
    pub thumb_height: u32,
    pub bytes: i64,
    pub created_at: String,
}

impl UploadView {
    fn new(row: &UploadRow, thumb_max: (u32, u32)) -> Self {
        let (thumb_width, thumb_height) = fit_within(
            u32::try_from(row.width).unwrap_or(0),
            u32::try_from(row.height).unwrap_or(0),
            thumb_max.0,
            thumb_max.1,
        );
        Self {
            id: row.id,
            original_name: row.original_name.clone(),
            url: format!("/uploads/{}", row.stored_name),
            thumb_url: format!("/uploads/thumbs/{}", row.thumb_name),
            mime: row.mime.clone(),
            width: row.width,
            height: row.height,
            thumb_width,
            thumb_height,
            bytes: row.bytes,
            created_at: row.created_at.to_rfc3339(),
        }
    }
}

fn thumb_max(state: &AppState) -> (u32, u32) {
    (
        state.config.upload.thumb_max_width,
        state.config.upload.thumb_max_height,
    )
}

fn multipart_error(status: StatusCode, text: String, limit: usize) -> TollgateError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        TollgateError::PayloadTooLarge { limit }
    } else {
        TollgateError::BadRequest(text)
    }
}

fn field_error(e: MultipartError, limit: usize) -> TollgateError {
    multipart_error(e.status(), e.body_text(), limit)
}

/// POST /api/uploads (multipart, field `image`).
pub async fn upload_image(
    State(state): State<AppState>,
    current: CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, TollgateError> {
    let limit = state.uploads.max_bytes();
    let mut multipart = multipart.map_err(|r| multipart_error(r.status(), r.body_text(), limit))?;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| field_error(e, limit))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            debug!(name = ?field.name(), "skipping multipart field");
            continue;
        }

        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(str::to_owned);
        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(|e| field_error(e, limit))? {
            if bytes.len() + chunk.len() > limit {
                return Err(TollgateError::PayloadTooLarge { limit });
            }
            bytes.extend_from_slice(&chunk);
        }

        let row = state
            .uploads
            .store(
                Some(current.user.id),
                file_name.as_deref(),
                content_type.as_deref(),
                bytes,
            )
            .await?;
        return Ok((
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "upload": UploadView::new(&row, thumb_max(&state)),
            })),
        ));
    }

    Err(TollgateError::BadRequest(format!(
        "missing multipart field `{IMAGE_FIELD}`"
    )))
}

/// GET /api/uploads
pub async fn list_uploads(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, TollgateError> {
    let max = thumb_max(&state);
    let uploads: Vec<UploadView> = state
        .uploads
        .list(current.user.id)
        .await?
        .iter()
        .map(|row| UploadView::new(row, max))
        .collect();
    Ok(Json(json!({ "success": true, "uploads": uploads })))
}

/// GET /uploads/{name}
pub async fn serve_original(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, TollgateError> {
    serve_stored(state.config.upload.dir.clone(), name).await
}

/// GET /uploads/thumbs/{name}
pub async fn serve_thumbnail(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, TollgateError> {
    serve_stored(state.config.upload.thumb_dir.clone(), name).await
}

fn content_type_for(name: &str) -> &'static str {
    match name.rsplit('.').next() {
        Some("jpg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

/// Only names this service generated are served, so paths can't escape `dir`.
async fn serve_stored(dir: PathBuf, name: String) -> Result<impl IntoResponse, TollgateError> {
    if !STORED_NAME.is_match(&name) {
        return Err(TollgateError::NotFound);
    }
    let bytes = match tokio::fs::read(dir.join(&name)).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(TollgateError::NotFound),
        Err(e) => return Err(e.into()),
    };
    Ok((
        [
            (CONTENT_TYPE, content_type_for(&name)),
            (X_CONTENT_TYPE_OPTIONS, "nosniff"),
            (CACHE_CONTROL, "private, max-age=3600"),
        ],
        bytes,
    ))
}
