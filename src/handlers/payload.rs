use axum::{
    Json,
    body::Bytes,
    extract::{State, rejection::BytesRejection},
    http::StatusCode,
};
use serde_json::{Value, json};

use crate::payload::process;
use crate::{TollgateError, router::AppState};

/// POST /api/payload -> validated, sanitised record plus its HTML rendering.
pub async fn ingest_payload(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Value>, TollgateError> {
    let body = body.map_err(|r| {
        if r.status() == StatusCode::PAYLOAD_TOO_LARGE {
            TollgateError::PayloadTooLarge {
                limit: state.config.server.body_limit_bytes,
            }
        } else {
            TollgateError::MalformedPayload(r.body_text())
        }
    })?;
    let processed = process(&state.payload_schema, &body)?;
    Ok(Json(json!({
        "success": true,
        "data": processed.data,
        "html": processed.html,
    })))
}
