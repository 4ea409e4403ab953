use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::middleware::Input;
use crate::{TollgateError, router::AppState};

const REQUEST_ACK: &str = "If that address is registered, a reset link has been sent.";

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetConfirm {
    pub token: String,
    #[serde(alias = "new_password")]
    pub password: String,
}

/// POST /api/password-reset/request
pub async fn request_reset(
    State(state): State<AppState>,
    Input(req): Input<ResetRequest>,
) -> Result<Json<Value>, TollgateError> {
    state.resets.request(&req.email).await?;
    Ok(Json(json!({ "success": true, "message": REQUEST_ACK })))
}

/// POST /api/password-reset/confirm
pub async fn confirm_reset(
    State(state): State<AppState>,
    Input(req): Input<ResetConfirm>,
) -> Result<Json<Value>, TollgateError> {
    state.resets.confirm(&req.token, &req.password).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Password updated. Please log in again."
    })))
}
