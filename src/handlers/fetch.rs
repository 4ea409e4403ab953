use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::fetch::FetchOutcome;
use crate::middleware::{CurrentUser, Input};
use crate::{TollgateError, router::AppState};

#[derive(Debug, Deserialize)]
pub struct FetchRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct FetchResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: FetchOutcome,
}

/// POST /api/fetch
pub async fn fetch_url(
    State(state): State<AppState>,
    current: CurrentUser,
    Input(req): Input<FetchRequest>,
) -> Result<Json<FetchResponse>, TollgateError> {
    info!(user_id = current.user.id, "fetch requested");
    let outcome = state.fetcher.fetch(&req.url).await?;
    Ok(Json(FetchResponse {
        success: true,
        outcome,
    }))
}
