use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::PrivateCookieJar;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::middleware::{CurrentUser, Input, SESSION_COOKIE, clear_session_cookie, session_cookie};
use crate::service::UserView;
use crate::{TollgateError, router::AppState};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email.
    #[serde(alias = "username", alias = "email")]
    pub identifier: String,
    pub password: String,
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Input(req): Input<RegisterRequest>,
) -> Result<impl IntoResponse, TollgateError> {
    let user = state
        .accounts
        .register(&req.username, &req.email, &req.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "user": UserView::from(&user) })),
    ))
}

/// POST /api/auth/login -> issues a fresh session cookie.
pub async fn login(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Input(req): Input<LoginRequest>,
) -> Result<impl IntoResponse, TollgateError> {
    let user = state.accounts.authenticate(&req.identifier, &req.password).await?;

    let previous = jar.get(SESSION_COOKIE).map(|c| c.value().to_owned());
    let session = state
        .accounts
        .start_session(user.id, previous.as_deref())
        .await?;

    let jar = jar.add(session_cookie(
        session.id,
        state.accounts.session_ttl(),
        state.secure_cookies(),
    ));
    info!(user_id = user.id, "user logged in");
    Ok((
        jar,
        Json(json!({ "success": true, "user": UserView::from(&user) })),
    ))
}

/// POST /api/auth/logout. Succeeds without a session too.
pub async fn logout(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<impl IntoResponse, TollgateError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.accounts.end_session(cookie.value()).await?;
    }
    Ok((
        jar.remove(clear_session_cookie()),
        Json(json!({ "success": true })),
    ))
}

/// GET /api/auth/me
pub async fn me(current: CurrentUser) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "user": UserView::from(&current.user) }))
}
