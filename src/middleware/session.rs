use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, Key, PrivateCookieJar, SameSite};
use std::convert::Infallible;
use time::Duration;

use crate::db::UserRow;
use crate::error::TollgateError;
use crate::router::AppState;

pub const SESSION_COOKIE: &str = "tollgate_session";

/// The authenticated caller, resolved from the encrypted session cookie.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: UserRow,
    pub session_id: String,
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
    Key: FromRef<S>,
{
    type Rejection = TollgateError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = PrivateCookieJar::<Key>::from_request_parts(parts, state)
            .await
            .unwrap_or_else(|never: Infallible| match never {});
        let session_id = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_owned())
            .ok_or(TollgateError::Unauthenticated)?;

        let app = AppState::from_ref(state);
        let user = app
            .accounts
            .resolve_session(&session_id)
            .await?
            .ok_or(TollgateError::Unauthenticated)?;
        Ok(Self { user, session_id })
    }
}

pub fn session_cookie(value: String, ttl: chrono::Duration, secure: bool) -> Cookie<'static> {
    Cookie::build(Cookie::new(SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(Duration::seconds(ttl.num_seconds()))
        .build()
}

pub fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build(Cookie::new(SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}
