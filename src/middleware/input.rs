use axum::{
    Form, Json,
    extract::{FromRef, FromRequest, Request},
    http::{StatusCode, header::CONTENT_TYPE},
};
use serde::de::DeserializeOwned;

use crate::error::TollgateError;
use crate::router::AppState;

/// Request body from either a JSON document or an urlencoded form.
///
/// Rejections are reported through the crate's JSON error envelope instead
/// of axum's plain-text defaults.
pub struct Input<T>(pub T);

fn is_form(req: &Request) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

fn rejection(status: StatusCode, text: String, limit: usize) -> TollgateError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        TollgateError::PayloadTooLarge { limit }
    } else {
        TollgateError::MalformedPayload(text)
    }
}

impl<T, S> FromRequest<S> for Input<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = TollgateError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let limit = AppState::from_ref(state).config.server.body_limit_bytes;
        if is_form(&req) {
            match Form::<T>::from_request(req, state).await {
                Ok(Form(v)) => Ok(Input(v)),
                Err(r) => Err(rejection(r.status(), r.body_text(), limit)),
            }
        } else {
            match Json::<T>::from_request(req, state).await {
                Ok(Json(v)) => Ok(Input(v)),
                Err(r) => Err(rejection(r.status(), r.body_text(), limit)),
            }
        }
    }
}
