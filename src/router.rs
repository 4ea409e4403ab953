use crate::config::Config;
use crate::db::Storage;
use crate::fetch::GuardedFetcher;
use crate::handlers::{auth, fetch, health, password_reset, payload, uploads};
use crate::payload::PayloadSchema;
use crate::service::{AccountService, Mailer, PasswordResetService};
use crate::upload::UploadService;
use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, post},
};
use axum_extra::extract::cookie::Key;
use std::sync::Arc;
use tracing::warn;

/// Multipart framing on top of the image itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub accounts: Arc<AccountService>,
    pub resets: Arc<PasswordResetService>,
    pub uploads: Arc<UploadService>,
    pub fetcher: Arc<GuardedFetcher>,
    pub payload_schema: Arc<PayloadSchema>,
    key: Key,
}

impl AppState {
    pub fn new(config: Config, storage: Storage, mailer: Arc<dyn Mailer>) -> Self {
        let key = match config.server.cookie_key_bytes() {
            Some(bytes) => Key::from(bytes.as_slice()),
            None => {
                if config.server.cookie_key.is_some() {
                    warn!("server.cookie_key must be base64 of at least 64 bytes; using a random key");
                }
                Key::generate()
            }
        };

        Self {
            accounts: Arc::new(AccountService::new(storage.clone(), config.auth.clone())),
            resets: Arc::new(PasswordResetService::new(
                storage.clone(),
                config.auth.clone(),
                config.server.public_base_url.clone(),
                mailer,
            )),
            uploads: Arc::new(UploadService::new(config.upload.clone(), storage)),
            fetcher: Arc::new(GuardedFetcher::new(config.fetch.clone())),
            payload_schema: Arc::new(PayloadSchema::profile()),
            config: Arc::new(config),
            key,
        }
    }

    pub fn with_fetcher(mut self, fetcher: GuardedFetcher) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    pub fn secure_cookies(&self) -> bool {
        !self.config.server.insecure_cookie
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.key.clone()
    }
}

pub fn tollgate_router(state: AppState) -> Router {
    let upload_limit = state.config.upload.max_bytes + MULTIPART_OVERHEAD;
    let body_limit = state.config.server.body_limit_bytes;

    let upload_routes = Router::new()
        .route(
            "/api/uploads",
            post(uploads::upload_image).get(uploads::list_uploads),
        )
        .layer(DefaultBodyLimit::max(upload_limit));

    Router::new()
        .route("/health", get(health::health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/password-reset/request", post(password_reset::request_reset))
        .route("/api/password-reset/confirm", post(password_reset::confirm_reset))
        .route("/api/payload", post(payload::ingest_payload))
        .route("/api/fetch", post(fetch::fetch_url))
        .route("/uploads/{name}", get(uploads::serve_original))
        .route("/uploads/thumbs/{name}", get(uploads::serve_thumbnail))
        .merge(upload_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
