#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, StatusCode, header},
};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tollgate::config::Config;
use tollgate::db::Storage;
use tollgate::fetch::{GuardedFetcher, Resolver};
use tollgate::service::MemoryMailer;
use tower::ServiceExt;

pub struct TestApp {
    pub app: Router,
    pub mailer: MemoryMailer,
    pub config: Config,
    pub dir: TempDir,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_app_with(tweak: impl FnOnce(&mut Config)) -> TestApp {
    build_app(tweak, None).await
}

/// App whose fetcher looks names up through `resolver` instead of system DNS.
pub async fn spawn_app_with_resolver(resolver: Arc<dyn Resolver>) -> TestApp {
    build_app(|_| {}, Some(resolver)).await
}

async fn build_app(tweak: impl FnOnce(&mut Config), resolver: Option<Arc<dyn Resolver>>) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");

    // Keep test behavior stable regardless of the repo's runtime `config.toml`.
    let mut config = Config::default();
    config.server.insecure_cookie = true;
    config.server.public_base_url = "https://app.test".to_string();
    config.database.url = "sqlite::memory:".to_string();
    config.upload.dir = dir.path().join("uploads");
    config.upload.thumb_dir = dir.path().join("uploads").join("thumbs");
    config.logging.file = None;
    tweak(&mut config);

    let storage = Storage::connect(&config.database.url)
        .await
        .expect("in-memory database");
    let mailer = MemoryMailer::new();
    let mut state = tollgate::AppState::new(config.clone(), storage, Arc::new(mailer.clone()));
    if let Some(resolver) = resolver {
        state = state.with_fetcher(GuardedFetcher::with_resolver(config.fetch.clone(), resolver));
    }
    TestApp {
        app: tollgate::tollgate_router(state),
        mailer,
        config,
        dir,
    }
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(req).await.expect("router is infallible")
    }

    pub async fn post_json(&self, uri: &str, body: Value, cookie: Option<&str>) -> Response<Body> {
        let mut req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        self.send(req.body(Body::from(body.to_string())).unwrap()).await
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut req = Request::builder().method("GET").uri(uri);
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) {
        let resp = self
            .post_json(
                "/api/auth/register",
                serde_json::json!({ "username": username, "email": email, "password": password }),
                None,
            )
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    /// Log in and return the `name=value` pair of the session cookie.
    pub async fn login(&self, identifier: &str, password: &str) -> String {
        let resp = self
            .post_json(
                "/api/auth/login",
                serde_json::json!({ "identifier": identifier, "password": password }),
                None,
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        session_cookie(&resp).expect("login sets a session cookie")
    }
}

pub fn session_cookie(resp: &Response<Body>) -> Option<String> {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("tollgate_session="))
        .and_then(|v| v.split(';').next())
        .map(str::to_owned)
}

pub async fn json_body(resp: Response<Body>) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}
