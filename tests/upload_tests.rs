mod common;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use common::{TestApp, json_body, spawn_app, spawn_app_with};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

const BOUNDARY: &str = "tollgate-test-boundary";

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn multipart(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn upload(app: &TestApp, cookie: Option<&str>, body: Vec<u8>) -> axum::http::Response<Body> {
    let mut req = Request::builder()
        .method("POST")
        .uri("/api/uploads")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(c) = cookie {
        req = req.header(header::COOKIE, c);
    }
    app.send(req.body(Body::from(body)).unwrap()).await
}

async fn logged_in(app: &TestApp) -> String {
    app.register("kit", "kit@example.com", "correct-horse").await;
    app.login("kit", "correct-horse").await
}

#[tokio::test]
async fn png_upload_stores_original_and_bounded_thumbnail() {
    let app = spawn_app().await;
    let cookie = logged_in(&app).await;

    let resp = upload(
        &app,
        Some(&cookie),
        multipart("image", "../../holiday photo.png", "image/png", &png(400, 300)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = json_body(resp).await;
    let up = &body["upload"];
    assert_eq!(up["width"], 400);
    assert_eq!(up["height"], 300);
    assert_eq!(up["thumb_width"], 200);
    assert_eq!(up["thumb_height"], 150);
    assert_eq!(up["original_name"], "holiday photo.png");

    let thumb_url = up["thumb_url"].as_str().unwrap().to_string();
    let resp = app.get(&thumb_url, None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let thumb = image::load_from_memory(&bytes).unwrap();
    assert_eq!((thumb.width(), thumb.height()), (200, 150));

    let original_url = up["url"].as_str().unwrap().to_string();
    assert_eq!(app.get(&original_url, None).await.status(), StatusCode::OK);

    let resp = app.get("/api/uploads", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["uploads"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn small_images_are_not_upscaled() {
    let app = spawn_app().await;
    let cookie = logged_in(&app).await;

    let resp = upload(&app, Some(&cookie), multipart("image", "tiny.png", "image/png", &png(20, 10))).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = json_body(resp).await;
    assert_eq!(body["upload"]["thumb_width"], 20);
    assert_eq!(body["upload"]["thumb_height"], 10);
}

#[tokio::test]
async fn oversized_upload_is_rejected_before_touching_disk() {
    let app = spawn_app_with(|cfg| cfg.upload.max_bytes = 1024).await;
    let cookie = logged_in(&app).await;

    let resp = upload(
        &app,
        Some(&cookie),
        multipart("image", "big.png", "image/png", &vec![0u8; 4096]),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json_body(resp).await["error"]["code"], "PAYLOAD_TOO_LARGE");
    assert!(!app.config.upload.dir.exists());
}

#[tokio::test]
async fn content_must_match_the_declared_type() {
    let app = spawn_app().await;
    let cookie = logged_in(&app).await;

    let resp = upload(
        &app,
        Some(&cookie),
        multipart("image", "fake.png", "image/png", b"<?php echo 'hi'; ?>"),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let resp = upload(
        &app,
        Some(&cookie),
        multipart("image", "x.svg", "image/svg+xml", &png(4, 4)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let resp = upload(
        &app,
        Some(&cookie),
        multipart("image", "x.jpg", "image/jpeg", &png(4, 4)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(!app.config.upload.dir.exists());
}

#[tokio::test]
async fn missing_field_and_missing_session() {
    let app = spawn_app().await;
    let resp = upload(&app, None, multipart("image", "a.png", "image/png", &png(4, 4))).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let cookie = logged_in(&app).await;
    let resp = upload(&app, Some(&cookie), multipart("avatar", "a.png", "image/png", &png(4, 4))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn static_routes_only_serve_generated_names() {
    let app = spawn_app().await;
    assert_eq!(app.get("/uploads/notes.txt", None).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        app.get("/uploads/0123456789abcdef0123456789abcdef.png", None)
            .await
            .status(),
        StatusCode::NOT_FOUND
    );
}
