use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, RgbImage};
use serde_json::{json, Value};
use tower::ServiceExt;
use wed_blob::MemoryBlobStore;
use wed_core::{RetryPolicy, WedConfig};
use wed_gallery::backend::{BackendOp, MemoryBackend};
use wed_gallery::config::apply_env;
use wed_gallery::{build_with, GalleryConfig, GalleryState};

const BOUNDARY: &str = "wedshare-test-boundary";

struct Harness {
    router: Router,
    backend: MemoryBackend,
    store: MemoryBlobStore,
}

fn harness_with(tweak: impl FnOnce(&mut GalleryConfig)) -> Harness {
    let mut wed_config = WedConfig::new();
    apply_env(&mut wed_config, |name| match name {
        "BACKEND_MODE" | "STORAGE_MODE" => Some("memory".to_string()),
        "JWT_SECRET" => Some("http-tests".to_string()),
        _ => None,
    });
    let mut config = GalleryConfig::from_snapshot(&wed_config.snapshot()).unwrap();
    config.blob = config.blob.clone().with_retry(RetryPolicy::none());
    tweak(&mut config);

    let backend = MemoryBackend::new().with_admin("couple", "hunter2");
    let store = MemoryBlobStore::new("wed");
    let state = GalleryState::new(&config, Arc::new(backend.clone()), Arc::new(store.clone())).unwrap();
    let ax = build_with(wed_axum::axum(&wed_config), state);

    Harness {
        router: ax.router,
        backend,
        store,
    }
}

fn harness() -> Harness {
    harness_with(|_| {})
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 180, 160])))
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn multipart(fields: &[(&str, &str)], files: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
        );
    }
    for (filename, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(res: Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn set_cookie(res: &Response, name: &str) -> Option<String> {
    res.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|c| c.starts_with(&format!("{name}=")))
        .map(str::to_string)
}

fn cookie_value(set_cookie: &str) -> String {
    let pair = set_cookie.split(';').next().unwrap_or_default();
    pair.split_once('=').map(|(_, v)| v.to_string()).unwrap_or_default()
}

/// Cookies and CSRF token of a logged-in admin
struct Admin {
    session: String,
    csrf: String,
}

impl Admin {
    fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(COOKIE, format!("admin_session={}; csrf_token={}", self.session, self.csrf))
            .header("x-csrf-token", &self.csrf);
        match body {
            Some(json) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }
}

async fn login(router: &Router) -> Admin {
    let res = router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/admin/login")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"username": "couple", "password": "hunter2"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let session = set_cookie(&res, "admin_session").expect("session cookie");
    assert!(session.contains("HttpOnly"));
    let csrf = set_cookie(&res, "csrf_token").expect("csrf cookie");

    Admin {
        session: cookie_value(&session),
        csrf: cookie_value(&csrf),
    }
}

async fn submit_guest_photos(h: &Harness, category: &str, count: usize) -> Value {
    let files: Vec<(String, Vec<u8>)> = (0..count).map(|n| (format!("guest{n}.png"), png(8, 6))).collect();
    let files: Vec<(&str, Vec<u8>)> = files.iter().map(|(n, b)| (n.as_str(), b.clone())).collect();
    let res = h
        .router
        .clone()
        .oneshot(upload_request("/api/uploads", multipart(&[("categoryId", category)], &files)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    json_body(res).await
}

#[tokio::test]
async fn health_is_ok() {
    let h = harness();
    let res = h
        .router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn oversized_file_fails_alone() {
    let h = harness_with(|c| c.max_file_bytes = 4 * 1024);
    let category = h.backend.seed_category("Ceremony");

    let body = multipart(
        &[("categoryId", category.as_str()), ("lastModified", "1717236000000")],
        &[
            ("first.png", png(8, 6)),
            ("huge.jpg", vec![0xFF; 64 * 1024]),
            ("third.png", png(8, 6)),
        ],
    );
    let res = h.router.clone().oneshot(upload_request("/api/uploads", body)).await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let report = json_body(res).await;
    assert_eq!(report["totalSuccess"], 2);
    assert_eq!(report["totalFailed"], 1);
    assert_eq!(report["registered"], 2);
    assert_eq!(report["items"][0]["id"], "first.png-1717236000000");
    assert_eq!(report["items"][1]["status"], "error");
    assert_eq!(report["items"][1]["reason"], "too-large");
    assert!(report["items"][1]["error"].as_str().unwrap().contains("huge.jpg"));
    assert_eq!(report["items"][2]["status"], "completed");

    assert_eq!(h.store.len(), 2);
    assert!(h.store.keys().iter().all(|k| k.starts_with("user_images/")));
    let images = h.backend.images();
    assert_eq!(images.len(), 2);
    assert!(images.iter().all(|i| !i.approved));
}

#[tokio::test]
async fn unreadable_files_only_is_unprocessable() {
    let h = harness();
    let category = h.backend.seed_category("Party");

    let body = multipart(&[("categoryId", category.as_str())], &[("notes.png", b"definitely not a picture".to_vec())]);
    let res = h.router.clone().oneshot(upload_request("/api/uploads", body)).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let err = json_body(res).await;
    assert_eq!(err["data"]["items"][0]["reason"], "unsupported-format");
    assert_eq!(h.backend.calls(BackendOp::AddImages), 0);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn missing_category_is_rejected_before_upload() {
    let h = harness();
    let body = multipart(&[], &[("a.png", png(4, 4))]);
    let res = h.router.clone().oneshot(upload_request("/api/uploads", body)).await.unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["message"], "Please select a category.");
    assert_eq!(h.store.put_calls(), 0);
}

#[tokio::test]
async fn registration_failure_is_a_consistency_error() {
    let h = harness();
    let category = h.backend.seed_category("Dinner");
    h.backend
        .fail_next(BackendOp::AddImages, 1, wed_core::ErrorKind::Unavailable);

    let body = multipart(&[("categoryId", category.as_str())], &[("toast.png", png(8, 6))]);
    let res = h.router.clone().oneshot(upload_request("/api/uploads", body)).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);

    let err = json_body(res).await;
    assert_eq!(err["name"], "BackendConsistency");
    assert_eq!(err["data"]["orphanedUrls"].as_array().unwrap().len(), 1);

    for _ in 0..100 {
        if h.store.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(h.store.is_empty(), "orphaned upload should be cleaned up");
}

#[tokio::test]
async fn approve_and_reject_flow() {
    let h = harness();
    let category = h.backend.seed_category("Ceremony");
    submit_guest_photos(&h, &category, 2).await;
    let admin = login(&h.router).await;

    let res = h
        .router
        .clone()
        .oneshot(admin.request(Method::GET, "/api/admin/moderation", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let batch = json_body(res).await;
    let images = batch["images"].as_array().unwrap().clone();
    assert_eq!(images.len(), 2);
    let keep = images[0]["id"].as_str().unwrap().to_string();
    let drop = images[1]["id"].as_str().unwrap().to_string();
    let drop_url = images[1]["url"].as_str().unwrap().to_string();

    let res = h
        .router
        .clone()
        .oneshot(admin.request(
            Method::POST,
            &format!("/api/admin/moderation/{keep}/decision"),
            Some(json!({"approve": true})),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = h
        .router
        .clone()
        .oneshot(admin.request(
            Method::POST,
            &format!("/api/admin/moderation/{drop}/decision"),
            Some(json!({"approve": false})),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let decided = json_body(res).await;
    assert_eq!(decided["result"]["state"], "rejected");
    assert_eq!(decided["summary"]["unreviewed"], 0);
    assert_eq!(decided["summary"]["approved"], 1);

    // deciding twice is a conflict
    let res = h
        .router
        .clone()
        .oneshot(admin.request(
            Method::POST,
            &format!("/api/admin/moderation/{drop}/decision"),
            Some(json!({"approve": true})),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = h
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/categories/{category}/images"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let gallery = json_body(res).await;
    assert_eq!(gallery["totalApproved"], 1);
    assert_eq!(gallery["images"][0]["id"], keep.as_str());

    assert_eq!(h.store.len(), 1);
    assert!(!h.store.keys().iter().any(|k| drop_url.ends_with(k.as_str())));
    assert_eq!(h.backend.calls(BackendOp::Decide), 2);
}

#[tokio::test]
async fn unauthenticated_decision_changes_nothing() {
    let h = harness();
    let category = h.backend.seed_category("Ceremony");
    let id = h.backend.seed_image("https://wed.memory.local/user_images/a.webp", &category, false);

    let res = h
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(format!("/api/admin/moderation/{id}/decision"))
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"approve": true}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(res).await["name"], "NotAuthenticated");
    assert_eq!(h.backend.calls(BackendOp::Decide), 0);
    assert!(!h.backend.image(&id).unwrap().approved);
}

#[tokio::test]
async fn csrf_mismatch_is_forbidden() {
    let h = harness();
    let category = h.backend.seed_category("Ceremony");
    let id = h.backend.seed_image("https://wed.memory.local/user_images/a.webp", &category, false);
    let admin = login(&h.router).await;

    let mut req = admin.request(
        Method::POST,
        &format!("/api/admin/moderation/{id}/decision"),
        Some(json!({"approve": true})),
    );
    req.headers_mut().insert("x-csrf-token", "forged".parse().unwrap());
    let res = h.router.clone().oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(h.backend.calls(BackendOp::Decide), 0);
}

#[tokio::test]
async fn wrong_password_is_401() {
    let h = harness();
    let res = h
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/admin/login")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"username": "couple", "password": "nope"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookie(&res, "admin_session").is_none());
}

#[tokio::test]
async fn logout_clears_cookies() {
    let h = harness();
    let admin = login(&h.router).await;

    let res = h
        .router
        .clone()
        .oneshot(admin.request(Method::POST, "/api/admin/logout", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(set_cookie(&res, "admin_session").unwrap().contains("Max-Age=0"));
    assert!(set_cookie(&res, "csrf_token").unwrap().contains("Max-Age=0"));
}

#[tokio::test]
async fn category_delete_removes_stored_photos() {
    let h = harness();
    let category = h.backend.seed_category("Rehearsal");
    submit_guest_photos(&h, &category, 2).await;
    assert_eq!(h.store.len(), 2);
    let admin = login(&h.router).await;

    let res = h
        .router
        .clone()
        .oneshot(admin.request(Method::DELETE, &format!("/api/admin/categories/{category}"), None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["removedObjects"], 2);
    assert!(h.store.is_empty());
    assert!(h.backend.images().is_empty());
}

#[tokio::test]
async fn carousel_upload_is_listed_publicly() {
    let h = harness();
    let admin = login(&h.router).await;

    let mut req = upload_request("/api/admin/carousel/upload", multipart(&[], &[("hero.png", png(16, 9))]));
    req.headers_mut().insert(
        COOKIE,
        format!("admin_session={}; csrf_token={}", admin.session, admin.csrf).parse().unwrap(),
    );
    req.headers_mut().insert("x-csrf-token", admin.csrf.parse().unwrap());
    let res = h.router.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let added = json_body(res).await;

    let res = h
        .router
        .clone()
        .oneshot(Request::builder().uri("/api/carousel").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let listed = json_body(res).await;
    assert_eq!(listed["carouselImages"][0]["id"], added["id"]);
    assert!(h.store.keys()[0].starts_with("carousel_images/"));
}

#[tokio::test]
async fn public_category_create_returns_its_own_id() {
    let h = harness();
    let create = |name: &str| {
        Request::builder()
            .method(Method::POST)
            .uri("/api/categories")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "name": name }).to_string()))
            .unwrap()
    };

    let first = json_body(h.router.clone().oneshot(create("Toasts")).await.unwrap()).await;
    let second = json_body(h.router.clone().oneshot(create("Toasts")).await.unwrap()).await;
    assert_ne!(first["id"], second["id"]);
    assert_eq!(second["categories"].as_array().unwrap().len(), 2);

    let res = h.router.clone().oneshot(create("   ")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
