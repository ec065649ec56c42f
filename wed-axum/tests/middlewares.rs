use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
use axum::http::{HeaderValue, Request};
use axum::routing::{get, post};
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use wed_auth::{AdminIdentity, CsrfGuard, SessionManager, SessionOptions};
use wed_axum::middlewares::{AdminSession, CsrfLayer, SessionGateLayer, UploadForm};
use wed_axum::{axum, AxumApp, WedAxumError};
use wed_core::{WedConfig, WedError};

async fn json_body(res: axum::response::Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn sessions() -> Arc<SessionManager> {
    Arc::new(SessionManager::new(SessionOptions::default().with_secret("middleware-tests")).unwrap())
}

fn app(sessions: Arc<SessionManager>, hits: Arc<AtomicUsize>) -> AxumApp {
    let admin = Router::new()
        .route("/whoami", get(|AdminSession(claims): AdminSession| async move { Json(json!({"user": claims.user})) }))
        .route(
            "/mutate",
            post(move || {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(json!({"ok": true}))
                }
            }),
        )
        .layer(CsrfLayer::new(Arc::new(CsrfGuard::default())))
        .layer(SessionGateLayer::new(sessions));

    let public = Router::new()
        .route("/boom", get(|| async { Err::<Json<Value>, _>(WedAxumError::from(anyhow::anyhow!("boom"))) }))
        .route(
            "/conflict",
            get(|| async { Err::<Json<Value>, _>(WedAxumError::from(WedError::conflict("already decided"))) }),
        )
        .route(
            "/form",
            post(|form: UploadForm| async move {
                Json(json!({
                    "category": form.text("categoryId"),
                    "files": form.files.iter().map(|f| json!({"name": f.filename, "size": f.bytes.len()})).collect::<Vec<_>>(),
                }))
            }),
        );

    axum(&WedConfig::new())
        .use_router("/admin", admin)
        .use_router("/public", public)
        .service("/health", || async { "ok" })
        .traced()
}

fn token_for(sessions: &SessionManager) -> String {
    sessions
        .issue(&AdminIdentity {
            id: "1".into(),
            username: "couple".into(),
        })
        .unwrap()
        .token
}

#[tokio::test]
async fn missing_session_is_401_json_with_request_id() {
    let ax = app(sessions(), Arc::default());
    let res = ax
        .router
        .oneshot(Request::builder().uri("/admin/whoami").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 401);
    assert!(res.headers().get("x-request-id").is_some());
    assert!(res.headers().get(SET_COOKIE).is_none());
    let body = json_body(res).await;
    assert_eq!(body["name"], "NotAuthenticated");
    assert_eq!(body["className"], "not-authenticated");
}

#[tokio::test]
async fn browser_navigation_is_redirected_to_login() {
    let ax = app(sessions(), Arc::default());
    let res = ax
        .router
        .oneshot(
            Request::builder()
                .uri("/admin/whoami")
                .header("accept", "text/html,application/xhtml+xml")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 303);
    assert_eq!(res.headers().get(LOCATION).unwrap(), "/admin");
}

#[tokio::test]
async fn invalid_cookie_is_cleared() {
    let ax = app(sessions(), Arc::default());
    let res = ax
        .router
        .oneshot(
            Request::builder()
                .uri("/admin/whoami")
                .header(COOKIE, "admin_session=not.a.jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 401);
    let cleared = res.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cleared.starts_with("admin_session=;"));
    assert!(cleared.contains("Max-Age=0"));
}

#[tokio::test]
async fn valid_session_reaches_the_handler() {
    let sessions = sessions();
    let token = token_for(&sessions);
    let ax = app(sessions, Arc::default());

    let res = ax
        .router
        .oneshot(
            Request::builder()
                .uri("/admin/whoami")
                .header(COOKIE, format!("admin_session={token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 200);
    let csrf = res.headers().get(SET_COOKIE).unwrap().to_str().unwrap().to_string();
    assert!(csrf.starts_with("csrf_token="));
    assert_eq!(json_body(res).await["user"], "couple");
}

#[tokio::test]
async fn csrf_mismatch_is_rejected_before_the_handler() {
    let sessions = sessions();
    let token = token_for(&sessions);
    let hits = Arc::new(AtomicUsize::new(0));
    let ax = app(sessions, Arc::clone(&hits));

    let res = ax
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/mutate")
                .header(COOKIE, format!("admin_session={token}; csrf_token=aaa"))
                .header("x-csrf-token", "bbb")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 403);
    assert_eq!(json_body(res).await["name"], "Forbidden");
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let res = ax
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/mutate")
                .header(COOKIE, format!("admin_session={token}; csrf_token=aaa"))
                .header("x-csrf-token", "aaa")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn request_id_is_preserved_when_provided() {
    let ax = app(sessions(), Arc::default());
    let provided = HeaderValue::from_static("req-test-123");
    let res = ax
        .router
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", provided.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(res.headers().get("x-request-id").unwrap(), &provided);
}

#[tokio::test]
async fn errors_keep_the_feathers_shape() {
    let ax = app(sessions(), Arc::default());

    let res = ax
        .router
        .clone()
        .oneshot(Request::builder().uri("/public/boom").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 500);
    let body = json_body(res).await;
    assert_eq!(body["name"], "GeneralError");
    assert!(body["message"].as_str().unwrap().contains("boom"));

    let res = ax
        .router
        .oneshot(Request::builder().uri("/public/conflict").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 409);
    assert_eq!(json_body(res).await["className"], "conflict");
}

#[tokio::test]
async fn upload_form_collects_files_and_fields() {
    let ax = app(sessions(), Arc::default());
    let body = concat!(
        "--XBOUNDARY\r\n",
        "Content-Disposition: form-data; name=\"categoryId\"\r\n\r\n",
        "12\r\n",
        "--XBOUNDARY\r\n",
        "Content-Disposition: form-data; name=\"files\"; filename=\"a.jpg\"\r\n",
        "Content-Type: image/jpeg\r\n\r\n",
        "abcd\r\n",
        "--XBOUNDARY\r\n",
        "Content-Disposition: form-data; name=\"files\"; filename=\"b.png\"\r\n",
        "Content-Type: image/png\r\n\r\n",
        "xy\r\n",
        "--XBOUNDARY--\r\n",
    );

    let res = ax
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/public/form")
                .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 200);
    let body = json_body(res).await;
    assert_eq!(body["category"], "12");
    assert_eq!(body["files"], json!([{"name": "a.jpg", "size": 4}, {"name": "b.png", "size": 2}]));
}

#[tokio::test]
async fn upload_form_requires_multipart() {
    let ax = app(sessions(), Arc::default());
    let res = ax
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/public/form")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 415);
}
