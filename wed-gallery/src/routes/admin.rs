//! Admin routes. Everything except `/login` and `/logout` sits behind the
//! session gate; every state-changing call is CSRF-checked.

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use wed_auth::{login as issue_session, LoginRequest, SetCookie};
use wed_axum::middlewares::{append_cookie, AdminSession, CsrfLayer, FormLimit, SessionGateLayer, UploadForm};
use wed_axum::WedAxumError;
use wed_core::{WedError, WedResult};
use wed_imaging::SourceFile;

use super::public::{carousel, create_category, list_categories};
use super::{category_field, source_files};
use crate::backend::BackendAuthenticator;
use crate::carousel::CAROUSEL_PREFIX;
use crate::moderation::Decision;
use crate::routes::public::GUEST_PREFIX;
use crate::state::GalleryState;
use crate::submission::{Submission, SubmissionMode};

/// Folders an admin upload may target.
const UPLOAD_FOLDERS: &[&str] = &[GUEST_PREFIX, CAROUSEL_PREFIX];

pub fn router(state: GalleryState) -> Router<()> {
    let limit = FormLimit(state.form_limit);
    let json_limit = usize::try_from(state.form_limit).unwrap_or(usize::MAX);

    let gated = Router::new()
        .route("/session", get(session))
        .route("/moderation", get(moderation_batch))
        .route("/moderation/next", post(present_next))
        .route("/moderation/{id}/abandon", post(abandon))
        .route("/moderation/{id}/decision", post(decide))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/{id}", delete(delete_category))
        .route("/uploads", post(upload_json).layer(DefaultBodyLimit::max(json_limit)))
        .route("/uploads/multipart", post(upload_multipart).layer(Extension(limit)))
        .route("/uploads/delete", post(delete_upload))
        .route("/carousel", get(carousel).post(add_carousel))
        .route("/carousel/upload", post(upload_carousel).layer(Extension(limit)))
        .route("/carousel/{id}", delete(delete_carousel))
        .layer(CsrfLayer::new(state.csrf.clone()))
        .layer(SessionGateLayer::new(state.sessions.clone()));

    let logout_route = Router::new()
        .route("/logout", post(logout))
        .layer(CsrfLayer::new(state.csrf.clone()));

    Router::new()
        .route("/login", post(login))
        .merge(logout_route)
        .merge(gated)
        .with_state(state)
}

async fn login(State(state): State<GalleryState>, Json(body): Json<LoginRequest>) -> Result<Response, WedAxumError> {
    let authenticator = BackendAuthenticator(state.backend.clone());
    let issued = issue_session(&authenticator, &state.sessions, &body).await?;
    tracing::info!(admin = %issued.claims.user, "admin logged in");

    let csrf_token = state.csrf.issue_token();
    let mut res = Json(json!({
        "user": { "id": issued.claims.sub, "username": issued.claims.user },
        "expiresAt": issued.claims.exp,
        "csrfToken": csrf_token,
    }))
    .into_response();
    append_cookie(&mut res, &state.sessions.session_cookie(&issued));
    append_cookie(&mut res, &state.csrf.cookie(&csrf_token));
    Ok(res)
}

async fn logout(State(state): State<GalleryState>, headers: HeaderMap) -> Response {
    if let Ok(claims) = state.sessions.verify_headers(&headers) {
        state.moderation.drop_session(&claims.jti);
        tracing::info!(admin = %claims.user, "admin logged out");
    }

    let mut res = Json(json!({ "success": true })).into_response();
    append_cookie(&mut res, &state.sessions.clear_cookie());
    let csrf = &state.csrf.options().cookie_name;
    append_cookie(&mut res, &SetCookie::removal(csrf).http_only(false));
    res
}

async fn session(AdminSession(claims): AdminSession) -> Json<Value> {
    Json(json!({
        "user": { "id": claims.sub, "username": claims.user },
        "expiresAt": claims.exp,
    }))
}

async fn moderation_batch(
    State(state): State<GalleryState>,
    AdminSession(claims): AdminSession,
) -> Result<Json<Value>, WedAxumError> {
    let queue = state.moderation.queue(&claims.jti, claims.exp);
    let images = queue.refresh().await?;
    Ok(Json(json!({ "images": images, "summary": queue.summary() })))
}

async fn present_next(
    State(state): State<GalleryState>,
    AdminSession(claims): AdminSession,
) -> Result<Json<Value>, WedAxumError> {
    let queue = state.moderation.queue(&claims.jti, claims.exp);
    let image = match queue.present_next() {
        Some(image) => Some(image),
        None => {
            queue.refresh().await?;
            queue.present_next()
        }
    };
    Ok(Json(json!({ "image": image, "summary": queue.summary() })))
}

async fn abandon(
    State(state): State<GalleryState>,
    AdminSession(claims): AdminSession,
    Path(id): Path<String>,
) -> Result<Json<Value>, WedAxumError> {
    let queue = state.moderation.queue(&claims.jti, claims.exp);
    queue.abandon(&id)?;
    Ok(Json(json!({ "summary": queue.summary() })))
}

#[derive(Deserialize)]
struct DecisionBody {
    approve: bool,
}

async fn decide(
    State(state): State<GalleryState>,
    AdminSession(claims): AdminSession,
    Path(id): Path<String>,
    Json(body): Json<DecisionBody>,
) -> Result<Json<Value>, WedAxumError> {
    let queue = state.moderation.queue(&claims.jti, claims.exp);
    let outcome = queue.decide(&id, Decision::from_approve(body.approve)).await?;
    Ok(Json(json!({ "result": outcome, "summary": queue.summary() })))
}

async fn delete_category(State(state): State<GalleryState>, Path(id): Path<String>) -> Result<Json<Value>, WedAxumError> {
    let removed = state.categories.delete(&id, state.coordinator.as_ref()).await?;
    Ok(Json(json!({ "success": true, "removedObjects": removed, "categories": state.categories.cached() })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonUpload {
    #[serde(default)]
    image: String,
    #[serde(default)]
    file_name: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    category_id: Option<String>,
}

/// Split a `data:<mime>;base64,<payload>` URL (or bare base64) into bytes.
pub(crate) fn decode_data_url(image: &str) -> WedResult<Vec<u8>> {
    let payload = match image.split_once(',') {
        Some((header, payload)) if header.starts_with("data:") => {
            if !header.ends_with(";base64") {
                return Err(WedError::bad_request("Image data must be base64 encoded.").into_anyhow());
            }
            payload
        }
        _ => image,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|e| WedError::bad_request(format!("Image data is not valid base64: {e}")).into_anyhow())
}

fn upload_folder(path: &str) -> WedResult<&'static str> {
    let path = path.trim().trim_matches('/');
    UPLOAD_FOLDERS
        .iter()
        .copied()
        .find(|f| *f == path)
        .ok_or_else(|| WedError::bad_request(format!("Unknown upload folder: {path}")).into_anyhow())
}

async fn upload_json(State(state): State<GalleryState>, Json(body): Json<JsonUpload>) -> Result<Response, WedAxumError> {
    if body.image.is_empty() || body.file_name.trim().is_empty() || body.path.trim().is_empty() {
        return Err(WedError::bad_request("Image, fileName and path are required.").into());
    }
    let folder = upload_folder(&body.path)?;
    let file = SourceFile::new(body.file_name.trim(), decode_data_url(&body.image)?);

    match body.category_id.filter(|c| !c.trim().is_empty()) {
        Some(category_id) => {
            let report = state
                .pipeline
                .submit(Submission {
                    category_id,
                    prefix: folder.to_string(),
                    files: vec![file],
                    mode: SubmissionMode::Admin,
                })
                .await?;
            Ok((StatusCode::CREATED, Json(json!(report))).into_response())
        }
        None => {
            let stored = state.pipeline.store_one(folder, file).await?;
            Ok((StatusCode::CREATED, Json(json!({ "url": stored.url, "key": stored.key }))).into_response())
        }
    }
}

async fn upload_multipart(
    State(state): State<GalleryState>,
    form: UploadForm,
) -> Result<impl IntoResponse, WedAxumError> {
    let report = state
        .pipeline
        .submit(Submission {
            category_id: category_field(&form),
            prefix: GUEST_PREFIX.to_string(),
            files: source_files(&form),
            mode: SubmissionMode::Admin,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteUpload {
    #[serde(default)]
    file_url: String,
}

async fn delete_upload(State(state): State<GalleryState>, Json(body): Json<DeleteUpload>) -> Result<Json<Value>, WedAxumError> {
    if body.file_url.trim().is_empty() {
        return Err(WedError::bad_request("fileUrl is required.").into());
    }
    state
        .coordinator
        .delete_url(body.file_url.trim())
        .await
        .map_err(WedError::from)?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize)]
struct CarouselUrl {
    #[serde(default, rename = "imageURLs")]
    url: String,
}

async fn add_carousel(
    State(state): State<GalleryState>,
    Json(body): Json<CarouselUrl>,
) -> Result<(StatusCode, Json<Value>), WedAxumError> {
    let added = state.carousel.add_url(&body.url).await?;
    Ok((StatusCode::CREATED, Json(json!(added))))
}

async fn upload_carousel(
    State(state): State<GalleryState>,
    form: UploadForm,
) -> Result<(StatusCode, Json<Value>), WedAxumError> {
    let file = source_files(&form)
        .into_iter()
        .next()
        .ok_or_else(|| WedError::bad_request("An image file is required."))?;
    let added = state.carousel.add_upload(file).await?;
    Ok((StatusCode::CREATED, Json(json!(added))))
}

async fn delete_carousel(State(state): State<GalleryState>, Path(id): Path<String>) -> Result<Json<Value>, WedAxumError> {
    state.carousel.delete(&id).await?;
    Ok(Json(json!({ "success": true })))
}
