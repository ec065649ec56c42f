use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::json;
use wed_axum::middlewares::{append_cookie, FormLimit, UploadForm};
use wed_axum::WedAxumError;

use super::{category_field, source_files};
use crate::state::GalleryState;
use crate::submission::{Submission, SubmissionMode};

pub const GUEST_PREFIX: &str = "user_images";

pub fn router(state: GalleryState) -> Router<()> {
    let limit = FormLimit(state.form_limit);
    Router::new()
        .route("/csrf", get(csrf_token))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/{id}/images", get(category_images))
        .route("/images", get(approved_images))
        .route("/carousel", get(carousel))
        .route("/uploads", post(submit).layer(Extension(limit)))
        .with_state(state)
}

/// Returns the current token (or a fresh one) and sets it as a cookie.
async fn csrf_token(State(state): State<GalleryState>, headers: HeaderMap) -> Response {
    let token = state
        .csrf
        .cookie_token(&headers)
        .unwrap_or_else(|| state.csrf.issue_token());
    let mut res = Json(json!({ "token": token })).into_response();
    append_cookie(&mut res, &state.csrf.cookie(&token));
    res
}

pub(crate) async fn list_categories(State(state): State<GalleryState>) -> Result<Json<serde_json::Value>, WedAxumError> {
    match state.categories.refresh().await {
        Ok(categories) => Ok(Json(json!({ "categories": categories }))),
        Err(err) => {
            let cached = state.categories.cached();
            if cached.is_empty() {
                return Err(err.into());
            }
            Ok(Json(json!({ "categories": cached, "stale": true })))
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct NewCategory {
    #[serde(default)]
    name: String,
}

pub(crate) async fn create_category(
    State(state): State<GalleryState>,
    Json(body): Json<NewCategory>,
) -> Result<(StatusCode, Json<serde_json::Value>), WedAxumError> {
    let id = state.categories.create(&body.name).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": id, "categories": state.categories.cached() })),
    ))
}

async fn category_images(
    State(state): State<GalleryState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, WedAxumError> {
    let images = state.backend.list_images(&id).await?;
    Ok(Json(json!({ "totalApproved": images.len(), "images": images })))
}

async fn approved_images(State(state): State<GalleryState>) -> Result<Json<serde_json::Value>, WedAxumError> {
    let images = state.backend.list_all_images().await?;
    Ok(Json(json!({ "images": images })))
}

pub(crate) async fn carousel(State(state): State<GalleryState>) -> Result<Json<serde_json::Value>, WedAxumError> {
    let images = state.carousel.list().await?;
    Ok(Json(json!({ "carouselImages": images })))
}

async fn submit(State(state): State<GalleryState>, form: UploadForm) -> Result<impl IntoResponse, WedAxumError> {
    let report = state
        .pipeline
        .submit(Submission {
            category_id: category_field(&form),
            prefix: GUEST_PREFIX.to_string(),
            files: source_files(&form),
            mode: SubmissionMode::Guest,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}
