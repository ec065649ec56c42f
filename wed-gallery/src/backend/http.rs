use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use serde_json::{json, Value};
use wed_auth::AdminIdentity;
use wed_core::{RetryPolicy, WedError, WedResult};

use super::GalleryBackend;
use crate::models::{lenient, CarouselImage, Category, GalleryImage};

/// Connection settings for the wedding REST API
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    pub wedding_id: String,
    pub auth_key: String,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub login_timeout: Duration,
    /// Applied to reads only; writes are sent once.
    pub retry: RetryPolicy,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            wedding_id: String::new(),
            auth_key: String::new(),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(15),
            login_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

pub struct HttpBackend {
    client: Client,
    settings: BackendSettings,
}

// ---- wire payloads ----

#[derive(Deserialize)]
struct WireCategory {
    #[serde(rename = "catID", deserialize_with = "lenient::id")]
    id: String,
    #[serde(rename = "catName", default)]
    name: String,
}

#[derive(Deserialize)]
struct CategoriesResponse {
    #[serde(default)]
    categories: Vec<WireCategory>,
}

#[derive(Deserialize)]
struct CreatedResponse {
    #[serde(default, deserialize_with = "lenient::opt_id")]
    id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddImagesResponse {
    #[serde(default)]
    created_count: Option<usize>,
}

#[derive(Deserialize)]
struct WireImage {
    #[serde(rename = "imageID", deserialize_with = "lenient::id")]
    id: String,
    #[serde(rename = "imageURL")]
    url: String,
    #[serde(rename = "categoryId", default, deserialize_with = "lenient::opt_id")]
    category_id: Option<String>,
    #[serde(rename = "approval", default, deserialize_with = "lenient::opt_flag")]
    approved: Option<bool>,
    #[serde(rename = "createdAt", default, deserialize_with = "lenient::opt_timestamp")]
    created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl WireImage {
    fn into_image(self, approved_default: bool) -> GalleryImage {
        GalleryImage {
            id: self.id,
            url: self.url,
            category_id: self.category_id,
            approved: self.approved.unwrap_or(approved_default),
            created_at: self.created_at,
        }
    }
}

#[derive(Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    images: Vec<WireImage>,
}

#[derive(Deserialize)]
struct WireCarouselImage {
    #[serde(deserialize_with = "lenient::id")]
    id: String,
    #[serde(rename = "imageURLs")]
    url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CarouselResponse {
    #[serde(default)]
    carousel_images: Vec<WireCarouselImage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAdminInfo {
    #[serde(deserialize_with = "lenient::id")]
    id: String,
    #[serde(rename = "admnUsrName", default)]
    username: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    #[serde(default, deserialize_with = "lenient::opt_flag")]
    login_status: Option<bool>,
    admin_info: Option<WireAdminInfo>,
    issue: Option<String>,
}

impl HttpBackend {
    pub fn new(settings: BackendSettings) -> WedResult<Self> {
        if settings.base_url.trim().is_empty() {
            return Err(WedError::general_error("API_BACKEND_URL is not configured").into_anyhow());
        }
        if settings.wedding_id.trim().is_empty() || settings.auth_key.trim().is_empty() {
            return Err(WedError::general_error("WEDDING_ID and AUTH_KEY must be configured").into_anyhow());
        }
        let client = Client::builder()
            .build()
            .map_err(|e| WedError::general_error(format!("HTTP client setup failed: {e}")).into_anyhow())?;

        Ok(Self {
            client,
            settings: BackendSettings {
                base_url: settings.base_url.trim_end_matches('/').to_string(),
                ..settings
            },
        })
    }

    /// Every call carries the wedding id and key next to its own fields.
    fn payload(&self, fields: Value) -> Value {
        let mut body = json!({
            "wedId": self.settings.wedding_id,
            "wedauthkey": self.settings.auth_key,
        });
        if let (Some(target), Value::Object(extra)) = (body.as_object_mut(), fields) {
            target.extend(extra);
        }
        body
    }

    async fn call<T: DeserializeOwned>(&self, path: &str, fields: Value, timeout: Duration) -> WedResult<T> {
        let url = format!("{}{}", self.settings.base_url, path);
        let started = std::time::Instant::now();

        let res = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&self.payload(fields))
            .send()
            .await
            .map_err(|e| transport_error(path, timeout, e))?;

        let status = res.status();
        let body = res.text().await.map_err(|e| transport_error(path, timeout, e))?;
        tracing::debug!(
            path,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "backend call"
        );

        if !status.is_success() {
            return Err(status_error(path, status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(path, error = %e, "malformed backend response");
            WedError::bad_gateway(format!("The backend sent an unexpected response for {path}."))
                .with_source(e.into())
                .into_anyhow()
        })
    }

    async fn read<T: DeserializeOwned>(&self, path: &str, fields: Value) -> WedResult<T> {
        self.settings
            .retry
            .run(path, |_| self.call(path, fields.clone(), self.settings.read_timeout))
            .await
    }

    async fn write<T: DeserializeOwned>(&self, path: &str, fields: Value) -> WedResult<T> {
        self.call(path, fields, self.settings.write_timeout).await
    }
}

fn transport_error(path: &str, timeout: Duration, err: reqwest::Error) -> anyhow::Error {
    let wed = if err.is_timeout() {
        WedError::timeout(format!("The backend did not answer {path} within {}s.", timeout.as_secs()))
    } else {
        WedError::unavailable(format!("Network failure while calling the backend ({path})."))
    };
    tracing::warn!(path, error = %err, "backend transport failure");
    wed.with_source(err.into()).into_anyhow()
}

fn status_error(path: &str, status: StatusCode, body: &str) -> anyhow::Error {
    let issue = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        v.get("issue")
            .or_else(|| v.get("message"))
            .or_else(|| v.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    tracing::warn!(path, status = status.as_u16(), issue = ?issue, "backend rejected call");

    let err = match status.as_u16() {
        401 | 403 => WedError::not_authenticated(
            issue.unwrap_or_else(|| "The backend rejected the wedding credentials.".to_string()),
        ),
        404 => WedError::not_found(issue.unwrap_or_else(|| format!("Not found ({path})."))),
        408 => WedError::timeout(issue.unwrap_or_else(|| format!("The backend timed out ({path})."))),
        429 => WedError::too_many_requests(issue.unwrap_or_else(|| "The backend is busy.".to_string())),
        400..=499 => WedError::bad_request(issue.unwrap_or_else(|| format!("The backend refused {path}."))),
        _ => WedError::unavailable(issue.unwrap_or_else(|| "The backend is unavailable.".to_string())),
    };
    err.with_data(json!({ "status": status.as_u16() })).into_anyhow()
}

#[async_trait]
impl GalleryBackend for HttpBackend {
    async fn list_categories(&self) -> WedResult<Vec<Category>> {
        let res: CategoriesResponse = self.read("/api/wedding/getcategories", json!({})).await?;
        Ok(res
            .categories
            .into_iter()
            .map(|c| Category { id: c.id, name: c.name })
            .collect())
    }

    async fn create_category(&self, name: &str) -> WedResult<String> {
        let res: CreatedResponse = self
            .write("/api/wedding/createcategory", json!({ "catName": name }))
            .await?;
        res.id
            .ok_or_else(|| WedError::bad_gateway("The backend did not return the new category id.").into_anyhow())
    }

    async fn delete_category(&self, category_id: &str) -> WedResult<()> {
        let _: IgnoredAny = self
            .write("/api/wedding/deletecategory", json!({ "catID": category_id }))
            .await?;
        Ok(())
    }

    async fn add_images(&self, urls: &[String], category_id: &str, approved: bool) -> WedResult<usize> {
        let mut fields = json!({ "imageURLs": urls, "catID": category_id });
        if approved {
            fields["approved"] = json!(true);
        }
        let res: AddImagesResponse = self.write("/api/wedding/addimages", fields).await?;
        Ok(res.created_count.unwrap_or(urls.len()))
    }

    async fn list_images(&self, category_id: &str) -> WedResult<Vec<GalleryImage>> {
        let res: ImagesResponse = self
            .read("/api/wedding/lstimages", json!({ "catID": category_id }))
            .await?;
        Ok(res
            .images
            .into_iter()
            .map(|i| i.into_image(true))
            .filter(|i| i.approved)
            .collect())
    }

    async fn list_all_images(&self) -> WedResult<Vec<GalleryImage>> {
        let res: ImagesResponse = self.read("/api/wedding/lstallimgs", json!({})).await?;
        Ok(res
            .images
            .into_iter()
            .map(|i| i.into_image(true))
            .filter(|i| i.approved)
            .collect())
    }

    async fn list_unapproved(&self) -> WedResult<Vec<GalleryImage>> {
        let res: ImagesResponse = self.read("/api/wedding/unprvdimgs", json!({})).await?;
        Ok(res
            .images
            .into_iter()
            .map(|i| i.into_image(false))
            .filter(|i| !i.approved)
            .collect())
    }

    async fn decide(&self, image_id: &str, approve: bool) -> WedResult<()> {
        let _: IgnoredAny = self
            .write("/api/wedding/apprvimg", json!({ "imageID": image_id, "approve": approve }))
            .await?;
        Ok(())
    }

    async fn list_carousel(&self) -> WedResult<Vec<CarouselImage>> {
        let res: CarouselResponse = self.read("/api/wedding/lstcarouselimg", json!({})).await?;
        Ok(res
            .carousel_images
            .into_iter()
            .map(|c| CarouselImage { id: c.id, url: c.url })
            .collect())
    }

    async fn add_carousel(&self, url: &str) -> WedResult<String> {
        let res: CreatedResponse = self
            .write("/api/wedding/addcarouselimg", json!({ "imageURLs": url }))
            .await?;
        res.id
            .ok_or_else(|| WedError::bad_gateway("The backend did not return the carousel entry id.").into_anyhow())
    }

    async fn delete_carousel(&self, carousel_id: &str) -> WedResult<()> {
        let _: IgnoredAny = self
            .write("/api/wedding/delcarouselimg", json!({ "carouselID": carousel_id }))
            .await?;
        Ok(())
    }

    async fn admin_login(&self, username: &str, password: &str) -> WedResult<Option<AdminIdentity>> {
        let res: Result<LoginResponse, _> = self
            .call(
                "/api/wedadmin/login",
                json!({ "admnUsrName": username, "admnUsrPwd": password }),
                self.settings.login_timeout,
            )
            .await;

        let res = match res {
            Ok(res) => res,
            // the login endpoint answers bad credentials with a 4xx and an issue text
            Err(err) => match WedError::kind_of(&err) {
                Some(wed_core::ErrorKind::NotAuthenticated | wed_core::ErrorKind::BadRequest) => {
                    let issue = WedError::from_anyhow(&err)
                        .map(|e| e.message.clone())
                        .unwrap_or_default();
                    return Err(WedError::not_authenticated(issue).into_anyhow());
                }
                _ => return Err(err),
            },
        };

        match (res.login_status, res.admin_info) {
            (Some(true), Some(info)) => Ok(Some(AdminIdentity {
                id: info.id,
                username: if info.username.is_empty() {
                    username.to_string()
                } else {
                    info.username
                },
            })),
            (_, _) => match res.issue {
                Some(issue) => Err(WedError::not_authenticated(issue).into_anyhow()),
                None => Ok(None),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wed_core::ErrorKind;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn backend(base_url: String) -> HttpBackend {
        HttpBackend::new(BackendSettings {
            base_url,
            wedding_id: "wed-1".into(),
            auth_key: "key".into(),
            retry: RetryPolicy::new(3, Duration::from_millis(5)),
            read_timeout: Duration::from_millis(500),
            ..BackendSettings::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn lenient_payloads_become_canonical_records() {
        let router = Router::new()
            .route(
                "/api/wedding/getcategories",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["wedId"], "wed-1");
                    assert_eq!(body["wedauthkey"], "key");
                    Json(json!({"categories": [{"catID": 3, "catName": "Ceremony"}, {"catID": "4", "catName": "Party"}]}))
                }),
            )
            .route(
                "/api/wedding/unprvdimgs",
                post(|| async {
                    Json(json!({"images": [
                        {"imageID": 9, "imageURL": "https://b/x.webp", "categoryId": 3, "approval": 0, "createdAt": "2024-06-01 10:00:00"},
                        {"imageID": "10", "imageURL": "https://b/y.webp", "categoryId": "3", "approval": false}
                    ]}))
                }),
            );
        let backend = backend(serve(router).await);

        let categories = backend.list_categories().await.unwrap();
        assert_eq!(
            categories,
            vec![
                Category { id: "3".into(), name: "Ceremony".into() },
                Category { id: "4".into(), name: "Party".into() },
            ]
        );

        let pending = backend.list_unapproved().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, "9");
        assert_eq!(pending[0].category_id.as_deref(), Some("3"));
        assert!(pending[0].created_at.is_some());
        assert!(!pending[1].approved);
    }

    #[tokio::test]
    async fn reads_are_retried_on_5xx() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let router = Router::new().route(
            "/api/wedding/lstcarouselimg",
            post(move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"issue": "busy"})))
                    } else {
                        (StatusCode::OK, Json(json!({"carouselImages": [{"id": 1, "imageURLs": "https://b/c.webp"}]})))
                    }
                }
            }),
        );
        let backend = backend(serve(router).await);

        let carousel = backend.list_carousel().await.unwrap();
        assert_eq!(carousel, vec![CarouselImage { id: "1".into(), url: "https://b/c.webp".into() }]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn writes_are_sent_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let router = Router::new().route(
            "/api/wedding/addimages",
            post(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::BAD_GATEWAY, Json(json!({})))
                }
            }),
        );
        let backend = backend(serve(router).await);

        let err = backend
            .add_images(&["https://b/x.webp".to_string()], "3", false)
            .await
            .unwrap_err();
        assert_eq!(WedError::kind_of(&err), Some(ErrorKind::Unavailable));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn status_codes_map_to_error_kinds() {
        let router = Router::new()
            .route(
                "/api/wedding/lstimages",
                post(|| async { (StatusCode::NOT_FOUND, Json(json!({"issue": "No such category"}))) }),
            )
            .route(
                "/api/wedding/createcategory",
                post(|| async { (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"issue": "Name taken"}))) }),
            )
            .route(
                "/api/wedding/lstallimgs",
                post(|| async { (StatusCode::FORBIDDEN, Json(json!({}))) }),
            )
            .route(
                "/api/wedding/lstcarouselimg",
                post(|| async { (StatusCode::REQUEST_TIMEOUT, Json(json!({}))) }),
            )
            .route("/api/wedding/getcategories", post(|| async { "not json" }));
        let backend = backend(serve(router).await);

        let err = backend.list_images("3").await.unwrap_err();
        assert_eq!(WedError::kind_of(&err), Some(ErrorKind::NotFound));
        assert_eq!(WedError::from_anyhow(&err).unwrap().message, "No such category");

        let err = backend.create_category("x").await.unwrap_err();
        assert_eq!(WedError::kind_of(&err), Some(ErrorKind::BadRequest));

        let err = backend.list_all_images().await.unwrap_err();
        assert_eq!(WedError::kind_of(&err), Some(ErrorKind::NotAuthenticated));

        let err = backend.list_categories().await.unwrap_err();
        assert_eq!(WedError::kind_of(&err), Some(ErrorKind::BadGateway));

        let err = backend.list_carousel().await.unwrap_err();
        assert_eq!(WedError::kind_of(&err), Some(ErrorKind::Timeout));
        assert!(WedError::from_anyhow(&err).unwrap().message.contains("lstcarouselimg"));
    }

    #[tokio::test]
    async fn slow_reads_time_out() {
        let router = Router::new().route(
            "/api/wedding/getcategories",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"categories": []}))
            }),
        );
        let backend = HttpBackend::new(BackendSettings {
            base_url: serve(router).await,
            wedding_id: "w".into(),
            auth_key: "k".into(),
            read_timeout: Duration::from_millis(50),
            retry: RetryPolicy::none(),
            ..BackendSettings::default()
        })
        .unwrap();

        let err = backend.list_categories().await.unwrap_err();
        assert_eq!(WedError::kind_of(&err), Some(ErrorKind::Timeout));
    }

    #[tokio::test]
    async fn login_surfaces_the_backend_issue() {
        let router = Router::new().route(
            "/api/wedadmin/login",
            post(|Json(body): Json<Value>| async move {
                if body["admnUsrPwd"] == "right" {
                    (
                        StatusCode::OK,
                        Json(json!({"loginStatus": true, "adminInfo": {"id": 5, "admnUsrName": "couple"}})),
                    )
                } else {
                    (
                        StatusCode::UNAUTHORIZED,
                        Json(json!({"loginStatus": false, "issue": "Wrong password"})),
                    )
                }
            }),
        );
        let backend = backend(serve(router).await);

        let admin = backend.admin_login("couple", "right").await.unwrap().unwrap();
        assert_eq!(admin, AdminIdentity { id: "5".into(), username: "couple".into() });

        let err = backend.admin_login("couple", "wrong").await.unwrap_err();
        let wed = WedError::from_anyhow(&err).unwrap();
        assert_eq!(wed.kind, ErrorKind::NotAuthenticated);
        assert_eq!(wed.message, "Wrong password");
    }

    #[test]
    fn missing_settings_are_rejected() {
        assert!(HttpBackend::new(BackendSettings::default()).is_err());
    }
}
