//! Admin session gate.
//!
//! Requests without a valid `admin_session` cookie never reach the inner
//! service: API calls get a 401 JSON error, browser navigations (`Accept:
//! text/html`) are redirected to the login page. Broken or expired cookies
//! are cleared on the way out. Verified claims are stored in the request
//! extensions and can be read with the [`AdminSession`] extractor.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::{FromRequestParts, Request};
use axum::http::header::{ACCEPT, LOCATION};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tower::{Layer, Service};
use wed_auth::{AuthError, SessionClaims, SessionManager};
use wed_core::WedError;

use crate::middlewares::append_cookie;
use crate::WedAxumError;

/// Claims of the admin making the request.
#[derive(Clone, Debug)]
pub struct AdminSession(pub SessionClaims);

impl<S> FromRequestParts<S> for AdminSession
where
    S: Send + Sync,
{
    type Rejection = WedAxumError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AdminSession>()
            .cloned()
            .ok_or_else(|| WedError::from(AuthError::MissingSession).into())
    }
}

#[derive(Clone)]
pub struct SessionGateLayer {
    sessions: Arc<SessionManager>,
}

impl SessionGateLayer {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }
}

impl<S> Layer<S> for SessionGateLayer {
    type Service = SessionGate<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionGate {
            inner,
            sessions: Arc::clone(&self.sessions),
        }
    }
}

#[derive(Clone)]
pub struct SessionGate<S> {
    inner: S,
    sessions: Arc<SessionManager>,
}

impl<S> Service<Request<Body>> for SessionGate<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        match self.sessions.verify_headers(req.headers()) {
            Ok(claims) => {
                req.extensions_mut().insert(AdminSession(claims));
                let clone = self.inner.clone();
                let mut inner = std::mem::replace(&mut self.inner, clone);
                Box::pin(async move { inner.call(req).await })
            }
            Err(err) => {
                tracing::info!(path = %req.uri().path(), reason = %err, "admin session rejected");
                let res = reject(&self.sessions, req.headers(), err);
                Box::pin(async move { Ok(res) })
            }
        }
    }
}

fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/html"))
        .unwrap_or(false)
}

fn reject(sessions: &SessionManager, headers: &HeaderMap, err: AuthError) -> Response {
    let clear = err.clears_cookie();

    let mut res = if wants_html(headers) {
        let location = HeaderValue::from_str(&sessions.options().login_path)
            .unwrap_or_else(|_| HeaderValue::from_static("/"));
        (StatusCode::SEE_OTHER, [(LOCATION, location)]).into_response()
    } else {
        WedAxumError::from(WedError::from(err)).into_response()
    };

    if clear {
        append_cookie(&mut res, &sessions.clear_cookie());
    }
    res
}
