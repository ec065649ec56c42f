//! Double-submit CSRF guard.
//!
//! State-changing requests must carry `x-csrf-token` equal to the
//! `csrf_token` cookie or they are answered with 403 before any handler runs.
//! Safe requests without the cookie get a fresh one.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use tower::{Layer, Service};
use wed_auth::CsrfGuard;
use wed_core::WedError;

use crate::middlewares::append_cookie;
use crate::WedAxumError;

#[derive(Clone)]
pub struct CsrfLayer {
    guard: Arc<CsrfGuard>,
}

impl CsrfLayer {
    pub fn new(guard: Arc<CsrfGuard>) -> Self {
        Self { guard }
    }
}

impl<S> Layer<S> for CsrfLayer {
    type Service = CsrfService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CsrfService {
            inner,
            guard: Arc::clone(&self.guard),
        }
    }
}

#[derive(Clone)]
pub struct CsrfService<S> {
    inner: S,
    guard: Arc<CsrfGuard>,
}

impl<S> Service<Request<Body>> for CsrfService<S>
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

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut fresh_cookie = None;

        if CsrfGuard::requires_check(req.method()) {
            if let Err(err) = self.guard.verify(req.headers()) {
                tracing::info!(method = %req.method(), path = %req.uri().path(), reason = %err, "csrf check failed");
                let res = WedAxumError::from(WedError::from(err)).into_response();
                return Box::pin(async move { Ok(res) });
            }
        } else if self.guard.cookie_token(req.headers()).is_none() {
            fresh_cookie = Some(self.guard.cookie(&self.guard.issue_token()));
        }

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move {
            let mut res = inner.call(req).await?;
            if let Some(cookie) = fresh_cookie {
                append_cookie(&mut res, &cookie);
            }
            Ok(res)
        })
    }
}
