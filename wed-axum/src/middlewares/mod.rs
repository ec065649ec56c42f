pub mod csrf;
pub mod multipart;
pub mod session;

pub use csrf::{CsrfLayer, CsrfService};
pub use multipart::{FormFile, FormLimit, UploadForm};
pub use session::{AdminSession, SessionGate, SessionGateLayer};

use axum::http::header::SET_COOKIE;
use axum::http::HeaderValue;
use axum::response::Response;
use wed_auth::SetCookie;

/// Append a `Set-Cookie` header to `res`.
pub fn append_cookie(res: &mut Response, cookie: &SetCookie) {
    match HeaderValue::from_str(&cookie.render()) {
        Ok(value) => {
            res.headers_mut().append(SET_COOKIE, value);
        }
        Err(err) => tracing::warn!(cookie = %cookie.name, error = %err, "cookie not representable as header"),
    }
}
