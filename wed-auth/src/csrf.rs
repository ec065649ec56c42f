// Double-submit CSRF protection.

use http::{HeaderMap, Method};
use uuid::Uuid;

use crate::cookies::{cookie_value, SameSite, SetCookie};
use crate::{AuthError, CsrfOptions};

#[derive(Clone, Debug, Default)]
pub struct CsrfGuard {
    options: CsrfOptions,
}

impl CsrfGuard {
    pub fn new(options: CsrfOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CsrfOptions {
        &self.options
    }

    /// Fresh random token (256 bits of uuid v4 randomness, hex).
    pub fn issue_token(&self) -> String {
        format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
    }

    /// Only state-changing methods are checked.
    pub fn requires_check(method: &Method) -> bool {
        !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
    }

    /// Token currently held in the browser's CSRF cookie.
    pub fn cookie_token(&self, headers: &HeaderMap) -> Option<String> {
        cookie_value(headers, &self.options.cookie_name)
    }

    /// The header must be present and equal to the cookie.
    pub fn verify(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let header = headers
            .get(self.options.header_name.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(AuthError::CsrfMissing)?;
        let cookie = self.cookie_token(headers).ok_or(AuthError::CsrfMissing)?;

        if constant_time_eq(header.as_bytes(), cookie.as_bytes()) {
            Ok(())
        } else {
            tracing::warn!("csrf token mismatch");
            Err(AuthError::CsrfMismatch)
        }
    }

    /// Readable by page scripts so they can echo it in the header.
    pub fn cookie(&self, token: &str) -> SetCookie {
        SetCookie::new(&self.options.cookie_name, token)
            .http_only(false)
            .same_site(SameSite::Strict)
            .secure(self.options.secure_cookies)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
