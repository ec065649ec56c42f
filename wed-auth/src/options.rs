// Session and CSRF configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::AuthError;

/// Admin session cookie settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionOptions {
    /// Cookie carrying the signed session
    pub cookie_name: String,
    /// HMAC secret for HS256
    pub secret: String,
    /// Session lifetime
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    pub issuer: String,
    pub audience: String,
    /// Add `Secure` to issued cookies
    pub secure_cookies: bool,
    /// Where browsers are sent when they have no valid session
    pub login_path: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cookie_name: "admin_session".to_string(),
            secret: String::new(),
            ttl: Duration::from_secs(60 * 60),
            issuer: "wedshare".to_string(),
            audience: "wedshare-admin".to_string(),
            secure_cookies: false,
            login_path: "/admin".to_string(),
        }
    }
}

impl SessionOptions {
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        if self.secret.trim().is_empty() {
            return Err(AuthError::Misconfigured("JWT_SECRET is not set".to_string()));
        }
        if self.ttl.is_zero() {
            return Err(AuthError::Misconfigured("session ttl must be positive".to_string()));
        }
        if self.cookie_name.trim().is_empty() {
            return Err(AuthError::Misconfigured("session cookie name is empty".to_string()));
        }
        Ok(())
    }
}

/// Double-submit CSRF settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CsrfOptions {
    pub cookie_name: String,
    pub header_name: String,
    pub secure_cookies: bool,
}

impl Default for CsrfOptions {
    fn default() -> Self {
        Self {
            cookie_name: "csrf_token".to_string(),
            header_name: "x-csrf-token".to_string(),
            secure_cookies: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_admin_cookie() {
        let opts = SessionOptions::default();
        assert_eq!(opts.cookie_name, "admin_session");
        assert_eq!(opts.ttl, Duration::from_secs(3600));
        assert!(opts.validate().is_err());
        assert!(opts.with_secret("s3cr3t").validate().is_ok());
    }

    #[test]
    fn ttl_deserializes_from_humantime() {
        let json = serde_json::json!({
            "cookie_name": "admin_session",
            "secret": "x",
            "ttl": "30m",
            "issuer": "wedshare",
            "audience": "wedshare-admin",
            "secure_cookies": true,
            "login_path": "/admin"
        });
        let opts: SessionOptions = serde_json::from_value(json).unwrap();
        assert_eq!(opts.ttl, Duration::from_secs(1800));
    }
}
