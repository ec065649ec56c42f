// Signed admin sessions.

use std::time::Duration;

use chrono::Utc;
use http::HeaderMap;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cookies::{cookie_value, SetCookie};
use crate::{AdminIdentity, AuthError, SessionOptions};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    /// Admin id
    pub sub: String,
    /// Admin username
    pub user: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    /// Session id, used to key per-session state
    pub jti: String,
}

#[derive(Clone, Debug)]
pub struct IssuedSession {
    pub token: String,
    pub claims: SessionClaims,
    pub max_age: Duration,
}

#[derive(Clone, Debug)]
pub struct SessionManager {
    options: SessionOptions,
}

impl SessionManager {
    pub fn new(options: SessionOptions) -> Result<Self, AuthError> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn issue(&self, admin: &AdminIdentity) -> Result<IssuedSession, AuthError> {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: admin.id.clone(),
            user: admin.username.clone(),
            iat: now,
            exp: now + self.options.ttl.as_secs() as i64,
            iss: self.options.issuer.clone(),
            aud: self.options.audience.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.options.secret.as_bytes()),
        )
        .map_err(AuthError::Signing)?;

        tracing::info!(admin = %claims.user, session = %claims.jti, "admin session issued");

        Ok(IssuedSession {
            token,
            claims,
            max_age: self.options.ttl,
        })
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[self.options.issuer.as_str()]);
        validation.set_audience(&[self.options.audience.as_str()]);

        decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.options.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            JwtErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::InvalidSession(e),
        })
    }

    /// Verify the session cookie carried by `headers`.
    pub fn verify_headers(&self, headers: &HeaderMap) -> Result<SessionClaims, AuthError> {
        let token = cookie_value(headers, &self.options.cookie_name).ok_or(AuthError::MissingSession)?;
        self.verify(&token)
    }

    pub fn session_cookie(&self, session: &IssuedSession) -> SetCookie {
        SetCookie::new(&self.options.cookie_name, &session.token)
            .max_age(session.max_age)
            .secure(self.options.secure_cookies)
    }

    pub fn clear_cookie(&self) -> SetCookie {
        SetCookie::removal(&self.options.cookie_name).secure(self.options.secure_cookies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::COOKIE;
    use http::HeaderValue;

    fn manager() -> SessionManager {
        SessionManager::new(SessionOptions::default().with_secret("test-secret-that-is-long-enough")).unwrap()
    }

    fn admin() -> AdminIdentity {
        AdminIdentity {
            id: "7".to_string(),
            username: "bride".to_string(),
        }
    }

    #[test]
    fn issued_token_verifies() {
        let m = manager();
        let session = m.issue(&admin()).unwrap();
        let claims = m.verify(&session.token).unwrap();

        assert_eq!(claims.sub, "7");
        assert_eq!(claims.user, "bride");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn token_signed_with_another_secret_is_invalid() {
        let other = SessionManager::new(SessionOptions::default().with_secret("another-secret")).unwrap();
        let token = other.issue(&admin()).unwrap().token;

        assert!(matches!(manager().verify(&token), Err(AuthError::InvalidSession(_))));
        assert!(matches!(manager().verify("garbage"), Err(AuthError::InvalidSession(_))));
    }

    #[test]
    fn expired_tokens_are_reported_as_expired() {
        let m = manager();
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: "7".into(),
            user: "bride".into(),
            iat: now - 7200,
            exp: now - 3600,
            iss: "wedshare".into(),
            aud: "wedshare-admin".into(),
            jti: "j".into(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret-that-is-long-enough"),
        )
        .unwrap();

        let err = m.verify(&token).unwrap_err();
        assert!(matches!(err, AuthError::Expired));
        assert!(err.clears_cookie());
    }

    #[test]
    fn verify_headers_reads_the_cookie() {
        let m = manager();
        let token = m.issue(&admin()).unwrap().token;

        let mut headers = HeaderMap::new();
        assert!(matches!(m.verify_headers(&headers), Err(AuthError::MissingSession)));

        headers.insert(COOKIE, HeaderValue::from_str(&format!("admin_session={token}")).unwrap());
        assert_eq!(m.verify_headers(&headers).unwrap().user, "bride");
    }

    #[test]
    fn cookies_are_http_only_with_expiry() {
        let m = manager();
        let session = m.issue(&admin()).unwrap();
        let rendered = m.session_cookie(&session).render();

        assert!(rendered.starts_with("admin_session="));
        assert!(rendered.contains("Max-Age=3600"));
        assert!(rendered.contains("HttpOnly"));
        assert!(m.clear_cookie().render().contains("Max-Age=0"));
    }
}
