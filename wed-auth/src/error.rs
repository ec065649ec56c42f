use thiserror::Error;
use wed_core::WedError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No admin session. Please log in.")]
    MissingSession,

    #[error("Your session has expired. Please log in again.")]
    Expired,

    #[error("Invalid admin session. Please log in again.")]
    InvalidSession(#[source] jsonwebtoken::errors::Error),

    #[error("Missing CSRF token. Please refresh the page and try again.")]
    CsrfMissing,

    #[error("CSRF token mismatch. Please refresh the page and try again.")]
    CsrfMismatch,

    #[error("{0}")]
    InvalidCredentials(String),

    #[error("Session signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("Authentication is misconfigured: {0}")]
    Misconfigured(String),
}

impl AuthError {
    /// Whether the stored session cookie should be cleared.
    pub fn clears_cookie(&self) -> bool {
        matches!(self, Self::Expired | Self::InvalidSession(_))
    }
}

impl From<AuthError> for WedError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match &err {
            AuthError::MissingSession
            | AuthError::Expired
            | AuthError::InvalidSession(_)
            | AuthError::InvalidCredentials(_) => WedError::not_authenticated(message),
            AuthError::CsrfMissing | AuthError::CsrfMismatch => WedError::forbidden(message),
            AuthError::Signing(_) | AuthError::Misconfigured(_) => WedError::general_error(message),
        }
        .with_source(anyhow::Error::new(err))
    }
}
