//! Admin authentication for wedshare.
//!
//! - [`SessionManager`] signs and verifies the `admin_session` cookie (HS256).
//! - [`CsrfGuard`] checks that state-changing requests echo the CSRF cookie in
//!   a header.
//! - [`login`] delegates credential checks to an [`AdminAuthenticator`] and
//!   issues a session on success.

pub mod cookies;
pub mod csrf;
pub mod error;
pub mod login;
pub mod options;
pub mod session;

pub use cookies::{cookie_value, SameSite, SetCookie};
pub use csrf::CsrfGuard;
pub use error::AuthError;
pub use login::{login, AdminAuthenticator, AdminIdentity, LoginRequest};
pub use options::{CsrfOptions, SessionOptions};
pub use session::{IssuedSession, SessionClaims, SessionManager};
