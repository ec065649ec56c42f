// Admin login.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use wed_core::{WedError, WedResult};

use crate::{AuthError, IssuedSession, SessionManager};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminIdentity {
    pub id: String,
    pub username: String,
}

/// Checks admin credentials against whatever owns them.
#[async_trait]
pub trait AdminAuthenticator: Send + Sync {
    /// `Ok(None)` means the credentials were rejected.
    async fn authenticate(&self, username: &str, password: &str) -> anyhow::Result<Option<AdminIdentity>>;
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

pub async fn login(
    authenticator: &dyn AdminAuthenticator,
    sessions: &SessionManager,
    req: &LoginRequest,
) -> WedResult<IssuedSession> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(WedError::bad_request("Username and password are required.").into_anyhow());
    }

    let Some(admin) = authenticator.authenticate(username, &req.password).await? else {
        tracing::warn!(admin = %username, "admin login rejected");
        return Err(WedError::from(AuthError::InvalidCredentials(
            "Invalid username or password.".to_string(),
        ))
        .into_anyhow());
    };

    sessions
        .issue(&admin)
        .map_err(|e| WedError::from(e).into_anyhow())
}
