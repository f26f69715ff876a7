use thiserror::Error;

use crate::services::auth::oauth::callback::CallbackError;
use crate::services::auth::session_token::SessionTokenError;

/// Failure of one authorization attempt. Each variant rejects exactly one in-flight login.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("oauth configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Callback(#[from] CallbackError),

    #[error("token exchange failed: {0}")]
    Exchange(String),

    #[error("ID token verification failed: {0}")]
    IdentityVerification(String),

    #[error(transparent)]
    SessionToken(#[from] SessionTokenError),
}

impl AuthError {
    pub fn identity(message: impl Into<String>) -> Self {
        Self::IdentityVerification(message.into())
    }
}
