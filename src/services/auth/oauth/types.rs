use async_trait::async_trait;
use oauth2::{
    AccessToken, AuthorizationCode, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, RefreshToken,
};
use url::Url;

use crate::services::auth::error::AuthError;

/// Credentials returned by the provider's token endpoint.
///
/// Owned by one authorization attempt; only the verified subject outlives it.
#[derive(Debug, Clone)]
pub struct IdentityCredentials {
    pub access_token: AccessToken,
    pub refresh_token: Option<RefreshToken>,
    pub id_token: Option<String>,
}

/// The provider-issued user id taken from a verified ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub user_id: String,
}

/// Third-party identity provider as seen by the orchestrator.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Consent-screen URL for one attempt (offline access, `openid` scope).
    fn authorization_url(&self, state: &CsrfToken, pkce_challenge: PkceCodeChallenge) -> Url;

    async fn exchange_code(
        &self,
        code: AuthorizationCode,
        pkce_verifier: PkceCodeVerifier,
    ) -> Result<IdentityCredentials, AuthError>;

    /// Verify an ID token and return its subject.
    async fn verify_id_token(&self, id_token: &str) -> Result<String, AuthError>;
}
