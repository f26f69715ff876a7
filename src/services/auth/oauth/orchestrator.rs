//! Drives one authorization-code login end to end.
//!
//! consent URL -> callback listener -> browser -> captured code -> token exchange -> ID token
//!
//! Only one attempt can hold the callback port at a time. A concurrent `initiate()` is not
//! queued: it fails immediately with the listener's bind error.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use oauth2::{AuthorizationCode, CsrfToken, PkceCodeChallenge};
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::services::auth::error::AuthError;
use crate::services::auth::oauth::browser::BrowserLauncher;
use crate::services::auth::oauth::callback::{CallbackListener, ListenerRegistry};
use crate::services::auth::oauth::types::{
    IdentityCredentials, IdentityProvider, VerifiedIdentity,
};

#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub redirect_uri: Url,
    pub callback_addr: SocketAddr,
    pub callback_timeout: Duration,
}

pub struct AuthorizationOrchestrator {
    settings: OAuthSettings,
    provider: Arc<dyn IdentityProvider>,
    browser: Arc<dyn BrowserLauncher>,
    registry: ListenerRegistry,
}

impl std::fmt::Debug for AuthorizationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationOrchestrator")
            .field("settings", &self.settings)
            .field("active_listeners", &self.registry.active())
            .finish()
    }
}

impl AuthorizationOrchestrator {
    pub fn new(
        settings: OAuthSettings,
        provider: Arc<dyn IdentityProvider>,
        browser: Arc<dyn BrowserLauncher>,
        registry: ListenerRegistry,
    ) -> Self {
        Self {
            settings,
            provider,
            browser,
            registry,
        }
    }

    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    /// Run the consent flow and exchange the captured code for provider credentials.
    #[instrument(name = "oauth_attempt", skip(self), fields(attempt_id = %Uuid::new_v4()))]
    pub async fn initiate(&self) -> Result<IdentityCredentials, AuthError> {
        let state = CsrfToken::new_random();
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let consent_url = self.provider.authorization_url(&state, pkce_challenge);

        // Listen before the browser can possibly redirect.
        let mut listener = CallbackListener::bind(
            self.settings.callback_addr,
            self.settings.redirect_uri.clone(),
            state.secret().as_str(),
            self.settings.callback_timeout,
            &self.registry,
        )
        .await?;

        if let Err(e) = self.browser.launch(&consent_url) {
            warn!(error = %e, "failed to launch browser");
            info!(url = %consent_url, "open this URL in a browser to continue the login");
        }

        let captured = listener.capture().await;
        debug!(
            state = ?listener.state(),
            released = listener.is_closed(),
            "callback listener finished"
        );
        let code = captured?;

        self.provider
            .exchange_code(AuthorizationCode::new(code), pkce_verifier)
            .await
    }

    /// `initiate()` followed by ID token verification.
    pub async fn login(&self) -> Result<VerifiedIdentity, AuthError> {
        let credentials = self.initiate().await?;
        debug!(
            access_token = !credentials.access_token.secret().is_empty(),
            refresh_token = credentials.refresh_token.is_some(),
            "provider credentials received"
        );

        let id_token = credentials
            .id_token
            .as_deref()
            .ok_or_else(|| AuthError::identity("token response has no ID token"))?;

        let user_id = self.provider.verify_id_token(id_token).await?;
        if user_id.trim().is_empty() {
            return Err(AuthError::identity("ID token resolved to an empty user id"));
        }

        info!(user_id = %user_id, "oauth login verified");
        Ok(VerifiedIdentity { user_id })
    }
}
