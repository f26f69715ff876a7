/// Factory: build auth services from application `Config`.
use std::sync::Arc;

use crate::config::Config;
use crate::services::auth::AuthError;
use crate::services::auth::oauth::browser::{BrowserLauncher, LogOnlyBrowser, SystemBrowser};
use crate::services::auth::oauth::callback::ListenerRegistry;
use crate::services::auth::oauth::google::{GoogleEndpoints, GoogleProvider, GoogleSettings};
use crate::services::auth::oauth::{AuthorizationOrchestrator, OAuthSettings};
use crate::services::auth::session_token::SessionTokenCodec;

pub fn build_session_codec(config: &Config) -> Result<Arc<SessionTokenCodec>, AuthError> {
    let codec = SessionTokenCodec::new(config.jwt_secret.as_bytes(), config.session_ttl_seconds)?;
    Ok(Arc::new(codec))
}

pub fn build_orchestrator(
    config: &Config,
    registry: ListenerRegistry,
) -> Result<Arc<AuthorizationOrchestrator>, AuthError> {
    let provider = GoogleProvider::new(GoogleSettings {
        client_id: config.google_client_id.clone(),
        client_secret: config.google_client_secret.clone(),
        redirect_uri: config.google_redirect_uri.clone(),
        endpoints: GoogleEndpoints::default(),
    })?;

    let browser: Arc<dyn BrowserLauncher> = if config.open_browser {
        Arc::new(SystemBrowser)
    } else {
        Arc::new(LogOnlyBrowser)
    };

    let settings = OAuthSettings {
        redirect_uri: config.google_redirect_uri.clone(),
        callback_addr: config.callback_addr,
        callback_timeout: config.callback_timeout,
    };

    Ok(Arc::new(AuthorizationOrchestrator::new(
        settings,
        Arc::new(provider),
        browser,
        registry,
    )))
}
