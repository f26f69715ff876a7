//! In-process stand-ins for the identity provider and the user's browser.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use oauth2::{
    AccessToken, AuthorizationCode, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, RefreshToken,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use url::Url;

use crate::services::auth::error::AuthError;
use crate::services::auth::oauth::browser::BrowserLauncher;
use crate::services::auth::oauth::types::{IdentityCredentials, IdentityProvider};

const ID_TOKEN_PREFIX: &str = "id-token-for-";

/// Reserve a loopback port for a callback listener.
pub fn free_callback_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Accepts exactly one code and mints `id-token-for-<user>` ID tokens.
pub struct FakeProvider {
    code: String,
    user_id: String,
    with_id_token: bool,
}

impl FakeProvider {
    pub fn new(code: &str, user_id: &str) -> Self {
        Self {
            code: code.to_string(),
            user_id: user_id.to_string(),
            with_id_token: true,
        }
    }

    pub fn without_id_token(mut self) -> Self {
        self.with_id_token = false;
        self
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorization_url(&self, state: &CsrfToken, pkce_challenge: PkceCodeChallenge) -> Url {
        Url::parse_with_params(
            "https://consent.example.test/auth",
            &[
                ("state", state.secret().as_str()),
                ("code_challenge", pkce_challenge.as_str()),
            ],
        )
        .unwrap()
    }

    async fn exchange_code(
        &self,
        code: AuthorizationCode,
        _pkce_verifier: PkceCodeVerifier,
    ) -> Result<IdentityCredentials, AuthError> {
        if code.secret() != &self.code {
            return Err(AuthError::Exchange("invalid_grant".to_string()));
        }
        Ok(IdentityCredentials {
            access_token: AccessToken::new("access".to_string()),
            refresh_token: Some(RefreshToken::new("refresh".to_string())),
            id_token: self
                .with_id_token
                .then(|| format!("{ID_TOKEN_PREFIX}{}", self.user_id)),
        })
    }

    async fn verify_id_token(&self, id_token: &str) -> Result<String, AuthError> {
        id_token
            .strip_prefix(ID_TOKEN_PREFIX)
            .map(str::to_string)
            .ok_or_else(|| AuthError::identity("unknown ID token"))
    }
}

enum Redirect {
    Code(String),
    ForgedState(String),
    NoCode,
}

/// Plays the provider's redirect against the callback listener.
pub struct RedirectingBrowser {
    callback: SocketAddr,
    redirect: Redirect,
}

impl RedirectingBrowser {
    pub fn with_code(callback: SocketAddr, code: &str) -> Self {
        Self {
            callback,
            redirect: Redirect::Code(code.to_string()),
        }
    }

    pub fn with_forged_state(callback: SocketAddr, code: &str) -> Self {
        Self {
            callback,
            redirect: Redirect::ForgedState(code.to_string()),
        }
    }

    pub fn without_code(callback: SocketAddr) -> Self {
        Self {
            callback,
            redirect: Redirect::NoCode,
        }
    }
}

impl BrowserLauncher for RedirectingBrowser {
    fn launch(&self, url: &Url) -> io::Result<()> {
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        let target = match &self.redirect {
            Redirect::Code(code) => format!("/?code={code}&state={state}&scope=openid"),
            Redirect::ForgedState(code) => format!("/?code={code}&state=forged"),
            Redirect::NoCode => "/".to_string(),
        };
        let callback = self.callback;

        tokio::spawn(async move {
            let mut stream = TcpStream::connect(callback).await.unwrap();
            stream
                .write_all(format!("GET {target} HTTP/1.1\r\nHost: {callback}\r\n\r\n").as_bytes())
                .await
                .unwrap();
        });
        Ok(())
    }
}

/// The user never completes the consent screen.
pub struct SilentBrowser;

impl BrowserLauncher for SilentBrowser {
    fn launch(&self, _url: &Url) -> io::Result<()> {
        Ok(())
    }
}

pub struct FailingBrowser;

impl BrowserLauncher for FailingBrowser {
    fn launch(&self, _url: &Url) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::NotFound, "no browser available"))
    }
}
