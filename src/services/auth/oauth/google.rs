//! Google as the identity provider.
//!
//! - Authorization URL and code exchange go through the `oauth2` crate. The token response is
//!   extended with `id_token`, which Google returns for the `openid` scope.
//! - ID tokens are verified against Google's published JWKS: RS256 only, key chosen by `kid`,
//!   `aud` = our client id, `iss` = accounts.google.com.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, jwk::JwkSet};
use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    ExtraTokenFields, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
    StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::services::auth::error::AuthError;
use crate::services::auth::oauth::types::{IdentityCredentials, IdentityProvider};

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_CERTS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

const ID_TOKEN_ALGORITHM: Algorithm = Algorithm::RS256;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdTokenFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl ExtraTokenFields for IdTokenFields {}

type GoogleTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;

/// OAuth client type with auth URL and token URL set.
type ConfiguredClient = oauth2::Client<
    BasicErrorResponse,
    GoogleTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

#[derive(Debug, Clone, Deserialize)]
struct GoogleIdClaims {
    sub: String,
}

#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub certs_url: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            certs_url: GOOGLE_CERTS_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoogleSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Url,
    pub endpoints: GoogleEndpoints,
}

pub struct GoogleProvider {
    client: ConfiguredClient,
    http: reqwest::Client,
    client_id: String,
    certs_url: Url,
}

impl std::fmt::Debug for GoogleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print the client secret
        f.debug_struct("GoogleProvider")
            .field("client_id", &self.client_id)
            .field("certs_url", &self.certs_url.as_str())
            .finish()
    }
}

impl GoogleProvider {
    pub fn new(settings: GoogleSettings) -> Result<Self, AuthError> {
        let invalid = |what: &str, e: &dyn std::fmt::Display| {
            AuthError::Configuration(format!("invalid {what}: {e}"))
        };

        let auth_url =
            AuthUrl::new(settings.endpoints.auth_url).map_err(|e| invalid("auth url", &e))?;
        let token_url =
            TokenUrl::new(settings.endpoints.token_url).map_err(|e| invalid("token url", &e))?;
        let certs_url =
            Url::parse(&settings.endpoints.certs_url).map_err(|e| invalid("certs url", &e))?;
        let redirect_url = RedirectUrl::from_url(settings.redirect_uri);

        let client: ConfiguredClient =
            oauth2::Client::new(ClientId::new(settings.client_id.clone()))
                .set_client_secret(ClientSecret::new(settings.client_secret))
                .set_auth_uri(auth_url)
                .set_token_uri(token_url)
                .set_redirect_uri(redirect_url);

        // Redirects from provider endpoints are never followed.
        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| invalid("http client", &e))?;

        Ok(Self {
            client,
            http,
            client_id: settings.client_id,
            certs_url,
        })
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, AuthError> {
        let response = self
            .http
            .get(self.certs_url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthError::identity(format!("failed to fetch signing keys: {e}")))?;

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::identity(format!("malformed signing keys: {e}")))
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn authorization_url(&self, state: &CsrfToken, pkce_challenge: PkceCodeChallenge) -> Url {
        let (url, _) = self
            .client
            .authorize_url(|| state.clone())
            .add_scope(Scope::new("openid".to_string()))
            .add_extra_param("access_type", "offline")
            .set_pkce_challenge(pkce_challenge)
            .url();
        url
    }

    async fn exchange_code(
        &self,
        code: AuthorizationCode,
        pkce_verifier: PkceCodeVerifier,
    ) -> Result<IdentityCredentials, AuthError> {
        let token = self
            .client
            .exchange_code(code)
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http)
            .await
            .map_err(|e| {
                warn!(error = %e, "google token exchange failed");
                AuthError::Exchange(e.to_string())
            })?;

        Ok(IdentityCredentials {
            access_token: token.access_token().clone(),
            refresh_token: token.refresh_token().cloned(),
            id_token: token.extra_fields().id_token.clone(),
        })
    }

    async fn verify_id_token(&self, id_token: &str) -> Result<String, AuthError> {
        let header = jsonwebtoken::decode_header(id_token)
            .map_err(|e| AuthError::identity(format!("malformed ID token: {e}")))?;

        // Pinned: never let the token choose how it is verified.
        if header.alg != ID_TOKEN_ALGORITHM {
            return Err(AuthError::identity(format!(
                "unexpected ID token algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::identity("ID token has no key id"))?;

        let jwks = self.fetch_jwks().await?;
        let jwk = jwks
            .find(&kid)
            .ok_or_else(|| AuthError::identity(format!("no signing key matches kid {kid}")))?;
        let key = DecodingKey::from_jwk(jwk)
            .map_err(|e| AuthError::identity(format!("unusable signing key: {e}")))?;

        let mut validation = Validation::new(ID_TOKEN_ALGORITHM);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.set_issuer(&GOOGLE_ISSUERS);

        let data = jsonwebtoken::decode::<GoogleIdClaims>(id_token, &key, &validation)
            .map_err(|e| AuthError::identity(e.to_string()))?;

        if data.claims.sub.trim().is_empty() {
            return Err(AuthError::identity("empty 'sub' claim"));
        }

        Ok(data.claims.sub)
    }
}
