//! Session credential codec.
//!
//! The server's own session token is a compact HS256 JWT whose payload carries exactly one
//! identity claim (`userId`, the provider-issued subject) plus `iat`/`exp`.
//!
//! - Verification is pinned to HS256. A token whose header asserts any other algorithm is
//!   rejected as `Invalid` before its payload is looked at.
//! - Expiry is checked here rather than by `jsonwebtoken` so that a token is expired exactly
//!   at `exp` (no leeway), and so the clock can be injected in tests.

use std::collections::HashSet;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

pub const SESSION_ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Error)]
pub enum SessionTokenError {
    #[error("session signing secret is not configured")]
    MissingSecret,

    #[error("session user id must not be empty")]
    EmptyUserId,

    #[error("failed to sign session token")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("session token expired")]
    Expired,

    #[error("invalid session token: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionClaims {
    #[serde(rename = "userId")]
    user_id: String,
    iat: i64,
    exp: i64,
}

#[derive(Clone)]
pub struct SessionTokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl_seconds: u64,
}

impl std::fmt::Debug for SessionTokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("SessionTokenCodec")
            .field("algorithm", &SESSION_ALGORITHM)
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

impl SessionTokenCodec {
    pub fn new(secret: &[u8], ttl_seconds: u64) -> Result<Self, SessionTokenError> {
        if secret.is_empty() {
            return Err(SessionTokenError::MissingSecret);
        }

        let mut validation = Validation::new(SESSION_ALGORITHM);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl_seconds,
        })
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// Sign a session token for `user_id`, valid for `ttl_seconds` from now.
    pub fn issue(&self, user_id: &str) -> Result<String, SessionTokenError> {
        self.issue_at(user_id, Utc::now().timestamp())
    }

    pub fn issue_at(&self, user_id: &str, now: i64) -> Result<String, SessionTokenError> {
        if user_id.trim().is_empty() {
            return Err(SessionTokenError::EmptyUserId);
        }

        let claims = SessionClaims {
            user_id: user_id.to_string(),
            iat: now,
            exp: now + self.ttl_seconds as i64,
        };

        let mut header = Header::new(SESSION_ALGORITHM);
        header.typ = Some("JWT".to_string());
        jsonwebtoken::encode(&header, &claims, &self.encoding_key).map_err(|e| {
            error!(error = %e, "failed to sign session token");
            SessionTokenError::Signing(e)
        })
    }

    /// Verify a session token and return the identity it carries.
    pub fn verify(&self, token: &str) -> Result<String, SessionTokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    pub fn verify_at(&self, token: &str, now: i64) -> Result<String, SessionTokenError> {
        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidAlgorithm => {
                    SessionTokenError::Invalid("unexpected signing algorithm".to_string())
                }
                _ => SessionTokenError::Invalid(e.to_string()),
            })?;

        if now >= data.claims.exp {
            return Err(SessionTokenError::Expired);
        }
        if data.claims.user_id.trim().is_empty() {
            return Err(SessionTokenError::Invalid("empty 'userId' claim".to_string()));
        }

        Ok(data.claims.user_id)
    }
}
