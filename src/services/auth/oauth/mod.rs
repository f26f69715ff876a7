pub mod browser;
pub mod callback;
pub mod google;
pub mod orchestrator;
#[cfg(test)]
pub mod testing;
pub mod types;

pub use orchestrator::{AuthorizationOrchestrator, OAuthSettings};
pub use types::{IdentityCredentials, IdentityProvider, VerifiedIdentity};
