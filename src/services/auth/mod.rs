pub mod error;
pub mod factory;
pub mod oauth;
pub mod session_token;

pub use error::AuthError;
pub use factory::{build_orchestrator, build_session_codec};
pub use session_token::{SessionTokenCodec, SessionTokenError};
