//! Session Gate: session cookie 検証 → SessionStatus を extensions に入れる
//!
//! - This middleware never rejects a request. A missing, expired or tampered cookie only
//!   leaves the request unauthenticated; routes decide what that means (usually a redirect
//!   to `/login`).
//! - Session issuance lives here too, so the cookie name and attributes are defined once.

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::debug;

use crate::api::extractors::{SessionStatus, UnauthenticatedReason};
use crate::services::auth::{AuthError, SessionTokenCodec, SessionTokenError};
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "token";

/// Attributes of the session cookie.
#[derive(Debug, Clone, Copy)]
pub struct CookieSettings {
    pub secure: bool,
    pub max_age_seconds: i64,
}

/// 全ルートに Session Gate を掛ける。
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    router.layer(middleware::from_fn_with_state(state, session_gate))
}

async fn session_gate(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let status = authenticate(&state.sessions, &jar);

    // middleware → extractor への受け渡し
    req.extensions_mut().insert(status);

    next.run(req).await
}

/// Resolve the session carried by `jar`, if any.
pub fn authenticate(codec: &SessionTokenCodec, jar: &CookieJar) -> SessionStatus {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return SessionStatus::Unauthenticated(UnauthenticatedReason::MissingCookie);
    };

    match codec.verify(cookie.value()) {
        Ok(user_id) => SessionStatus::Authenticated { user_id },
        // TODO: refresh the session from the provider's refresh token instead of dropping it.
        Err(SessionTokenError::Expired) => {
            debug!("session token expired");
            SessionStatus::Unauthenticated(UnauthenticatedReason::Expired)
        }
        Err(err) => {
            debug!(error = %err, "session token rejected");
            SessionStatus::Unauthenticated(UnauthenticatedReason::Invalid)
        }
    }
}

/// Mint a session for a verified provider user id and add it to `jar`.
///
/// An empty id means identity verification failed upstream; no session is issued.
pub fn issue_session(
    codec: &SessionTokenCodec,
    settings: CookieSettings,
    jar: CookieJar,
    user_id: &str,
) -> Result<CookieJar, AuthError> {
    if user_id.trim().is_empty() {
        return Err(AuthError::identity("empty user id"));
    }

    let token = codec.issue(user_id)?;
    Ok(jar.add(session_cookie(token, settings)))
}

/// Remove the session cookie from the browser.
pub fn clear_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

fn session_cookie(token: String, settings: CookieSettings) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .secure(settings.secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(settings.max_age_seconds))
        .build()
}
