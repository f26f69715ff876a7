/*
 * Responsibility
 * - POST /initiate-oauth2: Google ログインを実行し、成功時にセッション cookie を発行 (200)
 *   失敗時は 401 + JSON エラー
 * - POST /logout: セッション cookie を削除して /login へ
 */
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Redirect;
use axum_extra::extract::cookie::CookieJar;
use tracing::{info, warn};

use crate::api::routes::LOGIN_PATH;
use crate::error::AppError;
use crate::middleware::auth::session::{clear_session, issue_session};
use crate::state::AppState;

pub async fn initiate_oauth2(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), AppError> {
    let identity = state.oauth.login().await.map_err(|e| {
        warn!(error = %e, "oauth2 login failed");
        AppError::from(e)
    })?;

    let jar = issue_session(&state.sessions, state.cookies, jar, &identity.user_id).map_err(|e| {
        warn!(error = %e, "failed to issue session");
        AppError::from(e)
    })?;

    info!(user_id = %identity.user_id, "session issued");
    Ok((jar, StatusCode::OK))
}

pub async fn logout(jar: CookieJar) -> (CookieJar, Redirect) {
    (clear_session(jar), Redirect::to(LOGIN_PATH))
}
