use axum::extract::FromRequestParts;
use axum::http::{StatusCode, request::Parts};

use crate::state::AppState;

use super::{SessionStatus, UnauthenticatedReason};

/// Handler で、セッションの認証状態を受け取るための extractor
/// middleware が SessionStatus を request.extensions() に insert 済みである前提
/// 見つからない場合は 401 を返す（ミドルウェア未設定）
pub struct Session(SessionStatus);

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.0.is_authenticated()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.0.user_id()
    }

    pub fn reason(&self) -> Option<UnauthenticatedReason> {
        self.0.reason()
    }
}

impl FromRequestParts<AppState> for Session
where
    AppState: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionStatus>()
            .cloned()
            .map(Session)
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}
