/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - sessions: セッショントークンの署名/検証, oauth: Google ログインの実行, cookies: cookie 属性
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 * - 起動時に一度だけ組み立て、以降は読み取り専用
 */
use std::sync::Arc;

use url::Url;

use crate::middleware::auth::session::CookieSettings;
use crate::services::auth::SessionTokenCodec;
use crate::services::auth::oauth::AuthorizationOrchestrator;

#[derive(Clone, Debug)]
pub struct AppState {
    pub sessions: Arc<SessionTokenCodec>,
    pub oauth: Arc<AuthorizationOrchestrator>,
    pub cookies: CookieSettings,
    pub public_base_url: Url,
}

impl AppState {
    pub fn new(
        sessions: Arc<SessionTokenCodec>,
        oauth: Arc<AuthorizationOrchestrator>,
        cookies: CookieSettings,
        public_base_url: Url,
    ) -> Self {
        Self {
            sessions,
            oauth,
            cookies,
            public_base_url,
        }
    }
}
