/*
 * Responsibility
 * - Handler から見える「セッションの認証状態」の型
 * - middleware (Session Gate) が検証して request extensions に格納し、handler はこの型だけを受け取る
 *
 * Notes
 * - セッショントークンの署名/期限検証は middleware/services 側の責務
 * - 未認証の理由 (cookie なし / 期限切れ / 不正) はログ用。レスポンスは理由によらず同じ
 */

/// Why a request carries no usable session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthenticatedReason {
    MissingCookie,
    Expired,
    Invalid,
}

/// Result of the session gate for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// `user_id` is the provider-issued subject carried by the session token.
    Authenticated { user_id: String },
    Unauthenticated(UnauthenticatedReason),
}

impl SessionStatus {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Authenticated { user_id } => Some(user_id),
            Self::Unauthenticated(_) => None,
        }
    }

    pub fn reason(&self) -> Option<UnauthenticatedReason> {
        match self {
            Self::Authenticated { .. } => None,
            Self::Unauthenticated(reason) => Some(*reason),
        }
    }
}
