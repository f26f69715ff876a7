/*!
 * Session context extractor
 *
 * Responsibility:
 * - セッションの認証状態（SessionStatus）を handler に提供する
 * - HTTP / axum 依存は core に閉じ込め、型定義は types に分離する
 *
 * Public API:
 * - Session
 * - SessionStatus
 * - UnauthenticatedReason
 */

mod core;
mod types;

pub use core::Session;
pub use types::{SessionStatus, UnauthenticatedReason};
