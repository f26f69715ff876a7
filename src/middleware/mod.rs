/*
 * Responsibility
 * - middleware の公開インターフェース (re-export)
 * - http (request id / trace / limit / timeout), security_headers, auth::session (Session Gate)
 */
pub mod auth;
pub mod http;
pub mod security_headers;
