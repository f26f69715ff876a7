/*
 * Responsibility
 * - URL 構造を定義
 * - /, /login, /home (ページ), /initiate-oauth2, /logout (セッション発行/破棄), /health
 * - Session Gate は app.rs で全ルートに掛ける (ここでは拒否しない)
 */
use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

use crate::api::handlers::{
    health::health,
    oauth::{initiate_oauth2, logout},
    pages::{home, login, root},
};

pub const LOGIN_PATH: &str = "/login";
pub const HOME_PATH: &str = "/home";
pub const INITIATE_PATH: &str = "/initiate-oauth2";
pub const LOGOUT_PATH: &str = "/logout";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route(LOGIN_PATH, get(login))
        .route(HOME_PATH, get(home))
        .route(INITIATE_PATH, post(initiate_oauth2))
        .route(LOGOUT_PATH, post(logout))
        .route("/health", get(health))
}
