/*
 * Responsibility
 * - Config読み込み → 依存生成 → Router 組み立て
 * - Middleware の適用 (Session Gate / security headers / request id / trace / timeout)
 * - axum::serve() で起動、Ctrl-C で callback listener を含めて後片付け
 */
use std::{panic, process, time::Duration};

use anyhow::Result;
use axum::Router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::middleware::{self, auth::session::CookieSettings};
use crate::services::auth::oauth::callback::ListenerRegistry;
use crate::services::auth::{build_orchestrator, build_session_codec};
use crate::{api, state::AppState};

fn init_tracing() {
    // RUST_LOG wins when set. Attempt spans (`oauth_attempt`) and listener events log at info;
    // debug adds session-gate downgrades and callback connection details:
    // RUST_LOG=info,hello_oauth=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// A panic inside a request task (a login waiting on the callback port included) is
/// caught by the runtime and only shows up as a dropped connection. Route it through tracing so
/// it carries the `oauth_attempt` span; in development, abort so it cannot go unnoticed.
fn init_panic_hook(abort_on_panic: bool) {
    let fallback = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(panic = %info, "request task panicked");
        fallback(info);

        if abort_on_panic {
            process::abort();
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting server in {:?} mode on {} (public url {}, oauth callback on {})",
        config.app_env,
        config.addr,
        config.public_base_url,
        config.callback_addr
    );

    let state = build_state(&config, ListenerRegistry::new())?;
    let registry = state.oauth.registry().clone();
    let app = build_router(state, config.request_timeout());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await?;

    Ok(())
}

fn build_state(config: &Config, registry: ListenerRegistry) -> Result<AppState> {
    // Process-level services, built once and injected into the shared application state.
    let sessions = build_session_codec(config)?;
    let oauth = build_orchestrator(config, registry)?;

    let cookies = CookieSettings {
        secure: config.cookie_secure,
        // The cookie never outlives the credential it carries.
        max_age_seconds: i64::try_from(sessions.ttl_seconds())?,
    };

    Ok(AppState::new(
        sessions,
        oauth,
        cookies,
        config.public_base_url.clone(),
    ))
}

pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let routes = middleware::auth::session::apply(api::routes(), state.clone());

    let router = Router::new().merge(routes).with_state(state);
    let router = middleware::security_headers::apply(router);
    middleware::http::apply(router, request_timeout)
}

async fn shutdown_signal(registry: ListenerRegistry) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install shutdown signal handler");
        std::future::pending::<()>().await;
    }

    tracing::info!(
        active_callback_listeners = registry.active(),
        "shutdown signal received"
    );
    // Release the callback port even if a login is still waiting for the browser.
    registry.shutdown();
}
