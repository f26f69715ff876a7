//! Transient local listener that catches the provider's redirect.
//!
//! One `CallbackListener` belongs to exactly one authorization attempt:
//!
//! `Listening -> Captured | Failed | TimedOut -> (socket released)`
//!
//! - The first inbound request decides the attempt. A request carrying `code` (and the matching
//!   `state`) is `Captured`; anything else is `Failed`.
//! - After that single request the socket is dropped, so a retried or duplicated redirect can
//!   never resolve the attempt a second time.
//! - Every listener is registered in a [`ListenerRegistry`]; shutting the registry down cancels
//!   all in-flight captures so the port is released on process exit.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

pub const CONFIRMATION_BODY: &str =
    "Authentication successful! You can close this tab and return to the application.";

// Longest request line we are willing to read from the browser.
const MAX_REQUEST_LINE: u64 = 8 * 1024;

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("failed to bind callback listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("no authorization code in callback")]
    MissingCode,

    #[error("authorization denied by provider: {0}")]
    Denied(String),

    #[error("callback state does not match the authorization request")]
    StateMismatch,

    #[error("malformed callback request")]
    Malformed,

    #[error("no callback received within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("callback listener shut down")]
    Shutdown,

    #[error("callback listener already closed")]
    Closed,

    #[error("callback connection failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackState {
    Listening,
    Captured,
    Failed,
    TimedOut,
}

/// Process-wide set of live callback listeners.
#[derive(Clone, Debug, Default)]
pub struct ListenerRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    shutdown: CancellationToken,
    active: AtomicUsize,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of listeners currently holding a port.
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Cancel every in-flight capture. Listeners bound afterwards fail immediately.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    fn register(&self) -> Registration {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        Registration {
            registry: self.clone(),
            cancel: self.inner.shutdown.child_token(),
        }
    }
}

#[derive(Debug)]
struct Registration {
    registry: ListenerRegistry,
    cancel: CancellationToken,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.inner.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct CallbackListener {
    listener: Option<TcpListener>,
    registration: Option<Registration>,
    local_addr: SocketAddr,
    redirect_base: Url,
    expected_state: String,
    timeout: Duration,
    state: CallbackState,
}

impl CallbackListener {
    /// Bind the callback port. A port already held by another attempt fails with `Bind`.
    pub async fn bind(
        addr: SocketAddr,
        redirect_base: Url,
        expected_state: impl Into<String>,
        timeout: Duration,
        registry: &ListenerRegistry,
    ) -> Result<Self, CallbackError> {
        if registry.inner.shutdown.is_cancelled() {
            return Err(CallbackError::Shutdown);
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| CallbackError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        info!(%local_addr, "oauth callback listener started");

        Ok(Self {
            listener: Some(listener),
            registration: Some(registry.register()),
            local_addr,
            redirect_base,
            expected_state: expected_state.into(),
            timeout,
            state: CallbackState::Listening,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> CallbackState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.listener.is_none()
    }

    /// Wait for the single redirect and return its authorization code.
    ///
    /// The socket is released before this returns, whatever the outcome. Calling it again
    /// returns `Closed`.
    pub async fn capture(&mut self) -> Result<String, CallbackError> {
        let Some(listener) = self.listener.take() else {
            return Err(CallbackError::Closed);
        };
        let cancel = match &self.registration {
            Some(registration) => registration.cancel.clone(),
            None => return Err(CallbackError::Closed),
        };

        // Timeout covers the whole exchange: a client that connects and never sends a request
        // line must not hold the attempt open.
        let exchange = async {
            let (stream, peer) = listener.accept().await.map_err(CallbackError::Io)?;
            debug!(%peer, "oauth callback connection accepted");
            self.handle(stream).await
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(CallbackError::Shutdown),
            outcome = tokio::time::timeout(self.timeout, exchange) => match outcome {
                Ok(result) => result,
                Err(_) => Err(CallbackError::Timeout(self.timeout)),
            },
        };

        drop(listener);
        self.close();

        self.state = match &result {
            Ok(_) => CallbackState::Captured,
            Err(CallbackError::Timeout(_)) => CallbackState::TimedOut,
            Err(_) => CallbackState::Failed,
        };

        match &result {
            Ok(_) => info!(local_addr = %self.local_addr, "oauth callback captured"),
            Err(e) => warn!(local_addr = %self.local_addr, error = %e, "oauth callback failed"),
        }

        result
    }

    /// Release the port and deregister. Safe to call any number of times.
    pub fn close(&mut self) {
        self.listener.take();
        self.registration.take();
    }

    async fn handle(&self, mut stream: TcpStream) -> Result<String, CallbackError> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader.take(MAX_REQUEST_LINE));
        let mut request_line = String::new();
        reader.read_line(&mut request_line).await?;

        // No newline: the line hit MAX_REQUEST_LINE or the client hung up mid-request.
        let result = if request_line.ends_with('\n') {
            parse_callback(&self.redirect_base, &request_line, &self.expected_state)
        } else {
            Err(CallbackError::Malformed)
        };

        let response = match &result {
            Ok(_) => http_response("200 OK", CONFIRMATION_BODY),
            Err(e) => http_response("400 Bad Request", &format!("Authentication failed: {e}")),
        };
        // The attempt is decided by the request; a browser that hangs up early does not change it.
        if let Err(e) = writer.write_all(response.as_bytes()).await {
            debug!(error = %e, "failed to answer oauth callback");
        }
        if let Err(e) = writer.shutdown().await {
            debug!(error = %e, "failed to close oauth callback connection");
        }

        result
    }
}

/// Extract the authorization code from a raw HTTP request line
/// (`GET /?code=...&state=... HTTP/1.1`).
pub fn parse_callback(
    redirect_base: &Url,
    request_line: &str,
    expected_state: &str,
) -> Result<String, CallbackError> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or(CallbackError::Malformed)?;
    let url = redirect_base
        .join(target)
        .map_err(|_| CallbackError::Malformed)?;

    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };

    if let Some(error) = param("error") {
        return Err(CallbackError::Denied(error));
    }

    let code = param("code")
        .filter(|c| !c.is_empty())
        .ok_or(CallbackError::MissingCode)?;

    if param("state").as_deref() != Some(expected_state) {
        return Err(CallbackError::StateMismatch);
    }

    Ok(code)
}

fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATE: &str = "state-123";

    fn base() -> Url {
        Url::parse("http://localhost:3001/").unwrap()
    }

    async fn listener(registry: &ListenerRegistry, timeout: Duration) -> CallbackListener {
        CallbackListener::bind(
            "127.0.0.1:0".parse().unwrap(),
            base(),
            STATE,
            timeout,
            registry,
        )
        .await
        .unwrap()
    }

    async fn send(addr: SocketAddr, target: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n").as_bytes())
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn parses_code_and_checks_state() {
        let code = parse_callback(&base(), "GET /?code=abc123&state=state-123 HTTP/1.1\r\n", STATE);
        assert_eq!(code.unwrap(), "abc123");
    }

    #[test]
    fn decodes_percent_encoded_code() {
        let code = parse_callback(
            &base(),
            "GET /?code=4%2F0Adeu&scope=openid&state=state-123 HTTP/1.1",
            STATE,
        );
        assert_eq!(code.unwrap(), "4/0Adeu");
    }

    #[test]
    fn missing_code_is_a_protocol_error() {
        assert!(matches!(
            parse_callback(&base(), "GET / HTTP/1.1", STATE),
            Err(CallbackError::MissingCode)
        ));
        assert!(matches!(
            parse_callback(&base(), "GET /?code=&state=state-123 HTTP/1.1", STATE),
            Err(CallbackError::MissingCode)
        ));
    }

    #[test]
    fn provider_error_is_reported_as_denied() {
        match parse_callback(&base(), "GET /?error=access_denied&state=state-123 HTTP/1.1", STATE) {
            Err(CallbackError::Denied(reason)) => assert_eq!(reason, "access_denied"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn wrong_or_missing_state_is_rejected() {
        assert!(matches!(
            parse_callback(&base(), "GET /?code=abc&state=forged HTTP/1.1", STATE),
            Err(CallbackError::StateMismatch)
        ));
        assert!(matches!(
            parse_callback(&base(), "GET /?code=abc HTTP/1.1", STATE),
            Err(CallbackError::StateMismatch)
        ));
    }

    #[test]
    fn empty_request_line_is_malformed() {
        assert!(matches!(
            parse_callback(&base(), "", STATE),
            Err(CallbackError::Malformed)
        ));
    }

    #[tokio::test]
    async fn captures_code_and_answers_browser() {
        let registry = ListenerRegistry::new();
        let mut listener = listener(&registry, Duration::from_secs(5)).await;
        let addr = listener.local_addr();
        assert_eq!(registry.active(), 1);

        let browser = tokio::spawn(async move { send(addr, "/?code=abc123&state=state-123").await });

        assert_eq!(listener.capture().await.unwrap(), "abc123");
        assert_eq!(listener.state(), CallbackState::Captured);
        assert!(listener.is_closed());
        assert_eq!(registry.active(), 0);

        let response = browser.await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with(CONFIRMATION_BODY));
    }

    #[tokio::test]
    async fn request_without_code_fails_and_releases_port() {
        let registry = ListenerRegistry::new();
        let mut listener = listener(&registry, Duration::from_secs(5)).await;
        let addr = listener.local_addr();

        let browser = tokio::spawn(async move { send(addr, "/").await });

        assert!(matches!(
            listener.capture().await,
            Err(CallbackError::MissingCode)
        ));
        assert_eq!(listener.state(), CallbackState::Failed);
        assert!(browser.await.unwrap().starts_with("HTTP/1.1 400"));

        // The port can be bound again once the attempt is over.
        TcpListener::bind(addr).await.unwrap();
    }

    #[tokio::test]
    async fn only_the_first_redirect_is_honoured() {
        let registry = ListenerRegistry::new();
        let mut listener = listener(&registry, Duration::from_secs(5)).await;
        let addr = listener.local_addr();

        let browser = tokio::spawn(async move { send(addr, "/?code=first&state=state-123").await });
        assert_eq!(listener.capture().await.unwrap(), "first");
        browser.await.unwrap();

        // A retried redirect finds nobody listening, and the attempt cannot resolve twice.
        assert!(TcpStream::connect(addr).await.is_err());
        assert!(matches!(listener.capture().await, Err(CallbackError::Closed)));
        assert_eq!(listener.state(), CallbackState::Captured);
    }

    #[tokio::test]
    async fn abandoned_consent_times_out() {
        let registry = ListenerRegistry::new();
        let mut listener = listener(&registry, Duration::from_millis(50)).await;

        assert!(matches!(
            listener.capture().await,
            Err(CallbackError::Timeout(_))
        ));
        assert_eq!(listener.state(), CallbackState::TimedOut);
        assert_eq!(registry.active(), 0);
    }

    #[tokio::test]
    async fn idle_connection_still_times_out() {
        let registry = ListenerRegistry::new();
        let mut listener = listener(&registry, Duration::from_millis(100)).await;

        // Connects like a browser preconnect, never sends a request line.
        let _idle = TcpStream::connect(listener.local_addr()).await.unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(2), listener.capture()).await;
        assert!(matches!(outcome, Ok(Err(CallbackError::Timeout(_)))));
        assert_eq!(listener.state(), CallbackState::TimedOut);
        assert_eq!(registry.active(), 0);
    }

    #[tokio::test]
    async fn shutdown_reaches_a_capture_stuck_on_an_idle_connection() {
        let registry = ListenerRegistry::new();
        let mut listener = listener(&registry, Duration::from_secs(30)).await;
        let _idle = TcpStream::connect(listener.local_addr()).await.unwrap();

        let shutdown = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown.shutdown();
        });

        let outcome = tokio::time::timeout(Duration::from_secs(2), listener.capture()).await;
        assert!(matches!(outcome, Ok(Err(CallbackError::Shutdown))));
        assert!(listener.is_closed());
    }

    #[tokio::test]
    async fn oversized_request_line_is_malformed_not_truncated() {
        let registry = ListenerRegistry::new();
        let mut listener = listener(&registry, Duration::from_secs(5)).await;
        let addr = listener.local_addr();

        let code = "a".repeat(MAX_REQUEST_LINE as usize);
        tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            // The listener stops reading at the limit and may reset the connection.
            let request = format!("GET /?state=state-123&code={code} HTTP/1.1\r\n\r\n");
            let _ = stream.write_all(request.as_bytes()).await;
        });

        assert!(matches!(
            listener.capture().await,
            Err(CallbackError::Malformed)
        ));
        assert_eq!(listener.state(), CallbackState::Failed);
    }

    #[tokio::test]
    async fn second_listener_on_a_held_port_fails_to_bind() {
        let registry = ListenerRegistry::new();
        let first = listener(&registry, Duration::from_secs(5)).await;

        let second = CallbackListener::bind(
            first.local_addr(),
            base(),
            STATE,
            Duration::from_secs(5),
            &registry,
        )
        .await;
        assert!(matches!(second, Err(CallbackError::Bind { .. })));
        assert_eq!(registry.active(), 1);
    }

    #[tokio::test]
    async fn registry_shutdown_cancels_in_flight_capture() {
        let registry = ListenerRegistry::new();
        let mut listener = listener(&registry, Duration::from_secs(30)).await;

        let shutdown = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            shutdown.shutdown();
        });

        assert!(matches!(
            listener.capture().await,
            Err(CallbackError::Shutdown)
        ));
        assert_eq!(registry.active(), 0);

        let late = CallbackListener::bind(
            "127.0.0.1:0".parse().unwrap(),
            base(),
            STATE,
            Duration::from_secs(5),
            &registry,
        )
        .await;
        assert!(matches!(late, Err(CallbackError::Shutdown)));
    }

    #[tokio::test]
    async fn dropping_a_listener_deregisters_it() {
        let registry = ListenerRegistry::new();
        let listener = listener(&registry, Duration::from_secs(5)).await;
        assert_eq!(registry.active(), 1);
        drop(listener);
        assert_eq!(registry.active(), 0);
    }
}
