/*
 * Responsibility
 * - 環境変数や設定の読み込み (Google OAuth クライアント, セッション署名鍵, ポートなど)
 * - 設定値のバリデーション (不足なら起動失敗)
 * - 各コンポーネントには Config から切り出した設定を明示的に渡す (グローバル状態は持たない)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

// HS256 secret must be at least as long as the hash output.
const MIN_JWT_SECRET_BYTES: usize = 32;

// Slack on top of the callback timeout for the token exchange round-trip.
const REQUEST_TIMEOUT_SLACK: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn parse(value: Option<&str>) -> Self {
        match value
            .unwrap_or("development")
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub public_base_url: Url,

    pub google_client_id: String,
    pub google_client_secret: String,
    pub google_redirect_uri: Url,

    // Local listener that receives the provider redirect
    pub callback_addr: SocketAddr,
    pub callback_timeout: Duration,
    pub open_browser: bool,

    pub jwt_secret: String,
    // Session credential lifetime (seconds); the cookie max-age follows it
    pub session_ttl_seconds: u64,
    pub cookie_secure: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print secrets
        f.debug_struct("Config")
            .field("addr", &self.addr)
            .field("app_env", &self.app_env)
            .field("public_base_url", &self.public_base_url.as_str())
            .field("google_client_id", &self.google_client_id)
            .field("google_redirect_uri", &self.google_redirect_uri.as_str())
            .field("callback_addr", &self.callback_addr)
            .field("callback_timeout", &self.callback_timeout)
            .field("open_browser", &self.open_browser)
            .field("session_ttl_seconds", &self.session_ttl_seconds)
            .field("cookie_secure", &self.cookie_secure)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_env = AppEnv::parse(lookup("APP_ENV").as_deref());

        let port: u16 = parse_or(&lookup, "PORT", 3000)?;
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let public_base_url = lookup("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port));
        let public_base_url =
            Url::parse(&public_base_url).map_err(|_| ConfigError::Invalid("PUBLIC_BASE_URL"))?;

        let google_client_id = required(&lookup, "GOOGLE_CLIENT_ID")?;
        let google_client_secret = required(&lookup, "GOOGLE_CLIENT_SECRET")?;

        let callback_port: u16 = parse_or(&lookup, "GOOGLE_REDIRECT_PORT", 3001)?;
        let callback_addr = SocketAddr::from(([127, 0, 0, 1], callback_port));

        let google_redirect_uri = lookup("GOOGLE_REDIRECT_URI")
            .unwrap_or_else(|| format!("http://localhost:{}/", callback_port));
        let google_redirect_uri = Url::parse(&google_redirect_uri)
            .map_err(|_| ConfigError::Invalid("GOOGLE_REDIRECT_URI"))?;
        // The provider must redirect to the port we actually listen on.
        if google_redirect_uri.port_or_known_default() != Some(callback_port) {
            return Err(ConfigError::Invalid("GOOGLE_REDIRECT_URI"));
        }

        let callback_timeout =
            Duration::from_secs(parse_or(&lookup, "OAUTH_CALLBACK_TIMEOUT_SECONDS", 120)?);
        if callback_timeout.is_zero() {
            return Err(ConfigError::Invalid("OAUTH_CALLBACK_TIMEOUT_SECONDS"));
        }

        let open_browser = parse_bool_or(&lookup, "OAUTH_OPEN_BROWSER", true)?;

        let jwt_secret = required(&lookup, "JWT_SECRET")?;
        if jwt_secret.len() < MIN_JWT_SECRET_BYTES {
            return Err(ConfigError::Invalid("JWT_SECRET"));
        }

        let session_ttl_seconds: u64 = parse_or(&lookup, "SESSION_TTL_SECONDS", 3600)?; // 1 hour
        if session_ttl_seconds == 0 {
            return Err(ConfigError::Invalid("SESSION_TTL_SECONDS"));
        }

        let cookie_secure = parse_bool_or(&lookup, "COOKIE_SECURE", app_env.is_production())?;

        Ok(Self {
            addr,
            app_env,
            public_base_url,
            google_client_id,
            google_client_secret,
            google_redirect_uri,
            callback_addr,
            callback_timeout,
            open_browser,
            jwt_secret,
            session_ttl_seconds,
            cookie_secure,
        })
    }

    /// Upper bound for any HTTP request, including `POST /initiate-oauth2`, which waits for
    /// the user to finish the consent screen.
    pub fn request_timeout(&self) -> Duration {
        self.callback_timeout + REQUEST_TIMEOUT_SLACK
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

fn parse_bool_or<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid(key)),
        },
    }
}
