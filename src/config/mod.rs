use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

/// Complete gateway configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub open_edx: OpenEdxConfig,
    #[serde(default)]
    pub moodle: MoodleConfig,
    #[serde(default)]
    pub token_store: TokenStoreConfig,
}

/// Outbound HTTP client settings, applied to every LMS call
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Total per-request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    "lms-gateway/0.1".to_string()
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Open edX adapter settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenEdxConfig {
    /// Token paths tried after the default `/oauth2/access_token`
    #[serde(default)]
    pub alternative_token_paths: Vec<String>,
}

/// Moodle adapter settings
#[derive(Debug, Clone, Deserialize)]
pub struct MoodleConfig {
    /// Token paths tried after the default `/login/token.php`
    #[serde(default)]
    pub alternative_token_paths: Vec<String>,
    /// External service the web-service token is issued for
    #[serde(default = "default_moodle_service")]
    pub service: String,
}

fn default_moodle_service() -> String {
    "moodle_mobile_app".to_string()
}

impl Default for MoodleConfig {
    fn default() -> Self {
        Self {
            alternative_token_paths: Vec::new(),
            service: default_moodle_service(),
        }
    }
}

/// Where access tokens are persisted between runs
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenStoreConfig {
    /// SQLite database path; tokens are kept in memory when unset
    #[serde(default)]
    pub path: Option<String>,
}

impl GatewayConfig {
    /// Applies `LMS_*` environment overrides on top of the loaded values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("LMS_HTTP_TIMEOUT_SECS") {
            if let Ok(n) = v.parse::<u64>() {
                self.http.timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("LMS_HTTP_CONNECT_TIMEOUT_SECS") {
            if let Ok(n) = v.parse::<u64>() {
                self.http.connect_timeout_secs = n;
            }
        }
        if let Ok(path) = std::env::var("LMS_TOKEN_STORE_PATH") {
            if !path.trim().is_empty() {
                self.token_store.path = Some(path);
            }
        }
        self
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<GatewayConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: GatewayConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path))?;
    info!(path = %path, "Loaded gateway configuration");
    Ok(config)
}
