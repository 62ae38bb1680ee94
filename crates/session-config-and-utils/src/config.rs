//! Configuration for the session layer.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default API base URL (can be overridden at compile time via SESSION_GUARD_API_URL env var).
pub const DEFAULT_API_URL: &str = match option_env!("SESSION_GUARD_API_URL") {
    Some(url) => url,
    None => "http://localhost:8080/api",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Value stamped into the client-type header of every request.
pub const DEFAULT_CLIENT_TYPE: &str = "web";

/// Lifetime of the mirrored `access_token` cookie.
pub const DEFAULT_ACCESS_COOKIE_MAX_AGE_SECS: u64 = 60 * 60;

/// Transport timeout for every HTTP call.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Paths of the authentication endpoints, relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub login: String,
    pub verify_two_factor: String,
    pub refresh: String,
    pub logout: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            verify_two_factor: "/auth/verify-2fa".to_string(),
            refresh: "/auth/refresh".to_string(),
            logout: "/auth/logout".to_string(),
        }
    }
}

/// Redirect hints returned to callers by the auth facade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    pub login: String,
    pub two_factor: String,
    pub home: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            two_factor: "/verify-2fa".to_string(),
            home: "/".to_string(),
        }
    }
}

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// API base URL; endpoint and request paths are appended to it.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Client-type marker sent with every request.
    #[serde(default = "default_client_type")]
    pub client_type: String,
    /// Max-Age of the mirrored access-token cookie.
    #[serde(default = "default_cookie_max_age")]
    pub access_cookie_max_age_secs: u64,
    /// Transport timeout for every HTTP call.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Write JSONL logs under the logs directory.
    #[serde(default)]
    pub log_to_file: bool,
    #[serde(default)]
    pub endpoints: EndpointConfig,
    #[serde(default)]
    pub routes: RouteConfig,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_client_type() -> String {
    DEFAULT_CLIENT_TYPE.to_string()
}

fn default_cookie_max_age() -> u64 {
    DEFAULT_ACCESS_COOKIE_MAX_AGE_SECS
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            api_url: default_api_url(),
            client_type: default_client_type(),
            access_cookie_max_age_secs: DEFAULT_ACCESS_COOKIE_MAX_AGE_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            log_to_file: false,
            endpoints: EndpointConfig::default(),
            routes: RouteConfig::default(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Create a Config pointing at a specific API base URL.
    pub fn for_api(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        if let Some(level) = non_empty_env("SESSION_GUARD_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = non_empty_env("SESSION_GUARD_API_URL") {
            self.api_url = url;
        }
        if let Some(client_type) = non_empty_env("SESSION_GUARD_CLIENT_TYPE") {
            self.client_type = client_type;
        }
    }

    /// Reject configurations the session layer cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        self.api_url()?;

        if self.client_type.trim().is_empty() {
            return Err(CoreError::Config("client_type must not be empty".to_string()));
        }

        let endpoints = [
            &self.endpoints.login,
            &self.endpoints.verify_two_factor,
            &self.endpoints.refresh,
            &self.endpoints.logout,
        ];
        if let Some(bad) = endpoints.iter().find(|p| !p.starts_with('/')) {
            return Err(CoreError::Config(format!(
                "endpoint path must start with '/': {}",
                bad
            )));
        }

        Ok(())
    }

    /// Get the API base URL as a parsed URL.
    pub fn api_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_url).map_err(CoreError::from)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}
