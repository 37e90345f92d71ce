//! Configuration loading for the Emby webhooks service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `EMBY_WEBHOOKS_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Prefix every recognised environment variable carries.
pub const ENV_PREFIX: &str = "EMBY_WEBHOOKS_";

/// Application configuration derived from `EMBY_WEBHOOKS_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    /// Shared secret expected in the `secret` query parameter of inbound webhooks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub emby: EmbyConfig,
    #[serde(default)]
    pub tvdb: TvdbConfig,
    #[serde(default)]
    pub tmdb: TmdbConfig,
    /// Per-request timeout applied to every outbound provider call
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
    #[serde(default)]
    pub token_cache_backend: TokenCacheBackend,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

/// Native media server settings. Image URLs are only generated when `base_url` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct EmbyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// TV metadata database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TvdbConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_tvdb_api_url")]
    pub api_url: String,
}

/// Movie database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TmdbConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_tmdb_api_url")]
    pub api_url: String,
}

/// Where the TVDB auth token is cached between requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TokenCacheBackend {
    /// Process-local LRU cache
    #[default]
    Memory,
    /// `cache_entries` table, shared by every process using the same database
    Database,
}

impl std::str::FromStr for TokenCacheBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "database" | "db" => Ok(Self::Database),
            other => Err(ConfigError::InvalidTokenCacheBackend {
                value: other.to_string(),
            }),
        }
    }
}

/// Dashboard presentation settings
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DashboardConfig {
    /// Client refresh interval advertised to the dashboard (default: 30)
    ///
    /// Environment variable: `EMBY_WEBHOOKS_DASHBOARD_REFRESH_SECONDS`
    #[serde(default = "default_dashboard_refresh_seconds")]
    #[schema(example = 30)]
    pub refresh_seconds: u64,

    /// Include the verbatim payload in detail views (default: true)
    ///
    /// Environment variable: `EMBY_WEBHOOKS_SHOW_RAW_DATA`
    #[serde(default = "default_true")]
    pub show_raw_data: bool,

    /// Include the item's file path (default: true)
    ///
    /// Environment variable: `EMBY_WEBHOOKS_SHOW_FILE_LOCATION`
    #[serde(default = "default_true")]
    pub show_file_location: bool,

    /// Include user and server details (default: true)
    ///
    /// Environment variable: `EMBY_WEBHOOKS_SHOW_EVENT_DETAILS`
    #[serde(default = "default_true")]
    pub show_event_details: bool,

    /// Records per dashboard page (default: 20, range: 1-100)
    ///
    /// Environment variable: `EMBY_WEBHOOKS_PAGINATION_PER_PAGE`
    #[serde(default = "default_pagination_per_page")]
    #[schema(example = 20, minimum = 1, maximum = 100)]
    pub per_page: u64,

    /// Window in minutes during which an event counts as recently added (default: 60)
    ///
    /// Environment variable: `EMBY_WEBHOOKS_RECENTLY_ADDED_MINUTES`
    #[serde(default = "default_recently_added_minutes")]
    #[schema(example = 60)]
    pub recently_added_minutes: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            webhook_secret: None,
            emby: EmbyConfig::default(),
            tvdb: TvdbConfig::default(),
            tmdb: TmdbConfig::default(),
            provider_timeout_ms: default_provider_timeout_ms(),
            token_cache_backend: TokenCacheBackend::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

impl Default for TvdbConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_tvdb_api_url(),
        }
    }
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_tmdb_api_url(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_seconds: default_dashboard_refresh_seconds(),
            show_raw_data: true,
            show_file_location: true,
            show_event_details: true,
            per_page: default_pagination_per_page(),
            recently_added_minutes: default_recently_added_minutes(),
        }
    }
}

impl DashboardConfig {
    /// Validate dashboard configuration bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.per_page == 0 || self.per_page > 100 {
            return Err(ConfigError::InvalidPerPage {
                value: self.per_page,
            });
        }

        if self.refresh_seconds == 0 {
            return Err(ConfigError::InvalidRefreshInterval {
                value: self.refresh_seconds,
            });
        }

        if self.recently_added_minutes < 1 {
            return Err(ConfigError::InvalidRecentlyAddedWindow {
                value: self.recently_added_minutes,
            });
        }

        Ok(())
    }

    /// The recently-added window as a duration.
    pub fn recently_added_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.recently_added_minutes)
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Timeout for outbound provider requests.
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.webhook_secret.is_some() {
            config.webhook_secret = Some("[REDACTED]".to_string());
        }
        if config.emby.api_key.is_some() {
            config.emby.api_key = Some("[REDACTED]".to_string());
        }
        if config.tvdb.api_key.is_some() {
            config.tvdb.api_key = Some("[REDACTED]".to_string());
        }
        if config.tmdb.api_key.is_some() {
            config.tmdb.api_key = Some("[REDACTED]".to_string());
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(base_url) = &self.emby.base_url {
            validate_url("EMBY_BASE_URL", base_url)?;
        }
        validate_url("TVDB_API_URL", &self.tvdb.api_url)?;
        validate_url("TMDB_API_URL", &self.tmdb.api_url)?;

        if self.provider_timeout_ms < 100 {
            return Err(ConfigError::InvalidProviderTimeout {
                value: self.provider_timeout_ms,
            });
        }

        self.dashboard.validate()?;

        Ok(())
    }
}

fn validate_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|source| ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
            source,
        })
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "sqlite://emby_webhooks.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_provider_timeout_ms() -> u64 {
    5000
}

fn default_tvdb_api_url() -> String {
    "https://api4.thetvdb.com/v4".to_string()
}

fn default_tmdb_api_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_dashboard_refresh_seconds() -> u64 {
    30
}

fn default_pagination_per_page() -> u64 {
    20
}

fn default_recently_added_minutes() -> i64 {
    60
}

fn default_true() -> bool {
    true
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("{field} is not a valid URL '{value}': {source}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        source: url::ParseError,
    },
    #[error("{field} must be a boolean, got '{value}'")]
    InvalidBool { field: &'static str, value: String },
    #[error("provider timeout must be at least 100 ms, got {value}")]
    InvalidProviderTimeout { value: u64 },
    #[error("token cache backend must be 'memory' or 'database', got '{value}'")]
    InvalidTokenCacheBackend { value: String },
    #[error("pagination page size must be between 1 and 100, got {value}")]
    InvalidPerPage { value: u64 },
    #[error("dashboard refresh interval must be positive, got {value}")]
    InvalidRefreshInterval { value: u64 },
    #[error("recently added window must be at least 1 minute, got {value}")]
    InvalidRecentlyAddedWindow { value: i64 },
}

/// Parses the boolean spellings accepted in env files.
fn parse_bool(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            field,
            value: value.to_string(),
        }),
    }
}

/// Treats blank values as unset.
fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|val| {
        let trimmed = val.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Loads configuration using layered `.env` files and `EMBY_WEBHOOKS_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
    include_process_env: bool,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            include_process_env: true,
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            include_process_env: true,
        }
    }

    /// Ignores the process environment so only env files are read.
    pub fn without_process_env(mut self) -> Self {
        self.include_process_env = false;
        self
    }

    /// Loads and validates configuration.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        if self.include_process_env {
            for (key, value) in env::vars() {
                if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                    layered.insert(stripped.to_string(), value);
                }
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let api_bind_addr = layered
            .remove("API_BIND_ADDR")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_api_bind_addr);
        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);
        let log_format = layered
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_format);
        let database_url = layered
            .remove("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_database_url);
        let db_max_connections = layered
            .remove("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = layered
            .remove("DB_ACQUIRE_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_acquire_timeout_ms);

        let webhook_secret = non_empty(layered.remove("WEBHOOK_SECRET"));

        let emby = EmbyConfig {
            base_url: non_empty(layered.remove("EMBY_BASE_URL")),
            api_key: non_empty(layered.remove("EMBY_API_KEY")),
        };
        let tvdb = TvdbConfig {
            api_key: non_empty(layered.remove("TVDB_API_KEY")),
            api_url: non_empty(layered.remove("TVDB_API_URL"))
                .unwrap_or_else(default_tvdb_api_url),
        };
        let tmdb = TmdbConfig {
            api_key: non_empty(layered.remove("TMDB_API_KEY")),
            api_url: non_empty(layered.remove("TMDB_API_URL"))
                .unwrap_or_else(default_tmdb_api_url),
        };

        let provider_timeout_ms = layered
            .remove("PROVIDER_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_provider_timeout_ms);

        let token_cache_backend = match non_empty(layered.remove("TOKEN_CACHE_BACKEND")) {
            Some(value) => value.parse()?,
            None => TokenCacheBackend::default(),
        };

        let bool_flag = |layered: &mut BTreeMap<String, String>,
                         key: &'static str|
         -> Result<bool, ConfigError> {
            match non_empty(layered.remove(key)) {
                Some(value) => parse_bool(key, &value),
                None => Ok(true),
            }
        };

        let dashboard = DashboardConfig {
            refresh_seconds: layered
                .remove("DASHBOARD_REFRESH_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_dashboard_refresh_seconds),
            show_raw_data: bool_flag(&mut layered, "SHOW_RAW_DATA")?,
            show_file_location: bool_flag(&mut layered, "SHOW_FILE_LOCATION")?,
            show_event_details: bool_flag(&mut layered, "SHOW_EVENT_DETAILS")?,
            per_page: layered
                .remove("PAGINATION_PER_PAGE")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_pagination_per_page),
            recently_added_minutes: layered
                .remove("RECENTLY_ADDED_MINUTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_recently_added_minutes),
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            webhook_secret,
            emby,
            tvdb,
            tmdb,
            provider_timeout_ms,
            token_cache_backend,
            dashboard,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let process_profile = if self.include_process_env {
            env::var(format!("{ENV_PREFIX}PROFILE")).ok()
        } else {
            None
        };
        let profile = process_profile
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dashboard.per_page, 20);
        assert_eq!(config.dashboard.recently_added_minutes, 60);
        assert_eq!(config.tvdb.api_url, "https://api4.thetvdb.com/v4");
        assert_eq!(config.tmdb.api_url, "https://api.themoviedb.org/3");
        assert_eq!(config.token_cache_backend, TokenCacheBackend::Memory);
    }

    #[test]
    fn test_dashboard_validation() {
        let mut dashboard = DashboardConfig::default();
        dashboard.per_page = 0;
        assert!(matches!(
            dashboard.validate(),
            Err(ConfigError::InvalidPerPage { value: 0 })
        ));

        let mut dashboard = DashboardConfig::default();
        dashboard.per_page = 101;
        assert!(dashboard.validate().is_err());

        let mut dashboard = DashboardConfig::default();
        dashboard.recently_added_minutes = 0;
        assert!(matches!(
            dashboard.validate(),
            Err(ConfigError::InvalidRecentlyAddedWindow { value: 0 })
        ));
    }

    #[test]
    fn test_invalid_provider_url_rejected() {
        let mut config = AppConfig::default();
        config.emby.base_url = Some("not a url".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl {
                field: "EMBY_BASE_URL",
                ..
            })
        ));
    }

    #[test]
    fn test_redacted_json_hides_secrets() {
        let mut config = AppConfig::default();
        config.webhook_secret = Some("hunter2".to_string());
        config.tvdb.api_key = Some("tvdb-key".to_string());
        config.tmdb.api_key = Some("tmdb-key".to_string());
        config.emby.api_key = Some("emby-key".to_string());

        let json = config.redacted_json().unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("tvdb-key"));
        assert!(!json.contains("tmdb-key"));
        assert!(!json.contains("emby-key"));
        assert!(json.contains("[REDACTED]"));
    }

    #[test]
    fn test_parse_bool_spellings() {
        assert!(parse_bool("SHOW_RAW_DATA", "true").unwrap());
        assert!(parse_bool("SHOW_RAW_DATA", "1").unwrap());
        assert!(!parse_bool("SHOW_RAW_DATA", "false").unwrap());
        assert!(!parse_bool("SHOW_RAW_DATA", "Off").unwrap());
        assert!(parse_bool("SHOW_RAW_DATA", "maybe").is_err());
    }

    #[test]
    fn test_token_cache_backend_from_str() {
        assert_eq!(
            "memory".parse::<TokenCacheBackend>().unwrap(),
            TokenCacheBackend::Memory
        );
        assert_eq!(
            "Database".parse::<TokenCacheBackend>().unwrap(),
            TokenCacheBackend::Database
        );
        assert!("redis".parse::<TokenCacheBackend>().is_err());
    }

    #[test]
    fn test_layered_env_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(".env"),
            "EMBY_WEBHOOKS_PROFILE=staging\nEMBY_WEBHOOKS_PAGINATION_PER_PAGE=10\nEMBY_WEBHOOKS_WEBHOOK_SECRET=base\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(".env.staging"),
            "EMBY_WEBHOOKS_WEBHOOK_SECRET=staging-secret\nEMBY_WEBHOOKS_SHOW_RAW_DATA=false\nEMBY_WEBHOOKS_EMBY_BASE_URL=http://emby.local:8096/\nUNRELATED=ignored\n",
        )
        .unwrap();

        let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
            .without_process_env()
            .load()
            .unwrap();

        assert_eq!(config.profile, "staging");
        assert_eq!(config.dashboard.per_page, 10);
        assert_eq!(config.webhook_secret.as_deref(), Some("staging-secret"));
        assert!(!config.dashboard.show_raw_data);
        assert!(config.dashboard.show_file_location);
        assert_eq!(
            config.emby.base_url.as_deref(),
            Some("http://emby.local:8096/")
        );
    }

    #[test]
    fn test_blank_secret_is_unset() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env"), "EMBY_WEBHOOKS_WEBHOOK_SECRET=   \n").unwrap();

        let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
            .without_process_env()
            .load()
            .unwrap();

        assert!(config.webhook_secret.is_none());
    }

    #[test]
    fn test_invalid_bool_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env"), "EMBY_WEBHOOKS_SHOW_RAW_DATA=perhaps\n").unwrap();

        let result = ConfigLoader::with_base_dir(dir.path().to_path_buf())
            .without_process_env()
            .load();

        assert!(matches!(result, Err(ConfigError::InvalidBool { .. })));
    }
}
