//! Configuration loading for the CMS service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `CMS_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Prefix shared by every configuration key.
pub const ENV_PREFIX: &str = "CMS_";

const REDACTED: &str = "[REDACTED]";

/// Signing secret used when no session secret is configured outside production.
const DEVELOPMENT_SESSION_SECRET: &str = "cms-development-session-secret-do-not-deploy";

/// Application configuration derived from `CMS_*` environment variables.
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_secret: Option<String>,
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_callback_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_password: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cors_allowed_origins: Vec<String>,
    #[serde(default)]
    pub deploy: DeployConfig,
    #[serde(default)]
    pub cdn: CdnConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub public_api: PublicApiConfig,
}

/// External build (CI) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DeployConfig {
    /// Token for the GitHub Actions API. Without it builds are simulated.
    ///
    /// Environment variable: `CMS_GITHUB_TOKEN`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,

    /// Environment variable: `CMS_GITHUB_API_BASE`
    #[serde(default = "default_github_api_base")]
    pub github_api_base: String,

    /// Workflow file dispatched for a build (default: deploy.yml)
    ///
    /// Environment variable: `CMS_GITHUB_WORKFLOW`
    #[serde(default = "default_github_workflow")]
    pub github_workflow: String,

    /// Git ref the workflow runs on (default: main)
    ///
    /// Environment variable: `CMS_GITHUB_REF`
    #[serde(default = "default_github_ref")]
    pub github_ref: String,

    /// Duration of a simulated build in milliseconds (default: 2000)
    ///
    /// Environment variable: `CMS_SIMULATED_BUILD_DELAY_MS`
    #[serde(default = "default_simulated_build_delay_ms")]
    pub simulated_build_delay_ms: u64,
}

/// CDN invalidation endpoint. Both the distribution and the purge URL must be
/// present for invalidation to run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct CdnConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purge_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

/// Media storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MediaConfig {
    /// Directory uploaded objects are written to
    ///
    /// Environment variable: `CMS_MEDIA_ROOT`
    #[serde(default = "default_media_root")]
    pub root: PathBuf,

    /// Base URL under which stored objects are publicly reachable
    ///
    /// Environment variable: `CMS_MEDIA_PUBLIC_BASE_URL`
    #[serde(default = "default_media_public_base_url")]
    pub public_base_url: String,

    /// Environment variable: `CMS_MEDIA_MAX_UPLOAD_BYTES`
    #[serde(default = "default_media_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// Public content gateway cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PublicApiConfig {
    /// Freshness bound for public reads, also sent as `Cache-Control: max-age`
    ///
    /// Environment variable: `CMS_PUBLIC_CACHE_TTL_SECONDS`
    #[serde(default = "default_public_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,

    /// Environment variable: `CMS_PUBLIC_CACHE_CAPACITY`
    #[serde(default = "default_public_cache_capacity")]
    pub cache_capacity: usize,
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
            session_secret: None,
            session_ttl_seconds: default_session_ttl_seconds(),
            deploy_callback_secret: None,
            admin_email: None,
            admin_password: None,
            cors_allowed_origins: Vec::new(),
            deploy: DeployConfig::default(),
            cdn: CdnConfig::default(),
            media: MediaConfig::default(),
            public_api: PublicApiConfig::default(),
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            github_token: None,
            github_api_base: default_github_api_base(),
            github_workflow: default_github_workflow(),
            github_ref: default_github_ref(),
            simulated_build_delay_ms: default_simulated_build_delay_ms(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root: default_media_root(),
            public_base_url: default_media_public_base_url(),
            max_upload_bytes: default_media_max_upload_bytes(),
        }
    }
}

impl Default for PublicApiConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: default_public_cache_ttl_seconds(),
            cache_capacity: default_public_cache_capacity(),
        }
    }
}

impl DeployConfig {
    /// Validate CI dispatch settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_url("GITHUB_API_BASE", &self.github_api_base)?;

        if self.github_workflow.trim().is_empty() {
            return Err(ConfigError::MissingValue {
                key: "GITHUB_WORKFLOW",
            });
        }

        if self.github_ref.trim().is_empty() {
            return Err(ConfigError::MissingValue { key: "GITHUB_REF" });
        }

        if self.simulated_build_delay_ms > 60_000 {
            return Err(ConfigError::InvalidSimulatedBuildDelay {
                value: self.simulated_build_delay_ms,
            });
        }

        Ok(())
    }
}

impl CdnConfig {
    /// Distribution id and purge endpoint, when invalidation is configured.
    pub fn endpoint(&self) -> Option<(&str, &str)> {
        match (self.distribution_id.as_deref(), self.purge_url.as_deref()) {
            (Some(distribution), Some(url)) if !distribution.is_empty() && !url.is_empty() => {
                Some((distribution, url))
            }
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = self.purge_url.as_deref() {
            parse_url("CDN_PURGE_URL", url)?;
        }
        Ok(())
    }
}

impl MediaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_url("MEDIA_PUBLIC_BASE_URL", &self.public_base_url)?;

        if self.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidUploadLimit {
                value: self.max_upload_bytes,
            });
        }

        Ok(())
    }
}

impl PublicApiConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_ttl_seconds == 0 || self.cache_ttl_seconds > 3600 {
            return Err(ConfigError::InvalidPublicCacheTtl {
                value: self.cache_ttl_seconds,
            });
        }

        if self.cache_capacity == 0 {
            return Err(ConfigError::InvalidPublicCacheCapacity {
                value: self.cache_capacity,
            });
        }

        Ok(())
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    pub fn is_production(&self) -> bool {
        self.profile == "production" || self.profile == "prod"
    }

    /// Secret used to sign session tokens.
    ///
    /// Falls back to a fixed development secret when none is configured;
    /// [`AppConfig::validate`] refuses that fallback in production.
    pub fn session_signing_secret(&self) -> &[u8] {
        match self.session_secret.as_deref() {
            Some(secret) if !secret.is_empty() => secret.as_bytes(),
            _ => DEVELOPMENT_SESSION_SECRET.as_bytes(),
        }
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        let redact = |value: &mut Option<String>| {
            if value.is_some() {
                *value = Some(REDACTED.to_string());
            }
        };

        redact(&mut config.session_secret);
        redact(&mut config.deploy_callback_secret);
        redact(&mut config.admin_password);
        redact(&mut config.deploy.github_token);
        redact(&mut config.cdn.api_token);
        config.database_url = redact_url_password(&config.database_url);

        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_production() {
            match self.session_secret.as_deref() {
                None | Some("") => return Err(ConfigError::MissingSessionSecret),
                Some(secret) if secret.len() < 32 => {
                    return Err(ConfigError::WeakSessionSecret {
                        length: secret.len(),
                    });
                }
                Some(_) => {}
            }
        }

        if self.session_ttl_seconds == 0 {
            return Err(ConfigError::InvalidSessionTtl {
                value: self.session_ttl_seconds,
            });
        }

        if self.admin_email.is_some() != self.admin_password.is_some() {
            return Err(ConfigError::IncompleteAdminBootstrap);
        }

        self.deploy.validate()?;
        self.cdn.validate()?;
        self.media.validate()?;
        self.public_api.validate()?;

        Ok(())
    }
}

fn parse_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        key,
        value: value.to_string(),
        source,
    })
}

fn redact_url_password(value: &str) -> String {
    match Url::parse(value) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some(REDACTED));
            url.to_string()
        }
        _ => value.to_string(),
    }
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
    "sqlite://cms.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_session_ttl_seconds() -> u64 {
    604_800 // 7 days
}

fn default_github_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_github_workflow() -> String {
    "deploy.yml".to_string()
}

fn default_github_ref() -> String {
    "main".to_string()
}

fn default_simulated_build_delay_ms() -> u64 {
    2000
}

fn default_media_root() -> PathBuf {
    PathBuf::from("media")
}

fn default_media_public_base_url() -> String {
    "http://localhost:8080/media".to_string()
}

fn default_media_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_public_cache_ttl_seconds() -> u64 {
    60
}

fn default_public_cache_capacity() -> usize {
    512
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
    #[error("session secret is missing; set CMS_SESSION_SECRET")]
    MissingSessionSecret,
    #[error("session secret must be at least 32 bytes in production, got {length}")]
    WeakSessionSecret { length: usize },
    #[error("session ttl must be positive, got {value}")]
    InvalidSessionTtl { value: u64 },
    #[error("CMS_ADMIN_EMAIL and CMS_ADMIN_PASSWORD must be set together")]
    IncompleteAdminBootstrap,
    #[error("{key} must not be empty")]
    MissingValue { key: &'static str },
    #[error("{key} is not a valid URL '{value}': {source}")]
    InvalidUrl {
        key: &'static str,
        value: String,
        source: url::ParseError,
    },
    #[error("simulated build delay must not exceed 60000ms, got {value}")]
    InvalidSimulatedBuildDelay { value: u64 },
    #[error("maximum upload size must be positive, got {value}")]
    InvalidUploadLimit { value: usize },
    #[error("public cache ttl must be between 1 and 3600 seconds, got {value}")]
    InvalidPublicCacheTtl { value: u64 },
    #[error("public cache capacity must be positive, got {value}")]
    InvalidPublicCacheCapacity { value: usize },
}

/// Loads configuration using layered `.env` files and `CMS_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads `.env`, `.env.local`, `.env.<profile>`, `.env.<profile>.local`,
    /// then the process environment, later sources winning.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let mut take = |key: &str| layered.remove(key).filter(|v| !v.trim().is_empty());

        let profile = take("PROFILE").unwrap_or(profile_hint);
        let api_bind_addr = take("API_BIND_ADDR").unwrap_or_else(default_api_bind_addr);
        let log_level = take("LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format = take("LOG_FORMAT").unwrap_or_else(default_log_format);
        let database_url = take("DATABASE_URL").unwrap_or_else(default_database_url);
        let db_max_connections = take("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = take("DB_ACQUIRE_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_acquire_timeout_ms);
        let session_secret = take("SESSION_SECRET");
        let session_ttl_seconds = take("SESSION_TTL_SECONDS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_session_ttl_seconds);
        let deploy_callback_secret = take("DEPLOY_CALLBACK_SECRET");
        let admin_email = take("ADMIN_EMAIL").map(|v| v.trim().to_string());
        let admin_password = take("ADMIN_PASSWORD");
        let cors_allowed_origins = take("CORS_ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let deploy = DeployConfig {
            github_token: take("GITHUB_TOKEN"),
            github_api_base: take("GITHUB_API_BASE").unwrap_or_else(default_github_api_base),
            github_workflow: take("GITHUB_WORKFLOW").unwrap_or_else(default_github_workflow),
            github_ref: take("GITHUB_REF").unwrap_or_else(default_github_ref),
            simulated_build_delay_ms: take("SIMULATED_BUILD_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_simulated_build_delay_ms),
        };

        let cdn = CdnConfig {
            distribution_id: take("CDN_DISTRIBUTION_ID"),
            purge_url: take("CDN_PURGE_URL"),
            api_token: take("CDN_API_TOKEN"),
        };

        let media = MediaConfig {
            root: take("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(default_media_root),
            public_base_url: take("MEDIA_PUBLIC_BASE_URL")
                .unwrap_or_else(default_media_public_base_url),
            max_upload_bytes: take("MEDIA_MAX_UPLOAD_BYTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_media_max_upload_bytes),
        };

        let public_api = PublicApiConfig {
            cache_ttl_seconds: take("PUBLIC_CACHE_TTL_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_public_cache_ttl_seconds),
            cache_capacity: take("PUBLIC_CACHE_CAPACITY")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_public_cache_capacity),
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            session_secret,
            session_ttl_seconds,
            deploy_callback_secret,
            admin_email,
            admin_password,
            cors_allowed_origins,
            deploy,
            cdn,
            media,
            public_api,
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

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
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
