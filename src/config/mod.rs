use crate::services::signer::MAX_EXPIRES_SECS;
use std::env;
use std::fmt;
use std::ops::RangeInclusive;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Cloudflare R2 credentials and presign settings.
#[derive(Clone)]
pub struct R2Config {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,

    /// Signing region (R2 accepts "auto")
    pub region: String,

    /// Path-style endpoint override, e.g. a MinIO or local test server.
    /// When unset the virtual-hosted R2 host is used.
    pub endpoint: Option<String>,

    /// Public bucket alias, e.g. https://pub-<id>.r2.dev
    pub public_url: Option<String>,

    /// Lifetime of presigned PUT URLs in seconds (default: 3600)
    pub upload_expires_secs: u64,

    /// Lifetime of presigned GET URLs in seconds (default: 300)
    pub download_expires_secs: u64,
}

// Secrets stay out of logs and panic messages.
impl fmt::Debug for R2Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("R2Config")
            .field("account_id", &self.account_id)
            .field("access_key_id", &redact(&self.access_key_id))
            .field("secret_access_key", &"***")
            .field("bucket_name", &self.bucket_name)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("public_url", &self.public_url)
            .field("upload_expires_secs", &self.upload_expires_secs)
            .field("download_expires_secs", &self.download_expires_secs)
            .finish()
    }
}

fn redact(value: &str) -> String {
    let visible: String = value.chars().take(4).collect();
    format!("{}***", visible)
}

impl R2Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup so tests never touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        Ok(Self {
            account_id: required("R2_ACCOUNT_ID")?,
            access_key_id: required("R2_ACCESS_KEY_ID")?,
            secret_access_key: required("R2_SECRET_ACCESS_KEY")?,
            bucket_name: required("R2_BUCKET_NAME")?,
            region: lookup("R2_REGION").unwrap_or_else(|| "auto".to_string()),
            endpoint: lookup("R2_ENDPOINT")
                .filter(|v| !v.is_empty())
                .map(|v| v.trim_end_matches('/').to_string()),
            public_url: lookup("R2_PUBLIC_URL")
                .filter(|v| !v.is_empty())
                .map(|v| v.trim_end_matches('/').to_string()),
            upload_expires_secs: parse_in(
                &lookup,
                "R2_UPLOAD_EXPIRES_SECS",
                3600,
                1..=MAX_EXPIRES_SECS,
            )?,
            download_expires_secs: parse_in(
                &lookup,
                "R2_DOWNLOAD_EXPIRES_SECS",
                300,
                1..=MAX_EXPIRES_SECS,
            )?,
        })
    }

    /// Config pointing at a local path-style endpoint with fixed test credentials
    pub fn development(endpoint: &str) -> Self {
        Self {
            account_id: "dev-account".to_string(),
            access_key_id: "devaccesskey".to_string(),
            secret_access_key: "devsecretkey".to_string(),
            bucket_name: "wallpapers".to_string(),
            region: "auto".to_string(),
            endpoint: Some(endpoint.trim_end_matches('/').to_string()),
            public_url: None,
            upload_expires_secs: 3600,
            download_expires_secs: 300,
        }
    }
}

/// Migration batch settings.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Records per batch (default: 10)
    pub batch_size: u64,

    /// Pause between successive batches in milliseconds (default: 1000)
    pub delay_ms: u64,

    /// Per network call timeout in seconds (default: 30)
    pub request_timeout_secs: u64,

    /// Background worker interval in seconds, 0 disables it (default: 0)
    pub worker_interval_secs: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            delay_ms: 1000,
            request_timeout_secs: 30,
            worker_interval_secs: 0,
        }
    }
}

impl MigrationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        Ok(Self {
            batch_size: parse_or(&lookup, "MIGRATION_BATCH_SIZE", default.batch_size)?,
            delay_ms: parse_or(&lookup, "MIGRATION_DELAY_MS", default.delay_ms)?,
            request_timeout_secs: parse_in(
                &lookup,
                "MIGRATION_REQUEST_TIMEOUT_SECS",
                default.request_timeout_secs,
                1..=u64::MAX,
            )?,
            worker_interval_secs: parse_or(
                &lookup,
                "MIGRATION_WORKER_INTERVAL_SECS",
                default.worker_interval_secs,
            )?,
        })
    }
}

/// Everything the server binary needs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub r2: R2Config,
    pub migration: MigrationConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://wallpapers.db?mode=rwc".to_string()),
            jwt_secret: lookup("JWT_SECRET")
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing("JWT_SECRET"))?,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3000".to_string()),
            r2: R2Config::from_lookup(&lookup)?,
            migration: MigrationConfig::from_lookup(&lookup)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

/// Like `parse_or`, but values outside `range` are rejected at load time.
fn parse_in<F>(
    lookup: &F,
    name: &'static str,
    default: u64,
    range: RangeInclusive<u64>,
) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(lookup, name, default)?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        })
    }
}
