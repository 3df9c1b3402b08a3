//! Runtime configuration.
//!
//! Settings come from environment variables. [`Config::from_lookup`] takes
//! the variable source as a function so tests never touch the process
//! environment.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::credentials::DEFAULT_CREDENTIAL_KEY;
use crate::error::{Error, Result};
use crate::observability::LogFormat;

/// Production bucket.
pub const DEFAULT_BUCKET: &str = "df-landing-zone";

/// Bucket used when `IS_DEV=true`.
pub const DEV_BUCKET: &str = "df-landing-zone-dev";

/// Default object path of the profile roster.
pub const DEFAULT_PROFILE_PATH: &str = "profiles/contributors.parquet";

/// Default attempts for a read-modify-write cycle that loses a version race.
pub const DEFAULT_CAS_MAX_ATTEMPTS: u32 = 5;

/// Vault connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct VaultConfig {
    /// Vault address, e.g. `https://vault.example.com`.
    pub addr: String,
    /// Vault token.
    pub token: String,
    /// KV path holding the credential bundle.
    pub path: String,
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("addr", &self.addr)
            .field("token", &"[REDACTED]")
            .field("path", &self.path)
            .finish()
    }
}

/// Roster configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Bucket holding the roster object.
    pub bucket: String,
    /// Object path of the roster inside the bucket.
    pub profile_path: String,
    /// Directory for temporary local copies.
    pub scratch_dir: PathBuf,
    /// Attempts for a read-modify-write cycle before giving up on a version race.
    pub cas_max_attempts: u32,
    /// Attempts for a single transport request.
    pub transport_max_attempts: u32,
    /// Log output format.
    pub log_format: LogFormat,
    /// Address for the Prometheus scrape endpoint; metrics are not exported
    /// when unset.
    pub metrics_addr: Option<SocketAddr>,
    /// Vault settings, when configured.
    pub vault: Option<VaultConfig>,
    /// Logical key of the service-account bundle.
    pub credential_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            profile_path: DEFAULT_PROFILE_PATH.to_string(),
            scratch_dir: std::env::temp_dir(),
            cas_max_attempts: DEFAULT_CAS_MAX_ATTEMPTS,
            transport_max_attempts: crate::bucket::RetryPolicy::DEFAULT_MAX_ATTEMPTS,
            log_format: LogFormat::default(),
            metrics_addr: None,
            vault: None,
            credential_key: DEFAULT_CREDENTIAL_KEY.to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed, or if
    /// Vault is only partially configured.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name).and_then(|v| {
                let trimmed = v.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
        };

        let mut config = Self::default();

        let is_dev = match get("IS_DEV") {
            Some(v) => parse_bool("IS_DEV", &v)?,
            None => false,
        };
        let default_bucket = if is_dev { DEV_BUCKET } else { DEFAULT_BUCKET };
        config.bucket = get("ROSTER_BUCKET").unwrap_or_else(|| default_bucket.to_string());
        if let Some(path) = get("ROSTER_PROFILE_PATH") {
            config.profile_path = path;
        }
        if let Some(dir) = get("ROSTER_SCRATCH_DIR") {
            config.scratch_dir = PathBuf::from(dir);
        }
        if let Some(v) = get("ROSTER_CAS_MAX_ATTEMPTS") {
            config.cas_max_attempts = parse_attempts("ROSTER_CAS_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("ROSTER_TRANSPORT_MAX_ATTEMPTS") {
            config.transport_max_attempts = parse_attempts("ROSTER_TRANSPORT_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("ROSTER_LOG_FORMAT") {
            config.log_format = v.parse()?;
        }
        if let Some(addr) = get("ROSTER_METRICS_ADDR") {
            config.metrics_addr = Some(addr.parse().map_err(|e| {
                Error::InvalidInput(format!("ROSTER_METRICS_ADDR must be host:port: {e}"))
            })?);
        }
        if let Some(key) = get("ROSTER_CREDENTIAL_KEY") {
            config.credential_key = key;
        }

        config.vault = match (get("VAULT_ADDR"), get("VAULT_TOKEN"), get("VAULT_PATH")) {
            (Some(addr), Some(token), Some(path)) => Some(VaultConfig { addr, token, path }),
            (None, None, None) => None,
            _ => {
                return Err(Error::InvalidInput(
                    "VAULT_ADDR, VAULT_TOKEN and VAULT_PATH must be set together".to_string(),
                ));
            }
        };

        Ok(config)
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(Error::InvalidInput(format!(
            "{name} must be a boolean (true/false/1/0)"
        ))),
    }
}

fn parse_attempts(name: &str, value: &str) -> Result<u32> {
    let n = value
        .parse::<u32>()
        .map_err(|e| Error::InvalidInput(format!("{name} must be a u32: {e}")))?;
    if n == 0 {
        return Err(Error::InvalidInput(format!("{name} must be greater than 0")));
    }
    Ok(n)
}
