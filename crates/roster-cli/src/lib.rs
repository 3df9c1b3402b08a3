//! # roster-cli
//!
//! Command-line interface for the contributor profile roster.
//!
//! ## Commands
//!
//! - `roster serve` - JSON-lines tool transport over stdin/stdout
//! - `roster list-usernames` - List every username
//! - `roster add-profile` - Add a profile from its platform URLs
//! - `roster reclassify` - Set the member type of several profiles
//! - `roster update-profile` - Set or clear fields of one profile
//! - `roster clean-metadata` - Clear platform crawl state
//!
//! ## Configuration
//!
//! Settings come from the environment (see [`roster_core::Config`]); the
//! global flags below override them:
//!
//! - `--bucket` / `ROSTER_BUCKET`
//! - `--profile-path` / `ROSTER_PROFILE_PATH`
//! - `--scratch-dir` / `ROSTER_SCRATCH_DIR`
//! - `--log-format` / `ROSTER_LOG_FORMAT`
//! - `--metrics-addr` / `ROSTER_METRICS_ADDR` - Prometheus scrape endpoint
//! - `--in-memory` - use a process-local store and skip credentials

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]

pub mod commands;
pub mod metrics;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use roster_core::{Config, LogFormat};

/// Roster CLI - contributor profile tools.
#[derive(Debug, Parser)]
#[command(name = "roster")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Bucket holding the roster object.
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// Object path of the roster inside the bucket.
    #[arg(long, global = true)]
    pub profile_path: Option<String>,

    /// Directory for temporary local copies.
    #[arg(long, global = true)]
    pub scratch_dir: Option<PathBuf>,

    /// Use a process-local in-memory store instead of GCS.
    #[arg(long, global = true)]
    pub in_memory: bool,

    /// Log output format.
    #[arg(long, global = true)]
    pub log_format: Option<LogFormatArg>,

    /// Serve Prometheus metrics on this address.
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the effective configuration: environment first, then flags.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment variable is malformed.
    pub fn config(&self) -> Result<Config> {
        let config = Config::from_env().context("invalid roster configuration")?;
        Ok(self.apply(config))
    }

    /// Applies flag overrides to a loaded configuration.
    #[must_use]
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(bucket) = &self.bucket {
            config.bucket.clone_from(bucket);
        }
        if let Some(path) = &self.profile_path {
            config.profile_path.clone_from(path);
        }
        if let Some(dir) = &self.scratch_dir {
            config.scratch_dir.clone_from(dir);
        }
        if let Some(format) = self.log_format {
            config.log_format = format.into();
        }
        if let Some(addr) = self.metrics_addr {
            config.metrics_addr = Some(addr);
        }
        config
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Serve tool requests as JSON lines on stdin/stdout.
    Serve,
    /// List every username.
    ListUsernames,
    /// Add a profile.
    AddProfile(commands::tools::AddProfileArgs),
    /// Set the member type of several profiles.
    Reclassify(commands::tools::ReclassifyArgs),
    /// Set or clear fields of one profile.
    UpdateProfile(commands::tools::UpdateProfileArgs),
    /// Clear platform crawl state of several profiles.
    CleanMetadata(commands::tools::CleanMetadataArgs),
}

/// Log format flag.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable logs.
    Pretty,
    /// JSON structured logs.
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Json => Self::Json,
        }
    }
}
