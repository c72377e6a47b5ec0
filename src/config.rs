//! Configuration types for artifact-transfer

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::build_info::BuildContext;
use crate::error::{Error, Result};

/// Environment variable overriding [`TransferConfig::min_checksum_deploy_size`], in KB
pub const MIN_CHECKSUM_DEPLOY_SIZE_ENV: &str = "ARTIFACT_TRANSFER_MIN_CHECKSUM_DEPLOY_SIZE_KB";

/// Remote repository service connection
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the service (e.g., "https://repo.example.com/artifactory/")
    #[serde(default)]
    pub url: String,

    /// User for basic authentication
    #[serde(default)]
    pub user: Option<String>,

    /// Password or API key for basic authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Bearer token, takes precedence over user/password
    #[serde(default)]
    pub access_token: Option<String>,

    /// Per-request timeout in seconds (default: 300)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            user: None,
            password: None,
            access_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Transfer behaviour shared by upload and download commands
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Number of concurrent transfer workers (default: 3)
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Count what would be transferred without touching the remote
    #[serde(default)]
    pub dry_run: bool,

    /// Files at least this many bytes are first offered as checksum-only deploys
    /// (default: 10240 KB)
    #[serde(default = "default_min_checksum_deploy_size")]
    pub min_checksum_deploy_size: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            dry_run: false,
            min_checksum_deploy_size: default_min_checksum_deploy_size(),
        }
    }
}

/// Build provenance settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Build name; must be given together with `build_number`
    #[serde(default)]
    pub build_name: Option<String>,

    /// Build number; must be given together with `build_name`
    #[serde(default)]
    pub build_number: Option<String>,

    /// Directory holding local build-info records
    /// (default: "<system temp>/artifact-transfer/builds")
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            build_name: None,
            build_number: None,
            build_dir: default_build_dir(),
        }
    }
}

impl BuildConfig {
    /// Build correlation for this invocation, if both name and number are set
    pub fn context(&self) -> Result<Option<BuildContext>> {
        BuildContext::from_parts(self.build_name.as_deref(), self.build_number.as_deref())
    }
}

/// Main configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote service connection
    #[serde(default)]
    pub server: ServerConfig,

    /// Transfer behaviour
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Build provenance
    #[serde(default)]
    pub build: BuildConfig,
}

impl Config {
    /// Load a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read config file {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&content).map_err(|e| Error::Config {
            message: format!("failed to parse config file {}: {}", path.display(), e),
            key: None,
        })?;
        tracing::debug!(config_path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Apply overrides taken from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var(MIN_CHECKSUM_DEPLOY_SIZE_ENV)
            && !value.trim().is_empty()
        {
            let kb: u64 = value.trim().parse().map_err(|e| {
                Error::config(
                    MIN_CHECKSUM_DEPLOY_SIZE_ENV,
                    format!("expected a size in KB, got '{value}': {e}"),
                )
            })?;
            self.transfer.min_checksum_deploy_size = kb * 1000;
        }
        Ok(())
    }

    /// Check settings that would otherwise fail deep inside a command
    pub fn validate(&self) -> Result<()> {
        if self.server.url.trim().is_empty() {
            return Err(Error::config("server.url", "server URL is required"));
        }
        url::Url::parse(&self.server.url)
            .map_err(|e| Error::config("server.url", format!("invalid server URL: {e}")))?;
        if self.transfer.threads == 0 {
            return Err(Error::config(
                "transfer.threads",
                "thread count must be at least 1",
            ));
        }
        self.build.context()?;
        Ok(())
    }
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_threads() -> usize {
    3
}

fn default_min_checksum_deploy_size() -> u64 {
    10_240 * 1000
}

fn default_build_dir() -> PathBuf {
    std::env::temp_dir().join("artifact-transfer").join("builds")
}
