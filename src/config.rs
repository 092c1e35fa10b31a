use crate::{
    client::{retry::RetryPolicy, ClientConfig},
    constants::*,
    extension::pool::DecodePool,
};
use serde_derive::Deserialize;
use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("blocks_batch_size must be greater than 0")]
    ZeroBatchSize,
    #[error("retry_attempts must be at least 1")]
    ZeroRetryAttempts,
    #[error("start_height {start} is past end_height {end}")]
    StartPastEnd { start: u64, end: u64 },
}

/// Last height to index: the chain head at startup, or a fixed height
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawHeight")]
pub enum HeightSetting {
    #[default]
    Auto,
    Height(u64),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawHeight {
    Number(u64),
    Text(String),
}

impl TryFrom<RawHeight> for HeightSetting {
    type Error = String;

    fn try_from(raw: RawHeight) -> Result<Self, Self::Error> {
        match raw {
            RawHeight::Number(height) => Ok(Self::Height(height)),
            RawHeight::Text(text) => text.parse(),
        }
    }
}

impl FromStr for HeightSetting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "auto" => Ok(Self::Auto),
            height => height
                .parse()
                .map(Self::Height)
                .map_err(|_| format!("expected `auto` or a height, got `{height}`")),
        }
    }
}

impl Display for HeightSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Height(height) => write!(f, "{height}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    pub rpc: String,
    pub api: String,
    pub chain_id: String,
    #[serde(alias = "bech_32_prefix")]
    pub address_prefix: String,

    /// `auto` or absent: resume from the checkpoint, else the lowest height
    #[serde(default, deserialize_with = "optional_height")]
    pub start_height: Option<u64>,
    #[serde(default)]
    pub end_height: HeightSetting,
    #[serde(default = "default_batch_size")]
    pub blocks_batch_size: u64,
    /// Seconds
    #[serde(default, alias = "sleep_between_blocks_batch")]
    pub sleep_between_batches: u64,

    #[serde(default)]
    pub multiprocessing: bool,
    #[serde(default)]
    pub decode_workers: Option<usize>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    #[serde(default = "default_validators_page_size")]
    pub validators_page_size: u32,
    #[serde(default = "default_validators_path")]
    pub validators_path: String,

    #[serde(default = "default_database_dir")]
    pub database_dir: PathBuf,
}

fn optional_height<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u64>, D::Error> {
    Ok(
        match <Option<HeightSetting> as serde::Deserialize>::deserialize(deserializer)? {
            Some(HeightSetting::Height(height)) => Some(height),
            Some(HeightSetting::Auto) | None => None,
        },
    )
}

fn default_batch_size() -> u64 {
    DEFAULT_BLOCKS_BATCH_SIZE
}

fn default_request_timeout() -> u64 {
    REQUEST_TIMEOUT_SECS
}

fn default_retry_attempts() -> u32 {
    REQUEST_RETRY_ATTEMPTS
}

fn default_retry_delay() -> u64 {
    REQUEST_RETRY_DELAY_SECS
}

fn default_validators_page_size() -> u32 {
    VALIDATOR_ROSTER_PAGE_SIZE
}

fn default_validators_path() -> String {
    DEFAULT_VALIDATORS_PATH.to_string()
}

fn default_database_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_DIR)
}

impl IndexerConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain_id.trim().is_empty() {
            return Err(ConfigError::Empty("chain_id"));
        }
        if self.address_prefix.trim().is_empty() {
            return Err(ConfigError::Empty("address_prefix"));
        }
        if self.blocks_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::ZeroRetryAttempts);
        }
        if let (Some(start), HeightSetting::Height(end)) = (self.start_height, self.end_height) {
            if start > end {
                return Err(ConfigError::StartPastEnd { start, end });
            }
        }
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            rpc: self.rpc.trim_end_matches('/').to_string(),
            api: self.api.trim_end_matches('/').to_string(),
            validators_path: self.validators_path.clone(),
            request_timeout: Duration::from_secs(self.request_timeout),
            retry: RetryPolicy {
                attempts: self.retry_attempts,
                delay: Duration::from_secs(self.retry_delay),
            },
        }
    }

    /// Decode pool size; 0 decodes inline
    pub fn decode_workers(&self) -> usize {
        match (self.multiprocessing, self.decode_workers) {
            (false, _) => 0,
            (true, Some(workers)) => workers,
            (true, None) => DecodePool::default_workers(),
        }
    }

    pub fn sleep_between_batches(&self) -> Duration {
        Duration::from_secs(self.sleep_between_batches)
    }
}
