use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use bytesize::ByteSize;
use domain::error::{Error, Result};
use serde::Deserialize;

/// Property keys recognized by the scheduler adaptors.
pub const PROP_POLL_INTERVAL: &str = "poll.interval.ms";
pub const PROP_MAX_CONCURRENT: &str = "local.max.concurrent";
pub const PROP_HISTORY_SIZE: &str = "local.history.size";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GridgateConfig {
    #[serde(default = "Default::default")]
    pub scheduler: SchedulerConfig,

    #[serde(default = "Default::default")]
    pub transfer: TransferConfig,
}

impl GridgateConfig {
    /// Loads configuration from an optional file plus `GRIDGATE__*`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder
            .add_source(config::Environment::with_prefix("GRIDGATE").separator("__"))
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| Error::Other(format!("failed to load configuration: {e}")))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// How often pollers re-check backend state, in milliseconds.
    #[serde(default = "SchedulerConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Concurrency cap of the local `multi` queue. Host parallelism when
    /// unset.
    #[serde(default = "Default::default")]
    pub max_concurrent: Option<usize>,

    /// How many finished jobs the local scheduler keeps queryable.
    #[serde(default = "SchedulerConfig::default_history_size")]
    pub history_size: usize,
}

impl SchedulerConfig {
    pub const SUPPORTED_PROPERTIES: &'static [&'static str] =
        &[PROP_POLL_INTERVAL, PROP_MAX_CONCURRENT, PROP_HISTORY_SIZE];

    pub fn default_poll_interval_ms() -> u64 {
        1000
    }

    pub fn default_history_size() -> usize {
        1000
    }

    /// Builds a config from a flat property map, rejecting unknown keys and
    /// unparsable values.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();

        for (key, value) in properties {
            match key.as_str() {
                PROP_POLL_INTERVAL => config.poll_interval_ms = parse(key, value)?,
                PROP_MAX_CONCURRENT => config.max_concurrent = Some(parse(key, value)?),
                PROP_HISTORY_SIZE => config.history_size = parse(key, value)?,
                _ => return Err(Error::UnknownProperty(key.clone())),
            }
        }

        if config.poll_interval_ms == 0 {
            return Err(Error::InvalidProperty {
                key: PROP_POLL_INTERVAL.to_owned(),
                reason: "poll interval must be positive".to_owned(),
            });
        }

        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Cap of the `multi` queue, defaulting to the host's parallelism.
    pub fn effective_max_concurrent(&self) -> usize {
        self.max_concurrent.unwrap_or_else(host_parallelism)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: Self::default_poll_interval_ms(),
            max_concurrent: None,
            history_size: Self::default_history_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "TransferConfig::default_block_size")]
    pub block_size: ByteSize,
}

impl TransferConfig {
    pub fn default_block_size() -> ByteSize {
        ByteSize::kib(64)
    }

    pub fn block_size_bytes(&self) -> usize {
        self.block_size.as_u64().max(1) as usize
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            block_size: Self::default_block_size(),
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| Error::InvalidProperty {
        key: key.to_owned(),
        reason: format!("{e}"),
    })
}

fn host_parallelism() -> usize {
    std::thread::available_parallelism().map(usize::from).unwrap_or(1)
}
