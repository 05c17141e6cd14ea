//! Agent configuration

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    classify::ErrorRegistry,
    ledger::ObjectId,
    proof::Difficulty,
    schedule::PollPolicy,
};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for [`MinerConfig`]
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values are inconsistent
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Mining agent configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// JSON-RPC endpoint of the ledger
    pub rpc_url: String,
    /// Package holding the mine and miner modules
    pub package_id: ObjectId,
    /// Reward buses to mine against
    pub buses: Vec<ObjectId>,
    /// Epoch length in milliseconds
    pub epoch_length_ms: u64,
    /// Buses resetting within this many milliseconds are skipped
    pub reset_buffer_ms: u64,
    /// Leading zero bytes a proof hash needs
    pub difficulty: Difficulty,
    /// Coin that mined rewards are merged into
    pub coin_object: Option<ObjectId>,
    /// Gas budget of a mine call that merges into `coin_object`
    pub merge_gas_budget: u64,
    /// Gas budget of a mine call that creates a new coin
    pub create_gas_budget: u64,
    /// Reads of the miner hash after a submission
    pub hash_poll_attempts: u32,
    /// Milliseconds between miner hash reads
    pub hash_poll_interval_ms: u64,
    /// Milliseconds between bus reads while waiting for a reset
    pub epoch_poll_interval_ms: u64,
    /// Bus reads after the expected reset before giving up
    pub epoch_poll_limit: u32,
    /// Pause before restarting a round after a retriable failure
    pub retry_backoff_ms: u64,
    /// Contract error names and abort codes
    pub error_codes: ErrorRegistry,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:9000".to_owned(),
            package_id: ObjectId::ZERO,
            buses: Vec::new(),
            epoch_length_ms: 60_000,
            reset_buffer_ms: 8_000,
            difficulty: Difficulty::ZERO,
            coin_object: None,
            merge_gas_budget: 1_000_000,
            create_gas_budget: 2_500_000,
            hash_poll_attempts: 5,
            hash_poll_interval_ms: 2_000,
            epoch_poll_interval_ms: 1_500,
            epoch_poll_limit: 400,
            retry_backoff_ms: 2_000,
            error_codes: ErrorRegistry::new(),
        }
    }
}

impl MinerConfig {
    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buses.is_empty() {
            return Err(ConfigError::Invalid("no buses configured".into()));
        }
        if self.epoch_length_ms == 0 {
            return Err(ConfigError::Invalid("epoch length must be positive".into()));
        }
        if self.reset_buffer_ms >= self.epoch_length_ms {
            return Err(ConfigError::Invalid(format!(
                "reset buffer {}ms must be shorter than the epoch {}ms",
                self.reset_buffer_ms, self.epoch_length_ms
            )));
        }
        if self.hash_poll_attempts == 0 {
            return Err(ConfigError::Invalid("hash poll attempts must be positive".into()));
        }
        if self.epoch_poll_limit == 0 {
            return Err(ConfigError::Invalid("epoch poll limit must be positive".into()));
        }
        Ok(())
    }

    /// Epoch length
    pub const fn epoch_length(&self) -> Duration {
        Duration::from_millis(self.epoch_length_ms)
    }

    /// Reset safety buffer
    pub const fn reset_buffer(&self) -> Duration {
        Duration::from_millis(self.reset_buffer_ms)
    }

    /// Polling of the miner hash after a submission
    pub const fn hash_poll(&self) -> PollPolicy {
        PollPolicy::new(self.hash_poll_attempts, Duration::from_millis(self.hash_poll_interval_ms))
    }

    /// Polling of a bus while waiting for a reset
    pub const fn epoch_poll(&self) -> PollPolicy {
        PollPolicy::new(self.epoch_poll_limit, Duration::from_millis(self.epoch_poll_interval_ms))
    }

    /// Pause before a retried round
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Gas budget of the mine call
    pub const fn mine_gas_budget(&self) -> u64 {
        if self.coin_object.is_some() { self.merge_gas_budget } else { self.create_gas_budget }
    }
}
