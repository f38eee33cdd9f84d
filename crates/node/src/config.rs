//! Service configuration file.

use lottery_payout::PayoutConfig;
use lottery_types::{Amount, LotteryConfig, ParticipantId, PublicKey, WinnerPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors loading the service configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be rendered as TOML.
    #[error("Failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    /// A value is out of range.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level node configuration, read from TOML.
///
/// ```toml
/// owner = "operator"
///
/// [lottery]
/// ticket_price = 10
/// max_entrants = 100
/// duration_secs = 3600
/// winner_policy = "permissionless"
/// request_timeout_secs = 300
///
/// [payout]
/// transfer_timeout_secs = 30
///
/// [oracle]
/// public_key = "<64 hex chars>"
///
/// [storage]
/// path = "data/lottery.json"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Lottery owner, allowed to change the configuration.
    pub owner: ParticipantId,

    /// Round parameters.
    #[serde(default)]
    pub lottery: LotterySection,

    /// Payout execution.
    #[serde(default)]
    pub payout: PayoutSection,

    /// Randomness oracle.
    #[serde(default)]
    pub oracle: OracleSection,

    /// Snapshot storage.
    #[serde(default)]
    pub storage: StorageSection,

    /// Local simulation driven by the `run` command.
    #[serde(default)]
    pub simulation: SimulationSection,
}

/// `[lottery]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LotterySection {
    pub ticket_price: u64,
    pub max_entrants: u32,
    pub duration_secs: u64,
    pub winner_policy: WinnerPolicy,
    /// Zero disables the request timeout.
    pub request_timeout_secs: u64,
}

impl Default for LotterySection {
    fn default() -> Self {
        let defaults = LotteryConfig::default();
        Self {
            ticket_price: defaults.ticket_price.0,
            max_entrants: defaults.max_entrants,
            duration_secs: defaults.duration.as_secs(),
            winner_policy: defaults.winner_policy,
            request_timeout_secs: defaults.request_timeout.map_or(0, |t| t.as_secs()),
        }
    }
}

/// `[payout]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PayoutSection {
    pub transfer_timeout_secs: u64,
}

impl Default for PayoutSection {
    fn default() -> Self {
        Self {
            transfer_timeout_secs: PayoutConfig::default().transfer_timeout.as_secs(),
        }
    }
}

/// `[oracle]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OracleSection {
    /// Hex Ed25519 key fulfillments must be signed with. Absent trusts the
    /// oracle.
    pub public_key: Option<String>,
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    /// Snapshot file. Absent keeps state in memory only.
    pub path: Option<PathBuf>,
}

/// `[simulation]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationSection {
    /// Seed for the local oracle's value stream and key.
    pub seed: u64,
    /// Operator funds in the treasury before any ticket is sold. Ticket
    /// payments are collected on top of it.
    pub treasury_balance: u64,
    /// Players cycled through when filling rounds.
    pub players: Vec<String>,
    /// Delay before the local oracle delivers a value.
    pub oracle_delay_ms: u64,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            seed: 12345,
            treasury_balance: 1_000_000,
            players: ["alice", "bob", "carol", "dave"]
                .into_iter()
                .map(String::from)
                .collect(),
            oracle_delay_ms: 50,
        }
    }
}

impl ServiceConfig {
    /// Default configuration for `owner`.
    pub fn new(owner: ParticipantId) -> Self {
        Self {
            owner,
            lottery: LotterySection::default(),
            payout: PayoutSection::default(),
            oracle: OracleSection::default(),
            storage: StorageSection::default(),
            simulation: SimulationSection::default(),
        }
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.lottery_config()?;
        config.oracle_key()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validated round parameters.
    pub fn lottery_config(&self) -> Result<LotteryConfig, ConfigError> {
        let lottery = &self.lottery;
        let config = LotteryConfig::new(
            Amount(lottery.ticket_price),
            lottery.max_entrants,
            Duration::from_secs(lottery.duration_secs),
        )
        .with_winner_policy(lottery.winner_policy)
        .with_request_timeout(
            Some(lottery.request_timeout_secs)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        );
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Payout parameters.
    pub fn payout_config(&self) -> PayoutConfig {
        PayoutConfig::with_transfer_timeout(Duration::from_secs(self.payout.transfer_timeout_secs))
    }

    /// Configured oracle key, if any.
    pub fn oracle_key(&self) -> Result<Option<PublicKey>, ConfigError> {
        self.oracle
            .public_key
            .as_deref()
            .map(|hex| {
                PublicKey::from_hex(hex)
                    .map_err(|e| ConfigError::Invalid(format!("oracle.public_key: {e}")))
            })
            .transpose()
    }
}
