//! Configuration management with validation and defaults
//!
//! One `CasinoConfig` tree covers the ledger limits, table rules, fairness,
//! storage and background reconciliation. `ConfigLoader` reads it from TOML
//! and applies `FAIRPLAY_*` environment overrides.

use crate::errors::{CasinoResult, ConfigurationError};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Complete casino configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CasinoConfig {
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub blackjack: BlackjackConfig,
    #[serde(default)]
    pub roulette: RouletteConfig,
    #[serde(default)]
    pub fairness: FairnessConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Wager limits enforced by the ledger (minor units)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletConfig {
    pub min_bet: u64,
    pub max_bet: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            min_bet: 1,
            max_bet: 1_000_000,
        }
    }
}

/// Blackjack table rules
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlackjackConfig {
    /// Decks per shoe
    pub deck_count: usize,
    /// When false the dealer stands on every 17, soft or hard
    pub dealer_hits_soft_17: bool,
}

impl Default for BlackjackConfig {
    fn default() -> Self {
        Self {
            deck_count: 6,
            dealer_hits_soft_17: false,
        }
    }
}

/// Where the roulette wheel gets its winning number from
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeSource {
    /// Drawn straight from the secure random source
    Entropy,
    /// Derived from the player's committed seed pair and nonce
    ProvablyFair,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouletteConfig {
    pub max_bets_per_spin: usize,
    pub outcome_source: OutcomeSource,
}

impl Default for RouletteConfig {
    fn default() -> Self {
        Self {
            max_bets_per_spin: 20,
            outcome_source: OutcomeSource::Entropy,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FairnessConfig {
    /// Attach a fairness receipt (and advance the nonce) on every settlement
    pub enabled: bool,
    /// Bytes of entropy in a freshly generated server seed
    pub server_seed_bytes: usize,
}

impl Default for FairnessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            server_seed_bytes: 32,
        }
    }
}

/// Storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_directory: String,
    pub write_buffer_size_mb: usize,
    /// Whether to clear database on startup (testing only!)
    pub clear_on_start: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    RocksDb,
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::RocksDb,
            data_directory: "./DB/casino_data".to_string(),
            write_buffer_size_mb: 64,
            clear_on_start: false,
        }
    }
}

/// Longest accepted orphan timeout (30 days)
pub const MAX_ORPHAN_TIMEOUT_SECS: u64 = 30 * 24 * 60 * 60;

/// Orphaned round recovery
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Active rounds older than this are refunded
    pub orphan_timeout_secs: u64,
    pub scan_interval_secs: u64,
    pub batch_size: usize,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            orphan_timeout_secs: 900,
            scan_interval_secs: 60,
            batch_size: 100,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_secs: 1800 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: LogLevel,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
        }
    }
}

impl CasinoConfig {
    /// In-memory storage and a short orphan timeout, for tests and demos
    pub fn testing() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                clear_on_start: true, // Testing mode: clear DB
                ..Default::default()
            },
            reconciliation: ReconciliationConfig {
                orphan_timeout_secs: 5,
                scan_interval_secs: 1,
                batch_size: 50,
            },
            monitoring: MonitoringConfig {
                log_level: LogLevel::Debug,
            },
            ..Default::default()
        }
    }

    /// Persistent RocksDB storage and table limits for a real deployment
    pub fn production() -> Self {
        Self {
            wallet: WalletConfig {
                min_bet: 100,
                max_bet: 500_000,
            },
            storage: StorageConfig {
                backend: StorageBackend::RocksDb,
                data_directory: "./DB/casino_data".to_string(),
                write_buffer_size_mb: 128,
                clear_on_start: false, // Production: preserve ledger data
            },
            roulette: RouletteConfig {
                outcome_source: OutcomeSource::ProvablyFair,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.wallet.min_bet == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "wallet.min_bet must be > 0".to_string(),
            ));
        }

        if self.wallet.max_bet < self.wallet.min_bet {
            return Err(ConfigValidationError::LogicalInconsistency(
                "wallet.max_bet must not be below wallet.min_bet".to_string(),
            ));
        }

        if self.blackjack.deck_count == 0 || self.blackjack.deck_count > 8 {
            return Err(ConfigValidationError::InvalidValue(
                "blackjack.deck_count must be between 1 and 8".to_string(),
            ));
        }

        if self.roulette.max_bets_per_spin == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "roulette.max_bets_per_spin must be > 0".to_string(),
            ));
        }

        if self.roulette.outcome_source == OutcomeSource::ProvablyFair && !self.fairness.enabled {
            return Err(ConfigValidationError::LogicalInconsistency(
                "provably fair roulette requires fairness.enabled".to_string(),
            ));
        }

        if self.fairness.server_seed_bytes < 16 {
            return Err(ConfigValidationError::InvalidValue(
                "fairness.server_seed_bytes must be at least 16".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::RocksDb && self.storage.data_directory.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "storage.data_directory".to_string(),
            ));
        }

        if self.reconciliation.orphan_timeout_secs == 0 || self.reconciliation.batch_size == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "reconciliation timeout and batch size must be > 0".to_string(),
            ));
        }

        if self.reconciliation.orphan_timeout_secs > MAX_ORPHAN_TIMEOUT_SECS {
            return Err(ConfigValidationError::InvalidValue(format!(
                "reconciliation.orphan_timeout_secs must be at most {}",
                MAX_ORPHAN_TIMEOUT_SECS
            )));
        }

        if self.session.ttl_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "session.ttl_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn orphan_timeout(&self) -> Duration {
        Duration::from_secs(self.reconciliation.orphan_timeout_secs)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.reconciliation.scan_interval_secs.max(1))
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session.ttl_secs)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    InvalidValue(String),
    LogicalInconsistency(String),
    MissingRequired(String),
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigValidationError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
            ConfigValidationError::LogicalInconsistency(msg) => write!(f, "Configuration logical inconsistency: {}", msg),
            ConfigValidationError::MissingRequired(msg) => write!(f, "Missing required configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

impl From<ConfigValidationError> for ConfigurationError {
    fn from(e: ConfigValidationError) -> Self {
        ConfigurationError::ValidationFailed(e.to_string())
    }
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> CasinoResult<CasinoConfig> {
        let mut config = match self.config_path {
            Some(ref path) => self.load_from_file(path)?,
            None => CasinoConfig::default(),
        };

        self.apply_env_overrides(&mut config)?;

        config
            .validate()
            .map_err(ConfigurationError::from)?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> CasinoResult<CasinoConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    fn apply_env_overrides(&self, config: &mut CasinoConfig) -> CasinoResult<()> {
        if let Ok(data_dir) = env::var("FAIRPLAY_DATA_DIR") {
            config.storage.data_directory = data_dir;
        }
        if let Ok(min_bet) = env::var("FAIRPLAY_MIN_BET") {
            config.wallet.min_bet = parse_env("FAIRPLAY_MIN_BET", min_bet)?;
        }
        if let Ok(max_bet) = env::var("FAIRPLAY_MAX_BET") {
            config.wallet.max_bet = parse_env("FAIRPLAY_MAX_BET", max_bet)?;
        }
        if let Ok(timeout) = env::var("FAIRPLAY_ORPHAN_TIMEOUT_SECS") {
            config.reconciliation.orphan_timeout_secs = parse_env("FAIRPLAY_ORPHAN_TIMEOUT_SECS", timeout)?;
        }
        if let Ok(soft17) = env::var("FAIRPLAY_DEALER_HITS_SOFT_17") {
            config.blackjack.dealer_hits_soft_17 = parse_env("FAIRPLAY_DEALER_HITS_SOFT_17", soft17)?;
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, config: &CasinoConfig, path: &str) -> CasinoResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, value: String) -> CasinoResult<T> {
    value.parse().map_err(|_| {
        ConfigurationError::InvalidValue {
            field: field.to_string(),
            value,
            reason: "Could not parse value".to_string(),
        }
        .into()
    })
}
