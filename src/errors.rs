//! Error types for the fairplay casino core
//!
//! Infrastructure errors (configuration, storage, entropy) live here with a
//! single root type. Domain errors are defined next to the code that raises
//! them (`wallet::LedgerError`, `games::GameError`, `fairness::FairnessError`)
//! and fold into the root through `From`.

use std::fmt;

use crate::fairness::FairnessError;
use crate::games::GameError;
use crate::wallet::LedgerError;

/// Root error type for all fairplay operations
#[derive(Debug)]
pub enum CasinoError {
    /// Configuration related errors
    Configuration(ConfigurationError),

    /// Persistence errors
    Storage(StorageError),

    /// Random source failures
    Entropy(EntropyError),

    /// Balance and wager bookkeeping errors
    Ledger(LedgerError),

    /// Game rule and round state errors
    Game(GameError),

    /// Seed commitment errors
    Fairness(FairnessError),
}

/// Configuration and validation errors
#[derive(Debug, Clone)]
pub enum ConfigurationError {
    ValidationFailed(String),
    MissingRequired(String),
    InvalidValue { field: String, value: String, reason: String },
    LoadFailed(String),
    SaveFailed(String),
}

/// Storage system errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    DatabaseOpenFailed(String),
    ReadFailed(String),
    WriteFailed(String),
    CorruptedData(String),
    /// A unit of work was rejected because a guarded key changed underneath it
    PreconditionFailed { key: String },
}

/// Entropy source errors. Always fatal for the operation that hit them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntropyError {
    ShuffleSourceUnavailable(String),
    InvalidRange { min: u64, max: u64 },
}

impl fmt::Display for CasinoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CasinoError::Configuration(e) => write!(f, "Configuration error: {}", e),
            CasinoError::Storage(e) => write!(f, "Storage error: {}", e),
            CasinoError::Entropy(e) => write!(f, "Entropy error: {}", e),
            CasinoError::Ledger(e) => write!(f, "Ledger error: {}", e),
            CasinoError::Game(e) => write!(f, "Game error: {}", e),
            CasinoError::Fairness(e) => write!(f, "Fairness error: {}", e),
        }
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::ValidationFailed(msg) => write!(f, "Validation failed: {}", msg),
            ConfigurationError::MissingRequired(field) => write!(f, "Missing required field: {}", field),
            ConfigurationError::InvalidValue { field, value, reason } => {
                write!(f, "Invalid value for {}: '{}' ({})", field, value, reason)
            }
            ConfigurationError::LoadFailed(msg) => write!(f, "Failed to load configuration: {}", msg),
            ConfigurationError::SaveFailed(msg) => write!(f, "Failed to save configuration: {}", msg),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::DatabaseOpenFailed(msg) => write!(f, "Database open failed: {}", msg),
            StorageError::ReadFailed(msg) => write!(f, "Read failed: {}", msg),
            StorageError::WriteFailed(msg) => write!(f, "Write failed: {}", msg),
            StorageError::CorruptedData(msg) => write!(f, "Corrupted data: {}", msg),
            StorageError::PreconditionFailed { key } => {
                write!(f, "Precondition failed on key {}", key)
            }
        }
    }
}

impl fmt::Display for EntropyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntropyError::ShuffleSourceUnavailable(msg) => {
                write!(f, "Secure random source unavailable: {}", msg)
            }
            EntropyError::InvalidRange { min, max } => {
                write!(f, "Invalid random range [{}, {})", min, max)
            }
        }
    }
}

impl std::error::Error for CasinoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CasinoError::Configuration(e) => Some(e),
            CasinoError::Storage(e) => Some(e),
            CasinoError::Entropy(e) => Some(e),
            CasinoError::Ledger(e) => Some(e),
            CasinoError::Game(e) => Some(e),
            CasinoError::Fairness(e) => Some(e),
        }
    }
}

impl std::error::Error for ConfigurationError {}
impl std::error::Error for StorageError {}
impl std::error::Error for EntropyError {}

impl From<ConfigurationError> for CasinoError {
    fn from(e: ConfigurationError) -> Self {
        CasinoError::Configuration(e)
    }
}

impl From<StorageError> for CasinoError {
    fn from(e: StorageError) -> Self {
        CasinoError::Storage(e)
    }
}

impl From<EntropyError> for CasinoError {
    fn from(e: EntropyError) -> Self {
        CasinoError::Entropy(e)
    }
}

impl From<LedgerError> for CasinoError {
    fn from(e: LedgerError) -> Self {
        CasinoError::Ledger(e)
    }
}

impl From<GameError> for CasinoError {
    fn from(e: GameError) -> Self {
        CasinoError::Game(e)
    }
}

impl From<FairnessError> for CasinoError {
    fn from(e: FairnessError) -> Self {
        CasinoError::Fairness(e)
    }
}

// External error conversions
impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::WriteFailed(e.to_string())
    }
}

impl From<rocksdb::Error> for CasinoError {
    fn from(e: rocksdb::Error) -> Self {
        CasinoError::Storage(e.into())
    }
}

impl From<std::io::Error> for CasinoError {
    fn from(e: std::io::Error) -> Self {
        CasinoError::Storage(StorageError::ReadFailed(e.to_string()))
    }
}

impl From<serde_json::Error> for CasinoError {
    fn from(e: serde_json::Error) -> Self {
        CasinoError::Storage(StorageError::CorruptedData(e.to_string()))
    }
}

// Convenience type alias for Results
pub type CasinoResult<T> = Result<T, CasinoError>;
