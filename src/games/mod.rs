pub mod blackjack;
pub mod cards;
pub mod hand;
pub mod provably_fair;
pub mod roulette;
pub mod types;

pub use blackjack::{BlackjackEngine, BlackjackRound, RoundState, RoundStatus};
pub use cards::{CardDeck, Shoe, ShoeSource};
pub use provably_fair::ProvablyFairVerifier;
pub use roulette::{BetKind, RouletteBet, RouletteEngine, SpinResult};
pub use types::*;

use crate::errors::{CasinoError, EntropyError, StorageError};
use crate::fairness::FairnessError;
use crate::wallet::LedgerError;
use thiserror::Error;
use uuid::Uuid;

/// Game-state violations, reported as one class apart from funds errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidOperation {
    #[error("Round not found: {0}")]
    RoundNotFound(Uuid),

    #[error("Round {round_id} does not belong to user {user_id}")]
    NotOwned { round_id: Uuid, user_id: u64 },

    #[error("Round {0} is no longer active")]
    RoundNotActive(Uuid),

    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Illegal action: {0}")]
    IllegalAction(String),
}

#[derive(Debug, Error)]
pub enum GameError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Invalid operation: {0}")]
    InvalidOperation(#[from] InvalidOperation),

    #[error("Invalid bet: {0}")]
    InvalidBet(String),

    #[error("Shuffle source unavailable: {0}")]
    ShuffleSourceUnavailable(#[from] EntropyError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Fairness(#[from] FairnessError),
}

impl From<CasinoError> for GameError {
    fn from(err: CasinoError) -> Self {
        match err {
            CasinoError::Storage(e) => GameError::Storage(e),
            CasinoError::Entropy(e) => GameError::ShuffleSourceUnavailable(e),
            CasinoError::Ledger(e) => GameError::Ledger(e),
            CasinoError::Game(e) => e,
            CasinoError::Fairness(e) => GameError::Fairness(e),
            CasinoError::Configuration(e) => GameError::Storage(StorageError::CorruptedData(e.to_string())),
        }
    }
}

pub type GameResult<T> = Result<T, GameError>;
