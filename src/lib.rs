//! Fairplay - casino game core
//!
//! Blackjack and European roulette engines settling against an atomic
//! wallet ledger, with provably-fair seed commitments and recovery of
//! abandoned rounds.

pub mod config;
pub mod errors;
pub mod fairness;
pub mod game_store;
pub mod games;
pub mod reconciliation;
pub mod rng;
pub mod services;
pub mod session;
pub mod storage;
pub mod wallet;

pub use config::{CasinoConfig, ConfigLoader};
pub use errors::{CasinoError, CasinoResult};
pub use services::Casino;
