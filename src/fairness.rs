//! Per-user provably fair seed lifecycle.
//!
//! Each user has one active server seed. Only its hash leaves this module
//! while it is active. Every settled round or spin consumes the current
//! nonce inside the same ledger commit as the payout, so a nonce is never
//! used twice under one seed. Rotating reveals the old seed and commits a
//! fresh one.

use crate::config::FairnessConfig;
use crate::errors::{CasinoError, EntropyError, StorageError};
use crate::games::provably_fair::ProvablyFairVerifier;
use crate::rng::RandomSource;
use crate::storage::{decode_record, encode_record, load_record, KeyValueStore, UnitOfWork};
use crate::wallet::LedgerTxn;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const SEED_PREFIX: &str = "fairness:seed:";
const REVEALED_PREFIX: &str = "fairness:revealed:";
const MAX_CLIENT_SEED_LEN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum FairnessError {
    #[error("Provably fair seeds are disabled")]
    Disabled,

    #[error("Invalid client seed: {0}")]
    InvalidClientSeed(String),

    #[error("Seed for user {0} changed concurrently")]
    ConcurrentModification(u64),

    #[error("Entropy error: {0}")]
    Entropy(#[from] EntropyError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<CasinoError> for FairnessError {
    fn from(err: CasinoError) -> Self {
        match err {
            CasinoError::Storage(e) => FairnessError::Storage(e),
            CasinoError::Entropy(e) => FairnessError::Entropy(e),
            other => FairnessError::Storage(StorageError::WriteFailed(other.to_string())),
        }
    }
}

/// Active seed record. The secret never appears in `Debug` output.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvablyFairSeed {
    pub user_id: u64,
    pub server_seed: String,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
    /// How many seeds this user has had before this one
    pub generation: u64,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for ProvablyFairSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvablyFairSeed")
            .field("user_id", &self.user_id)
            .field("server_seed", &"<redacted>")
            .field("server_seed_hash", &self.server_seed_hash)
            .field("client_seed", &self.client_seed)
            .field("nonce", &self.nonce)
            .field("generation", &self.generation)
            .finish()
    }
}

impl ProvablyFairSeed {
    fn commitment(&self) -> SeedCommitment {
        SeedCommitment {
            user_id: self.user_id,
            server_seed_hash: self.server_seed_hash.clone(),
            client_seed: self.client_seed.clone(),
            nonce: self.nonce,
        }
    }
}

/// Public view of the active seed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeedCommitment {
    pub user_id: u64,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
}

/// A retired seed, safe to publish
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevealedSeed {
    pub server_seed: String,
    pub server_seed_hash: String,
    pub client_seed: String,
    /// Nonces `0..nonces_used` were consumed under this seed
    pub nonces_used: u64,
    pub revealed_at: DateTime<Utc>,
}

/// Attached to every settled round or spin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FairnessReceipt {
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
    pub result_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRotation {
    pub revealed: RevealedSeed,
    pub next: SeedCommitment,
}

fn seed_key(user_id: u64) -> Vec<u8> {
    format!("{}{}", SEED_PREFIX, user_id).into_bytes()
}

fn revealed_prefix(user_id: u64) -> Vec<u8> {
    format!("{}{:020}:", REVEALED_PREFIX, user_id).into_bytes()
}

fn revealed_key(user_id: u64, generation: u64) -> Vec<u8> {
    let mut key = revealed_prefix(user_id);
    key.extend_from_slice(format!("{:020}", u64::MAX - generation).as_bytes());
    key
}

pub struct FairnessService {
    store: Arc<dyn KeyValueStore>,
    rng: Arc<dyn RandomSource>,
    config: FairnessConfig,
}

impl FairnessService {
    pub fn new(store: Arc<dyn KeyValueStore>, rng: Arc<dyn RandomSource>, config: FairnessConfig) -> Self {
        Self { store, rng, config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn new_seed(&self, user_id: u64, client_seed: Option<String>, generation: u64) -> Result<ProvablyFairSeed, FairnessError> {
        let server = ProvablyFairVerifier::generate_server_seed(self.rng.as_ref(), self.config.server_seed_bytes)?;
        let client_seed = match client_seed {
            Some(seed) => seed,
            None => ProvablyFairVerifier::generate_client_seed(self.rng.as_ref())?,
        };

        Ok(ProvablyFairSeed {
            user_id,
            server_seed: server.secret,
            server_seed_hash: server.hash,
            client_seed,
            nonce: 0,
            generation,
            created_at: Utc::now(),
        })
    }

    /// Active seed and its stored bytes, creating the seed on first use
    fn active(&self, user_id: u64) -> Result<(ProvablyFairSeed, Vec<u8>), FairnessError> {
        if !self.config.enabled {
            return Err(FairnessError::Disabled);
        }
        if let Some(found) = load_record::<ProvablyFairSeed>(self.store.as_ref(), &seed_key(user_id))? {
            return Ok(found);
        }

        let seed = self.new_seed(user_id, None, 0)?;
        let bytes = encode_record(&seed)?;
        let mut unit = UnitOfWork::new();
        unit.expect_snapshot(seed_key(user_id), None);
        unit.put(seed_key(user_id), bytes.clone());

        match self.store.commit(unit) {
            Ok(()) => {
                tracing::debug!(user_id, hash = %seed.server_seed_hash, "Server seed committed");
                Ok((seed, bytes))
            }
            // Someone else created it first; use theirs
            Err(CasinoError::Storage(StorageError::PreconditionFailed { .. })) => {
                load_record::<ProvablyFairSeed>(self.store.as_ref(), &seed_key(user_id))?
                    .ok_or(FairnessError::ConcurrentModification(user_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Hash of the active server seed, plus client seed and next nonce
    pub fn commitment(&self, user_id: u64) -> Result<SeedCommitment, FairnessError> {
        Ok(self.active(user_id)?.0.commitment())
    }

    /// Reveal the active seed and commit a new one
    pub fn rotate(&self, user_id: u64) -> Result<SeedRotation, FairnessError> {
        let client_seed = self.active(user_id)?.0.client_seed;
        self.replace(user_id, client_seed)
    }

    /// Pick a new client seed. The server seed rotates with it so the new
    /// pair starts from nonce 0.
    pub fn set_client_seed(&self, user_id: u64, client_seed: &str) -> Result<SeedRotation, FairnessError> {
        let trimmed = client_seed.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_CLIENT_SEED_LEN || trimmed.contains(':') {
            return Err(FairnessError::InvalidClientSeed(format!(
                "must be 1-{} characters without ':'",
                MAX_CLIENT_SEED_LEN
            )));
        }
        self.replace(user_id, trimmed.to_string())
    }

    fn replace(&self, user_id: u64, client_seed: String) -> Result<SeedRotation, FairnessError> {
        let (current, snapshot) = self.active(user_id)?;
        let next = self.new_seed(user_id, Some(client_seed), current.generation + 1)?;

        let revealed = RevealedSeed {
            server_seed: current.server_seed.clone(),
            server_seed_hash: current.server_seed_hash.clone(),
            client_seed: current.client_seed.clone(),
            nonces_used: current.nonce,
            revealed_at: Utc::now(),
        };

        let mut unit = UnitOfWork::new();
        unit.expect_snapshot(seed_key(user_id), Some(snapshot));
        unit.put(seed_key(user_id), encode_record(&next)?);
        unit.put(revealed_key(user_id, current.generation), encode_record(&revealed)?);

        self.store.commit(unit).map_err(|e| match e {
            CasinoError::Storage(StorageError::PreconditionFailed { .. }) => {
                FairnessError::ConcurrentModification(user_id)
            }
            other => other.into(),
        })?;

        tracing::info!(
            user_id,
            revealed_hash = %revealed.server_seed_hash,
            next_hash = %next.server_seed_hash,
            "Server seed rotated"
        );

        Ok(SeedRotation {
            revealed,
            next: next.commitment(),
        })
    }

    /// Previously revealed seeds, newest first
    pub fn revealed(&self, user_id: u64, limit: usize) -> Result<Vec<RevealedSeed>, FairnessError> {
        self.store
            .scan_prefix(&revealed_prefix(user_id), limit)?
            .iter()
            .map(|(_, bytes)| decode_record(bytes).map_err(FairnessError::from))
            .collect()
    }

    /// Compute the result hash for the current nonce and stage the nonce
    /// increment on `txn`. Returns `None` when fairness is disabled.
    pub fn stage_receipt(&self, txn: &mut LedgerTxn<'_>) -> Result<Option<FairnessReceipt>, FairnessError> {
        if !self.config.enabled {
            return Ok(None);
        }

        let user_id = txn.user_id();
        let (mut seed, snapshot) = self.active(user_id)?;

        let result_hash = ProvablyFairVerifier::generate_result(&seed.server_seed, &seed.client_seed, seed.nonce);
        let receipt = FairnessReceipt {
            server_seed_hash: seed.server_seed_hash.clone(),
            client_seed: seed.client_seed.clone(),
            nonce: seed.nonce,
            result_hash,
        };

        seed.nonce += 1;
        txn.put_expecting(seed_key(user_id), encode_record(&seed)?, Some(snapshot));

        tracing::debug!(user_id, nonce = receipt.nonce, "Fairness nonce staged");
        Ok(Some(receipt))
    }
}
