//! Persistent round and spin records.
//!
//! Writes are staged on a `LedgerTxn` so a round lands in the same commit
//! as the money it moved. Active blackjack rounds are also listed under an
//! index keyed by start time, so the reconciler reads the oldest first.

use crate::errors::{CasinoResult, StorageError};
use crate::games::blackjack::BlackjackRound;
use crate::games::roulette::SpinResult;
use crate::storage::{decode_record, encode_record, load_record, KeyValueStore};
use crate::wallet::LedgerTxn;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ROUND_PREFIX: &str = "blackjack:round:";
const ACTIVE_ROUND_PREFIX: &str = "blackjack:active:";
const SPIN_PREFIX: &str = "roulette:spin:";

/// Index entry for a round that is still waiting on the player
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveRoundRef {
    pub round_id: Uuid,
    pub user_id: u64,
    pub created_at: DateTime<Utc>,
}

fn round_key(round_id: Uuid) -> Vec<u8> {
    format!("{}{}", ROUND_PREFIX, round_id).into_bytes()
}

fn active_round_key(created_at: DateTime<Utc>, round_id: Uuid) -> Vec<u8> {
    let millis = u64::try_from(created_at.timestamp_millis()).unwrap_or(0);
    format!("{}{:020}:{}", ACTIVE_ROUND_PREFIX, millis, round_id).into_bytes()
}

fn spin_key(spin_id: Uuid) -> Vec<u8> {
    format!("{}{}", SPIN_PREFIX, spin_id).into_bytes()
}

/// Round plus the bytes it was read with
pub fn load_round(store: &dyn KeyValueStore, round_id: Uuid) -> CasinoResult<Option<(BlackjackRound, Vec<u8>)>> {
    load_record(store, &round_key(round_id))
}

/// Stage a round write guarded on `snapshot` (absent for a new round) and
/// keep the active index in step with the round's status.
pub fn stage_round(
    txn: &mut LedgerTxn<'_>,
    round: &BlackjackRound,
    snapshot: Option<Vec<u8>>,
) -> Result<(), StorageError> {
    txn.put_expecting(round_key(round.id()), encode_record(round)?, snapshot);

    let index_key = active_round_key(round.created_at(), round.id());
    if round.status().is_terminal() {
        txn.delete(index_key);
    } else {
        let entry = ActiveRoundRef {
            round_id: round.id(),
            user_id: round.user_id(),
            created_at: round.created_at(),
        };
        txn.put(index_key, encode_record(&entry)?);
    }

    tracing::debug!(
        round_id = %round.id(),
        user_id = round.user_id(),
        status = ?round.status(),
        "Round staged"
    );
    Ok(())
}

/// Active rounds across all users, oldest first, at most `limit`
pub fn active_rounds(store: &dyn KeyValueStore, limit: usize) -> CasinoResult<Vec<ActiveRoundRef>> {
    let rows = store.scan_prefix(ACTIVE_ROUND_PREFIX.as_bytes(), limit)?;
    let mut refs = Vec::with_capacity(rows.len());
    for (_, bytes) in rows {
        refs.push(decode_record(&bytes)?);
    }
    Ok(refs)
}

pub fn load_spin(store: &dyn KeyValueStore, spin_id: Uuid) -> CasinoResult<Option<SpinResult>> {
    Ok(load_record(store, &spin_key(spin_id))?.map(|(spin, _)| spin))
}

/// Spins are written once
pub fn stage_spin(txn: &mut LedgerTxn<'_>, spin: &SpinResult) -> Result<(), StorageError> {
    txn.put_expecting(spin_key(spin.spin_id), encode_record(spin)?, None);
    Ok(())
}
