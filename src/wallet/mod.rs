//! Wallet ledger
//!
//! The only component allowed to change a balance. Every change goes
//! through a [`LedgerTxn`], which holds the user's lock while it stages
//! writes and commits them as one unit of work. The account record is
//! guarded on the bytes it was read with and each wager on its own prior
//! bytes, so a stale writer (another process, a retried request) is
//! rejected by the store instead of overwriting a newer balance or paying
//! a wager twice.

pub mod txn;
pub mod types;

pub use txn::LedgerTxn;
pub use types::{
    Account, DebitResult, LedgerReceipt, TransactionStatus, TransactionType, Wager, WalletTransaction,
};

use crate::config::WalletConfig;
use crate::errors::StorageError;
use crate::games::types::GameType;
use crate::storage::{decode_record, encode_record, load_record, KeyValueStore, Precondition, UnitOfWork};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use txn::commit_error;
use uuid::Uuid;

const ACCOUNT_PREFIX: &str = "wallet:account:";
const WAGER_PREFIX: &str = "wallet:wager:";
const TRANSACTION_PREFIX: &str = "wallet:tx:";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("User not found: {0}")]
    UserNotFound(u64),

    #[error("Account already exists for user {0}")]
    AccountExists(u64),

    #[error("Wager not found: {0}")]
    WagerNotFound(Uuid),

    #[error("Wager {bet_id} does not belong to user {user_id}")]
    WagerNotOwned { bet_id: Uuid, user_id: u64 },

    #[error("Wager already settled: {0}")]
    AlreadySettled(Uuid),

    #[error("Invalid wager amount {amount}: must be between {min} and {max}")]
    InvalidWagerAmount { amount: u64, min: u64, max: u64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(u64),

    #[error("Crediting {amount} would overflow balance {balance}")]
    BalanceOverflow { balance: u64, amount: u64 },

    #[error("Concurrent modification of {0}")]
    ConcurrentModification(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

fn account_key(user_id: u64) -> Vec<u8> {
    format!("{}{}", ACCOUNT_PREFIX, user_id).into_bytes()
}

fn wager_key(bet_id: Uuid) -> Vec<u8> {
    format!("{}{}", WAGER_PREFIX, bet_id).into_bytes()
}

fn transaction_prefix(user_id: u64) -> Vec<u8> {
    format!("{}{:020}:", TRANSACTION_PREFIX, user_id).into_bytes()
}

fn transaction_key(user_id: u64, sequence: u64) -> Vec<u8> {
    // Inverted sequence so a prefix scan yields newest first
    let mut key = transaction_prefix(user_id);
    key.extend_from_slice(format!("{:020}", u64::MAX - sequence).as_bytes());
    key
}

pub struct WalletLedger {
    store: Arc<dyn KeyValueStore>,
    limits: WalletConfig,
    locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl WalletLedger {
    pub fn new(store: Arc<dyn KeyValueStore>, limits: WalletConfig) -> Self {
        Self {
            store,
            limits,
            locks: DashMap::new(),
        }
    }

    pub(crate) fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    pub fn limits(&self) -> &WalletConfig {
        &self.limits
    }

    /// Reject stakes of zero or outside the configured table limits
    pub fn check_wager_amount(&self, amount: u64) -> Result<(), LedgerError> {
        if amount == 0 || amount < self.limits.min_bet || amount > self.limits.max_bet {
            return Err(LedgerError::InvalidWagerAmount {
                amount,
                min: self.limits.min_bet,
                max: self.limits.max_bet,
            });
        }
        Ok(())
    }

    /// Lock the user's ledger and start staging changes
    pub fn begin(&self, user_id: u64) -> Result<LedgerTxn<'_>, LedgerError> {
        let lock = self.user_lock(user_id);
        let guard = lock.lock_arc();

        let (account, snapshot) = load_record::<Account>(self.store(), &account_key(user_id))
            .map_err(commit_error)?
            .ok_or(LedgerError::UserNotFound(user_id))?;

        Ok(LedgerTxn::new(self, guard, account, snapshot))
    }

    fn user_lock(&self, user_id: u64) -> Arc<Mutex<()>> {
        self.locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn open_account(&self, user_id: u64) -> Result<Account, LedgerError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock();

        let account = Account::new(user_id, Utc::now());
        let mut unit = UnitOfWork::new();
        unit.expect(account_key(user_id), Precondition::Absent);
        unit.put(account_key(user_id), encode_record(&account)?);

        self.store.commit(unit).map_err(|e| match commit_error(e) {
            LedgerError::ConcurrentModification(_) => LedgerError::AccountExists(user_id),
            other => other,
        })?;

        tracing::info!(user_id, "Account opened");
        Ok(account)
    }

    pub fn account(&self, user_id: u64) -> Result<Account, LedgerError> {
        load_record::<Account>(self.store(), &account_key(user_id))
            .map_err(commit_error)?
            .map(|(account, _)| account)
            .ok_or(LedgerError::UserNotFound(user_id))
    }

    pub fn get_balance(&self, user_id: u64) -> Result<u64, LedgerError> {
        Ok(self.account(user_id)?.balance)
    }

    /// Open a wager and take its stake in one commit
    pub fn debit(
        &self,
        user_id: u64,
        amount: u64,
        game_type: GameType,
        descriptor: &str,
    ) -> Result<DebitResult, LedgerError> {
        let mut txn = self.begin(user_id)?;
        let bet_id = txn.debit(amount, game_type, descriptor)?;
        let receipt = txn.commit()?;
        Ok(DebitResult {
            bet_id,
            balance: receipt.balance,
        })
    }

    /// Settle `bet_id` with `payout`; a second credit is rejected
    pub fn credit(&self, user_id: u64, bet_id: Uuid, payout: u64) -> Result<u64, LedgerError> {
        let mut txn = self.begin(user_id)?;
        txn.credit(bet_id, payout)?;
        Ok(txn.commit()?.balance)
    }

    pub fn refund(&self, user_id: u64, bet_id: Uuid) -> Result<u64, LedgerError> {
        let mut txn = self.begin(user_id)?;
        txn.refund(bet_id)?;
        Ok(txn.commit()?.balance)
    }

    pub fn add_funds(&self, user_id: u64, amount: u64) -> Result<u64, LedgerError> {
        let mut txn = self.begin(user_id)?;
        txn.deposit(amount)?;
        Ok(txn.commit()?.balance)
    }

    pub fn withdraw(&self, user_id: u64, amount: u64) -> Result<u64, LedgerError> {
        let mut txn = self.begin(user_id)?;
        txn.withdraw(amount)?;
        Ok(txn.commit()?.balance)
    }

    pub fn wager(&self, bet_id: Uuid) -> Result<Option<Wager>, LedgerError> {
        Ok(load_record::<Wager>(self.store(), &wager_key(bet_id))
            .map_err(commit_error)?
            .map(|(wager, _)| wager))
    }

    /// Audit trail, newest first
    pub fn transactions(&self, user_id: u64, limit: usize) -> Result<Vec<WalletTransaction>, LedgerError> {
        self.account(user_id)?;
        let rows = self
            .store
            .scan_prefix(&transaction_prefix(user_id), limit)
            .map_err(commit_error)?;

        rows.iter()
            .map(|(_, bytes)| decode_record(bytes).map_err(LedgerError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::thread;

    fn ledger() -> WalletLedger {
        WalletLedger::new(
            Arc::new(MemoryStorage::new()),
            WalletConfig {
                min_bet: 1,
                max_bet: 10_000,
            },
        )
    }

    fn funded(balance: u64) -> WalletLedger {
        let ledger = ledger();
        ledger.open_account(1).unwrap();
        ledger.add_funds(1, balance).unwrap();
        ledger
    }

    #[test]
    fn test_open_account_once() {
        let ledger = ledger();
        assert_eq!(ledger.open_account(7).unwrap().balance, 0);
        assert_eq!(ledger.open_account(7), Err(LedgerError::AccountExists(7)));
    }

    #[test]
    fn test_unknown_user() {
        let ledger = ledger();
        assert_eq!(ledger.get_balance(9), Err(LedgerError::UserNotFound(9)));
        assert!(matches!(
            ledger.debit(9, 10, GameType::Roulette, "red"),
            Err(LedgerError::UserNotFound(9))
        ));
    }

    #[test]
    fn test_debit_and_credit() {
        let ledger = funded(1_000);
        let debit = ledger.debit(1, 100, GameType::Blackjack, "hand").unwrap();
        assert_eq!(debit.balance, 900);

        let wager = ledger.wager(debit.bet_id).unwrap().unwrap();
        assert_eq!(wager.amount, 100);
        assert_eq!(wager.payout, None);

        assert_eq!(ledger.credit(1, debit.bet_id, 250).unwrap(), 1_150);
        let wager = ledger.wager(debit.bet_id).unwrap().unwrap();
        assert_eq!(wager.payout, Some(250));
        assert!(wager.settled_at.is_some());
    }

    #[test]
    fn test_insufficient_funds_leaves_nothing_behind() {
        let ledger = funded(50);
        assert_eq!(
            ledger.debit(1, 51, GameType::Roulette, "red"),
            Err(LedgerError::InsufficientFunds {
                required: 51,
                available: 50
            })
        );
        assert_eq!(ledger.get_balance(1).unwrap(), 50);
        assert_eq!(ledger.transactions(1, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_wager_limits() {
        let ledger = funded(100_000);
        for amount in [0, 10_001] {
            assert!(matches!(
                ledger.debit(1, amount, GameType::Roulette, "red"),
                Err(LedgerError::InvalidWagerAmount { .. })
            ));
        }
    }

    #[test]
    fn test_double_credit_rejected() {
        let ledger = funded(1_000);
        let debit = ledger.debit(1, 100, GameType::Roulette, "red").unwrap();
        ledger.credit(1, debit.bet_id, 200).unwrap();
        assert_eq!(
            ledger.credit(1, debit.bet_id, 200),
            Err(LedgerError::AlreadySettled(debit.bet_id))
        );
        assert_eq!(ledger.get_balance(1).unwrap(), 1_100);
    }

    #[test]
    fn test_zero_payout_closes_wager() {
        let ledger = funded(1_000);
        let debit = ledger.debit(1, 100, GameType::Roulette, "red").unwrap();
        assert_eq!(ledger.credit(1, debit.bet_id, 0).unwrap(), 900);
        assert_eq!(ledger.wager(debit.bet_id).unwrap().unwrap().payout, Some(0));
        assert_eq!(ledger.transactions(1, 10).unwrap().len(), 2);
        assert!(matches!(
            ledger.refund(1, debit.bet_id),
            Err(LedgerError::AlreadySettled(_))
        ));
    }

    #[test]
    fn test_credit_other_users_wager() {
        let ledger = funded(1_000);
        ledger.open_account(2).unwrap();
        let debit = ledger.debit(1, 100, GameType::Roulette, "red").unwrap();
        assert_eq!(
            ledger.credit(2, debit.bet_id, 200),
            Err(LedgerError::WagerNotOwned {
                bet_id: debit.bet_id,
                user_id: 2
            })
        );
        assert!(matches!(
            ledger.credit(1, Uuid::new_v4(), 1),
            Err(LedgerError::WagerNotFound(_))
        ));
    }

    #[test]
    fn test_refund_returns_stake() {
        let ledger = funded(500);
        let debit = ledger.debit(1, 200, GameType::Blackjack, "hand").unwrap();
        assert_eq!(ledger.refund(1, debit.bet_id).unwrap(), 500);
        let history = ledger.transactions(1, 10).unwrap();
        assert_eq!(history[0].tx_type, TransactionType::Refund);
        assert_eq!(history[0].related_bet_id, Some(debit.bet_id));
    }

    #[test]
    fn test_increase_stake_settles_once() {
        let ledger = funded(1_000);
        let debit = ledger.debit(1, 100, GameType::Blackjack, "hand").unwrap();

        let mut txn = ledger.begin(1).unwrap();
        txn.increase_stake(debit.bet_id, 100).unwrap();
        txn.credit(debit.bet_id, 400).unwrap();
        assert_eq!(txn.commit().unwrap().balance, 1_200);

        assert_eq!(ledger.wager(debit.bet_id).unwrap().unwrap().amount, 200);
    }

    #[test]
    fn test_dropped_txn_discards_changes() {
        let ledger = funded(1_000);
        {
            let mut txn = ledger.begin(1).unwrap();
            txn.debit(100, GameType::Roulette, "red").unwrap();
            txn.put(b"extra".to_vec(), b"1".to_vec());
        }
        assert_eq!(ledger.get_balance(1).unwrap(), 1_000);
        assert_eq!(ledger.store().get(b"extra").unwrap(), None);
    }

    #[test]
    fn test_stale_extra_record_aborts_commit() {
        let ledger = funded(1_000);
        let mut txn = ledger.begin(1).unwrap();
        txn.debit(100, GameType::Roulette, "red").unwrap();
        txn.put_expecting(b"round".to_vec(), b"new".to_vec(), Some(b"old".to_vec()));
        assert!(matches!(
            txn.commit(),
            Err(LedgerError::ConcurrentModification(_))
        ));
        assert_eq!(ledger.get_balance(1).unwrap(), 1_000);
    }

    #[test]
    fn test_overflowing_credit_rejected() {
        let ledger = funded(u64::MAX);
        assert_eq!(
            ledger.add_funds(1, 10),
            Err(LedgerError::BalanceOverflow {
                balance: u64::MAX,
                amount: 10
            })
        );
        assert_eq!(ledger.get_balance(1).unwrap(), u64::MAX);

        let history = ledger.transactions(1, 10).unwrap();
        assert_eq!(history.len(), 1);
        let sum: i128 = history.iter().map(WalletTransaction::delta).sum();
        assert_eq!(sum, u64::MAX as i128);
    }

    #[test]
    fn test_overflowing_payout_leaves_wager_open() {
        let ledger = funded(u64::MAX);
        let debit = ledger.debit(1, 100, GameType::Roulette, "red").unwrap();
        assert!(matches!(
            ledger.credit(1, debit.bet_id, 200),
            Err(LedgerError::BalanceOverflow { .. })
        ));
        assert_eq!(ledger.wager(debit.bet_id).unwrap().unwrap().payout, None);
        assert_eq!(ledger.get_balance(1).unwrap(), u64::MAX - 100);
    }

    #[test]
    fn test_store_rejects_second_settlement_from_another_ledger() {
        // Two ledgers on one store share no in-process locks
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStorage::new());
        let limits = WalletConfig {
            min_bet: 1,
            max_bet: 10_000,
        };
        let a = WalletLedger::new(store.clone(), limits.clone());
        let b = WalletLedger::new(store, limits);
        a.open_account(1).unwrap();
        a.add_funds(1, 1_000).unwrap();
        let debit = a.debit(1, 100, GameType::Roulette, "red").unwrap();

        let mut first = a.begin(1).unwrap();
        let mut second = b.begin(1).unwrap();
        first.credit(debit.bet_id, 200).unwrap();
        second.credit(debit.bet_id, 200).unwrap();

        let results = [first.commit(), second.commit()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(matches!(
            results[1],
            Err(LedgerError::ConcurrentModification(_))
        ));

        assert_eq!(a.get_balance(1).unwrap(), 1_100);
        assert_eq!(b.wager(debit.bet_id).unwrap().unwrap().payout, Some(200));
        let payouts = a
            .transactions(1, 10)
            .unwrap()
            .into_iter()
            .filter(|t| t.tx_type == TransactionType::Payout)
            .count();
        assert_eq!(payouts, 1);
    }

    #[test]
    fn test_withdraw() {
        let ledger = funded(300);
        assert_eq!(ledger.withdraw(1, 100).unwrap(), 200);
        assert!(matches!(
            ledger.withdraw(1, 201),
            Err(LedgerError::InsufficientFunds { .. })
        ));
        assert_eq!(ledger.withdraw(1, 0), Err(LedgerError::InvalidAmount(0)));
    }

    #[test]
    fn test_balance_equals_sum_of_transactions() {
        let ledger = funded(10_000);
        for i in 0..20u64 {
            let debit = ledger.debit(1, 10 + i, GameType::Roulette, "mixed").unwrap();
            ledger.credit(1, debit.bet_id, (i % 3) * 25).unwrap();
        }
        ledger.withdraw(1, 77).unwrap();

        let history = ledger.transactions(1, 1_000).unwrap();
        let sum: i128 = history.iter().map(WalletTransaction::delta).sum();
        assert_eq!(sum, ledger.get_balance(1).unwrap() as i128);

        // Newest first, sequence contiguous
        let seqs: Vec<u64> = history.iter().map(|t| t.sequence).collect();
        let mut expected: Vec<u64> = (0..history.len() as u64).collect();
        expected.reverse();
        assert_eq!(seqs, expected);
    }

    #[test]
    fn test_concurrent_debits_never_overdraw() {
        let ledger = Arc::new(funded(1_000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    let mut ok = 0u64;
                    for _ in 0..50 {
                        if ledger.debit(1, 10, GameType::Roulette, "red").is_ok() {
                            ok += 1;
                        }
                    }
                    ok
                })
            })
            .collect();

        let succeeded: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(succeeded, 100);
        assert_eq!(ledger.get_balance(1).unwrap(), 0);
    }
}
