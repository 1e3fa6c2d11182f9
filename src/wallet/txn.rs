//! Ledger transaction: everything one operation does to a user's money,
//! staged in memory and committed as a single unit of work.

use super::types::{Account, LedgerReceipt, TransactionStatus, TransactionType, Wager, WalletTransaction};
use super::{account_key, transaction_key, wager_key, LedgerError, WalletLedger};
use crate::errors::{CasinoError, StorageError};
use crate::games::types::GameType;
use crate::storage::{decode_record, encode_record, Precondition, UnitOfWork};
use chrono::Utc;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::RawMutex;
use uuid::Uuid;

struct StagedWager {
    wager: Wager,
    /// Bytes read from the store, `None` for a wager opened in this txn
    snapshot: Option<Vec<u8>>,
}

/// Holds the user's ledger lock until committed or dropped.
/// Dropping without `commit` discards every staged change.
pub struct LedgerTxn<'a> {
    ledger: &'a WalletLedger,
    _guard: ArcMutexGuard<RawMutex, ()>,
    account: Account,
    account_snapshot: Vec<u8>,
    wagers: Vec<StagedWager>,
    transactions: Vec<WalletTransaction>,
    extra: UnitOfWork,
}

impl<'a> LedgerTxn<'a> {
    pub(super) fn new(
        ledger: &'a WalletLedger,
        guard: ArcMutexGuard<RawMutex, ()>,
        account: Account,
        account_snapshot: Vec<u8>,
    ) -> Self {
        Self {
            ledger,
            _guard: guard,
            account,
            account_snapshot,
            wagers: Vec::new(),
            transactions: Vec::new(),
            extra: UnitOfWork::new(),
        }
    }

    pub fn user_id(&self) -> u64 {
        self.account.user_id
    }

    /// Balance including everything staged so far
    pub fn balance(&self) -> u64 {
        self.account.balance
    }

    /// Open a wager and take its stake from the balance
    pub fn debit(&mut self, amount: u64, game_type: GameType, descriptor: impl Into<String>) -> Result<Uuid, LedgerError> {
        self.ledger.check_wager_amount(amount)?;
        self.ensure_funds(amount)?;

        let now = Utc::now();
        let wager = Wager {
            id: Uuid::new_v4(),
            user_id: self.account.user_id,
            game_type,
            amount,
            descriptor: descriptor.into(),
            payout: None,
            created_at: now,
            settled_at: None,
        };
        let bet_id = wager.id;

        self.record(TransactionType::Bet, amount, Some(bet_id))?;
        self.wagers.push(StagedWager { wager, snapshot: None });

        tracing::debug!(user_id = self.account.user_id, bet_id = %bet_id, amount, "Wager debited");
        Ok(bet_id)
    }

    /// Take `amount` more against an open wager
    pub fn increase_stake(&mut self, bet_id: Uuid, amount: u64) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        self.open_wager(bet_id)?;
        self.ensure_funds(amount)?;

        self.record(TransactionType::Bet, amount, Some(bet_id))?;
        let wager = self.staged_mut(bet_id)?;
        wager.amount = wager.amount.saturating_add(amount);

        tracing::debug!(user_id = self.account.user_id, bet_id = %bet_id, amount, "Stake increased");
        Ok(())
    }

    /// Settle a wager with `payout`. A zero payout closes the wager without
    /// touching the balance.
    pub fn credit(&mut self, bet_id: Uuid, payout: u64) -> Result<(), LedgerError> {
        self.open_wager(bet_id)?;

        if payout > 0 {
            self.record(TransactionType::Payout, payout, Some(bet_id))?;
        }
        let wager = self.staged_mut(bet_id)?;
        wager.payout = Some(payout);
        wager.settled_at = Some(Utc::now());

        tracing::debug!(user_id = self.account.user_id, bet_id = %bet_id, payout, "Wager settled");
        Ok(())
    }

    /// Settle a wager by returning its full stake
    pub fn refund(&mut self, bet_id: Uuid) -> Result<u64, LedgerError> {
        self.open_wager(bet_id)?;
        let amount = self.staged_mut(bet_id)?.amount;

        self.record(TransactionType::Refund, amount, Some(bet_id))?;
        let wager = self.staged_mut(bet_id)?;
        wager.payout = Some(amount);
        wager.settled_at = Some(Utc::now());

        tracing::debug!(user_id = self.account.user_id, bet_id = %bet_id, amount, "Wager refunded");
        Ok(amount)
    }

    pub fn deposit(&mut self, amount: u64) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        self.record(TransactionType::Deposit, amount, None)?;
        Ok(())
    }

    pub fn withdraw(&mut self, amount: u64) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        self.ensure_funds(amount)?;
        self.record(TransactionType::Withdrawal, amount, None)?;
        Ok(())
    }

    /// Wager as staged in this transaction, loading it on first access
    pub fn wager(&mut self, bet_id: Uuid) -> Result<&Wager, LedgerError> {
        self.stage_wager(bet_id)?;
        self.staged_mut(bet_id).map(|w| &*w)
    }

    /// Stage an extra record that commits together with the ledger writes
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: Vec<u8>) {
        self.extra.put(key, value);
    }

    /// Like `put`, guarded on the key still holding `expected` (or being
    /// absent for `None`) at commit time
    pub fn put_expecting(&mut self, key: impl Into<Vec<u8>>, value: Vec<u8>, expected: Option<Vec<u8>>) {
        let key = key.into();
        self.extra.expect_snapshot(key.clone(), expected);
        self.extra.put(key, value);
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.extra.delete(key);
    }

    /// Write every staged change atomically
    pub fn commit(mut self) -> Result<LedgerReceipt, LedgerError> {
        let user_id = self.account.user_id;
        let mut unit = std::mem::take(&mut self.extra);

        if !self.transactions.is_empty() || !self.wagers.is_empty() {
            self.account.version += 1;
            self.account.updated_at = Utc::now();
        }
        unit.expect(account_key(user_id), Precondition::Equals(self.account_snapshot.clone()));
        unit.put(account_key(user_id), encode_record(&self.account)?);

        for staged in &self.wagers {
            let key = wager_key(staged.wager.id);
            unit.expect_snapshot(key.clone(), staged.snapshot.clone());
            unit.put(key, encode_record(&staged.wager)?);
        }

        for tx in &self.transactions {
            let key = transaction_key(user_id, tx.sequence);
            unit.expect(key.clone(), Precondition::Absent);
            unit.put(key, encode_record(tx)?);
        }

        self.ledger.store().commit(unit).map_err(commit_error)?;

        tracing::info!(
            user_id,
            balance = self.account.balance,
            transactions = self.transactions.len(),
            "Ledger transaction committed"
        );

        Ok(LedgerReceipt {
            user_id,
            balance: self.account.balance,
            transactions: std::mem::take(&mut self.transactions),
        })
    }

    fn ensure_funds(&self, amount: u64) -> Result<(), LedgerError> {
        if self.account.balance < amount {
            tracing::warn!(
                user_id = self.account.user_id,
                required = amount,
                available = self.account.balance,
                "Insufficient funds"
            );
            return Err(LedgerError::InsufficientFunds {
                required: amount,
                available: self.account.balance,
            });
        }
        Ok(())
    }

    /// Apply a balance change and append its audit record
    fn record(&mut self, tx_type: TransactionType, amount: u64, related_bet_id: Option<Uuid>) -> Result<(), LedgerError> {
        let before = self.account.balance;
        let after = if tx_type.is_credit() {
            before.checked_add(amount).ok_or(LedgerError::BalanceOverflow {
                balance: before,
                amount,
            })?
        } else {
            before.checked_sub(amount).ok_or(LedgerError::InsufficientFunds {
                required: amount,
                available: before,
            })?
        };

        self.transactions.push(WalletTransaction {
            id: Uuid::new_v4(),
            user_id: self.account.user_id,
            sequence: self.account.tx_count,
            tx_type,
            amount,
            balance_before: before,
            balance_after: after,
            related_bet_id,
            status: TransactionStatus::Completed,
            created_at: Utc::now(),
        });
        self.account.tx_count += 1;
        self.account.balance = after;
        Ok(())
    }

    /// Wager must exist, belong to this user and still be unsettled
    fn open_wager(&mut self, bet_id: Uuid) -> Result<(), LedgerError> {
        self.stage_wager(bet_id)?;
        let wager = self.staged_mut(bet_id)?;
        if wager.is_settled() {
            tracing::warn!(user_id = self.account.user_id, bet_id = %bet_id, "Wager already settled");
            return Err(LedgerError::AlreadySettled(bet_id));
        }
        Ok(())
    }

    fn stage_wager(&mut self, bet_id: Uuid) -> Result<(), LedgerError> {
        if self.wagers.iter().any(|s| s.wager.id == bet_id) {
            return Ok(());
        }

        let bytes = self
            .ledger
            .store()
            .get(&wager_key(bet_id))
            .map_err(commit_error)?
            .ok_or(LedgerError::WagerNotFound(bet_id))?;
        let wager: Wager = decode_record(&bytes)?;

        if wager.user_id != self.account.user_id {
            return Err(LedgerError::WagerNotOwned {
                bet_id,
                user_id: self.account.user_id,
            });
        }

        self.wagers.push(StagedWager {
            wager,
            snapshot: Some(bytes),
        });
        Ok(())
    }

    fn staged_mut(&mut self, bet_id: Uuid) -> Result<&mut Wager, LedgerError> {
        self.wagers
            .iter_mut()
            .find(|s| s.wager.id == bet_id)
            .map(|s| &mut s.wager)
            .ok_or(LedgerError::WagerNotFound(bet_id))
    }
}

/// Map a store failure into ledger terms
pub(super) fn commit_error(err: CasinoError) -> LedgerError {
    match err {
        CasinoError::Storage(StorageError::PreconditionFailed { key }) => {
            tracing::warn!(key = %key, "Ledger commit lost a race");
            LedgerError::ConcurrentModification(key)
        }
        CasinoError::Storage(e) => LedgerError::Storage(e),
        other => LedgerError::Storage(StorageError::WriteFailed(other.to_string())),
    }
}
