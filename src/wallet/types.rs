use crate::games::types::GameType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A user's balance. Only the ledger writes this record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub user_id: u64,
    pub balance: u64,
    /// Bumped on every committed change
    pub version: u64,
    /// Number of transactions written so far, also the next sequence number
    pub tx_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(user_id: u64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balance: 0,
            version: 0,
            tx_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Stake placed on one round or spin. `payout` is written exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wager {
    pub id: Uuid,
    pub user_id: u64,
    pub game_type: GameType,
    pub amount: u64,
    pub descriptor: String,
    pub payout: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Wager {
    pub fn is_settled(&self) -> bool {
        self.payout.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TransactionType {
    Bet,
    Payout,
    Deposit,
    Withdrawal,
    Refund,
}

impl TransactionType {
    /// Whether this kind of transaction adds to the balance
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            TransactionType::Payout | TransactionType::Deposit | TransactionType::Refund
        )
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionType::Bet => "bet",
            TransactionType::Payout => "payout",
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Refund => "refund",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransactionStatus {
    Completed,
}

/// Append-only audit record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub user_id: u64,
    pub sequence: u64,
    pub tx_type: TransactionType,
    pub amount: u64,
    pub balance_before: u64,
    pub balance_after: u64,
    pub related_bet_id: Option<Uuid>,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    /// Signed balance change
    pub fn delta(&self) -> i128 {
        if self.tx_type.is_credit() {
            self.amount as i128
        } else {
            -(self.amount as i128)
        }
    }
}

/// Result of a debit that opened a new wager
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DebitResult {
    pub bet_id: Uuid,
    pub balance: u64,
}

/// What a committed ledger transaction wrote
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub user_id: u64,
    pub balance: u64,
    pub transactions: Vec<WalletTransaction>,
}
