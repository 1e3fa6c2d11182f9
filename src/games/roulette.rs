//! European roulette: single zero, 37 pockets.
//!
//! A spin takes one debit for the summed stakes, draws one number and
//! credits the summed payout, all in one ledger commit.

use super::provably_fair::ProvablyFairVerifier;
use super::types::GameType;
use super::{GameError, GameResult};
use crate::config::{OutcomeSource, RouletteConfig};
use crate::fairness::{FairnessError, FairnessReceipt, FairnessService};
use crate::game_store;
use crate::rng::RandomSource;
use crate::wallet::WalletLedger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

pub const POCKETS: u8 = 37;

/// Red numbers on a European wheel
const RED_NUMBERS: [u8; 18] = [1, 3, 5, 7, 9, 12, 14, 16, 18, 19, 21, 23, 25, 27, 30, 32, 34, 36];

pub fn is_red(number: u8) -> bool {
    RED_NUMBERS.contains(&number)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Black,
    Green,
}

impl Color {
    pub fn of(number: u8) -> Self {
        if number == 0 {
            Color::Green
        } else if is_red(number) {
            Color::Red
        } else {
            Color::Black
        }
    }
}

/// Board layout: row `r` (1..=12) holds `3r-2, 3r-1, 3r`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BetKind {
    Straight(u8),
    /// Two adjacent numbers, or 0 with 1, 2 or 3
    Split(u8, u8),
    /// Row 1..=12
    Street(u8),
    /// Top-left number of the 2x2 block
    Corner(u8),
    /// First of two adjacent rows, 1..=11
    SixLine(u8),
    Dozen(u8),
    Column(u8),
    Red,
    Black,
    Even,
    Odd,
    Low,
    High,
}

impl BetKind {
    /// Payout multiplier, stake included
    pub fn multiplier(&self) -> u64 {
        match self {
            BetKind::Straight(_) => 36,
            BetKind::Split(..) => 18,
            BetKind::Street(_) => 12,
            BetKind::Corner(_) => 9,
            BetKind::SixLine(_) => 6,
            BetKind::Dozen(_) | BetKind::Column(_) => 3,
            BetKind::Red | BetKind::Black | BetKind::Even | BetKind::Odd | BetKind::Low | BetKind::High => 2,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let ok = match *self {
            BetKind::Straight(n) => n <= 36,
            BetKind::Split(a, b) => {
                let (lo, hi) = (a.min(b), a.max(b));
                if lo == 0 {
                    (1..=3).contains(&hi)
                } else {
                    hi <= 36 && (hi == lo + 3 || (hi == lo + 1 && lo % 3 != 0))
                }
            }
            BetKind::Street(row) => (1..=12).contains(&row),
            BetKind::Corner(n) => (1..=32).contains(&n) && n % 3 != 0,
            BetKind::SixLine(row) => (1..=11).contains(&row),
            BetKind::Dozen(d) | BetKind::Column(d) => (1..=3).contains(&d),
            BetKind::Red | BetKind::Black | BetKind::Even | BetKind::Odd | BetKind::Low | BetKind::High => true,
        };

        if ok {
            Ok(())
        } else {
            Err(format!("{} is not a valid position", self))
        }
    }

    /// Does this bet cover `number`? Zero only counts for bets that name it.
    pub fn covers(&self, number: u8) -> bool {
        if number > 36 || self.validate().is_err() {
            return false;
        }
        if number == 0 {
            return match *self {
                BetKind::Straight(n) => n == 0,
                BetKind::Split(a, b) => a == 0 || b == 0,
                _ => false,
            };
        }

        let row = (number - 1) / 3 + 1;
        match *self {
            BetKind::Straight(n) => n == number,
            BetKind::Split(a, b) => a == number || b == number,
            BetKind::Street(r) => r == row,
            BetKind::Corner(n) => [n, n + 1, n + 3, n + 4].contains(&number),
            BetKind::SixLine(r) => row == r || row == r + 1,
            BetKind::Dozen(d) => (number - 1) / 12 + 1 == d,
            BetKind::Column(c) => (number - 1) % 3 + 1 == c,
            BetKind::Red => is_red(number),
            BetKind::Black => !is_red(number),
            BetKind::Even => number % 2 == 0,
            BetKind::Odd => number % 2 == 1,
            BetKind::Low => number <= 18,
            BetKind::High => number >= 19,
        }
    }
}

impl fmt::Display for BetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetKind::Straight(n) => write!(f, "straight:{}", n),
            BetKind::Split(a, b) => write!(f, "split:{}:{}", a, b),
            BetKind::Street(r) => write!(f, "street:{}", r),
            BetKind::Corner(n) => write!(f, "corner:{}", n),
            BetKind::SixLine(r) => write!(f, "sixline:{}", r),
            BetKind::Dozen(d) => write!(f, "dozen:{}", d),
            BetKind::Column(c) => write!(f, "column:{}", c),
            BetKind::Red => write!(f, "red"),
            BetKind::Black => write!(f, "black"),
            BetKind::Even => write!(f, "even"),
            BetKind::Odd => write!(f, "odd"),
            BetKind::Low => write!(f, "low"),
            BetKind::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouletteBet {
    pub kind: BetKind,
    pub amount: u64,
}

impl RouletteBet {
    pub fn new(kind: BetKind, amount: u64) -> Self {
        Self { kind, amount }
    }

    pub fn payout(&self, number: u8) -> u64 {
        if self.kind.covers(number) {
            self.amount.saturating_mul(self.kind.multiplier())
        } else {
            0
        }
    }
}

impl fmt::Display for RouletteBet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.amount)
    }
}

/// Parses `kind[:position...]:amount`, e.g. `red:100`, `straight:17:10`,
/// `split:1:2:25`.
impl FromStr for RouletteBet {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| GameError::InvalidBet(format!("'{}': {}", s, reason));
        let parts: Vec<&str> = s.trim().split(':').collect();
        let (amount, head) = parts.split_last().ok_or_else(|| invalid("empty"))?;
        let amount: u64 = amount.parse().map_err(|_| invalid("amount is not a number"))?;

        let (name, args) = head.split_first().ok_or_else(|| invalid("missing bet type"))?;
        let mut numbers = Vec::with_capacity(args.len());
        for arg in args {
            numbers.push(arg.parse::<u8>().map_err(|_| invalid("position is not a number"))?);
        }

        let kind = match (name.to_ascii_lowercase().as_str(), numbers.as_slice()) {
            ("straight", [n]) => BetKind::Straight(*n),
            ("split", [a, b]) => BetKind::Split(*a, *b),
            ("street", [r]) => BetKind::Street(*r),
            ("corner", [n]) => BetKind::Corner(*n),
            ("sixline", [r]) => BetKind::SixLine(*r),
            ("dozen", [d]) => BetKind::Dozen(*d),
            ("column", [c]) => BetKind::Column(*c),
            ("red", []) => BetKind::Red,
            ("black", []) => BetKind::Black,
            ("even", []) => BetKind::Even,
            ("odd", []) => BetKind::Odd,
            ("low", []) => BetKind::Low,
            ("high", []) => BetKind::High,
            _ => return Err(invalid("unknown bet type or wrong number of positions")),
        };

        kind.validate().map_err(GameError::InvalidBet)?;
        Ok(RouletteBet { kind, amount })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BetOutcome {
    pub bet: RouletteBet,
    pub won: bool,
    pub payout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpinResult {
    pub spin_id: Uuid,
    pub user_id: u64,
    pub bet_id: Uuid,
    pub winning_number: u8,
    pub color: Color,
    pub outcomes: Vec<BetOutcome>,
    pub total_stake: u64,
    pub total_payout: u64,
    pub balance: u64,
    pub fairness: Option<FairnessReceipt>,
    pub created_at: DateTime<Utc>,
}

/// Evaluate every bet against one winning number
pub fn evaluate(bets: &[RouletteBet], number: u8) -> Vec<BetOutcome> {
    bets.iter()
        .map(|bet| {
            let payout = bet.payout(number);
            BetOutcome {
                bet: *bet,
                won: payout > 0,
                payout,
            }
        })
        .collect()
}

pub struct RouletteEngine {
    ledger: Arc<WalletLedger>,
    rng: Arc<dyn RandomSource>,
    fairness: Arc<FairnessService>,
    config: RouletteConfig,
}

impl RouletteEngine {
    pub fn new(
        ledger: Arc<WalletLedger>,
        rng: Arc<dyn RandomSource>,
        fairness: Arc<FairnessService>,
        config: RouletteConfig,
    ) -> Self {
        Self {
            ledger,
            rng,
            fairness,
            config,
        }
    }

    fn validate_bets(&self, bets: &[RouletteBet]) -> GameResult<u64> {
        if bets.is_empty() {
            return Err(GameError::InvalidBet("no bets placed".to_string()));
        }
        if bets.len() > self.config.max_bets_per_spin {
            return Err(GameError::InvalidBet(format!(
                "at most {} bets per spin",
                self.config.max_bets_per_spin
            )));
        }

        let mut total: u64 = 0;
        for bet in bets {
            bet.kind.validate().map_err(GameError::InvalidBet)?;
            if bet.amount == 0 {
                return Err(GameError::InvalidBet(format!("{} has no stake", bet.kind)));
            }
            total = total
                .checked_add(bet.amount)
                .ok_or_else(|| GameError::InvalidBet("total stake overflows".to_string()))?;
        }
        Ok(total)
    }

    pub fn spin(&self, user_id: u64, bets: &[RouletteBet]) -> GameResult<SpinResult> {
        let total_stake = self.validate_bets(bets)?;
        let descriptor = bets.iter().map(|b| b.to_string()).collect::<Vec<_>>().join(",");

        let mut txn = self.ledger.begin(user_id)?;
        let bet_id = txn.debit(total_stake, GameType::Roulette, descriptor)?;
        let fairness = self.fairness.stage_receipt(&mut txn)?;

        let winning_number = match self.config.outcome_source {
            OutcomeSource::Entropy => self.rng.next_int(0, POCKETS as u64)? as u8,
            OutcomeSource::ProvablyFair => {
                let receipt = fairness.as_ref().ok_or(FairnessError::Disabled)?;
                ProvablyFairVerifier::hash_to_number(&receipt.result_hash, POCKETS as u32)
                    .ok_or_else(|| GameError::InvalidBet("malformed result hash".to_string()))?
                    as u8
            }
        };

        let outcomes = evaluate(bets, winning_number);
        let total_payout = outcomes
            .iter()
            .fold(0u64, |sum, o| sum.saturating_add(o.payout));
        txn.credit(bet_id, total_payout)?;

        let result = SpinResult {
            spin_id: Uuid::new_v4(),
            user_id,
            bet_id,
            winning_number,
            color: Color::of(winning_number),
            outcomes,
            total_stake,
            total_payout,
            balance: txn.balance(),
            fairness,
            created_at: Utc::now(),
        };
        game_store::stage_spin(&mut txn, &result)?;
        txn.commit()?;

        tracing::info!(
            spin_id = %result.spin_id,
            user_id,
            winning_number,
            total_stake,
            total_payout,
            "Roulette spin settled"
        );
        Ok(result)
    }
}
