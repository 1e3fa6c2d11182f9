//! Blackjack engine
//!
//! One round per wager. Every action locks the player's ledger, loads the
//! round, applies the action and commits the round together with any money
//! movement, so a failed debit or an entropy failure leaves nothing behind.
//! Each draw comes from a freshly shuffled shoe.
//!
//! Cards are not derived from the provably-fair seed. A settled round still
//! consumes one nonce and carries its receipt, which lets a player audit
//! that rounds were counted against the committed seed, but the receipt
//! does not reproduce the cards.

use super::cards::{Shoe, ShoeSource};
use super::hand::{hand_total, is_bust, is_natural, is_soft};
use super::types::{Card, GameType};
use super::{GameResult, InvalidOperation};
use crate::config::BlackjackConfig;
use crate::errors::EntropyError;
use crate::fairness::{FairnessReceipt, FairnessService};
use crate::game_store;
use crate::storage::KeyValueStore;
use crate::wallet::{LedgerTxn, WalletLedger};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RoundStatus {
    Active,
    PlayerBlackjack,
    PlayerBust,
    DealerBust,
    PlayerWin,
    DealerWin,
    Push,
    /// Refunded by reconciliation after the player went quiet
    Expired,
}

impl RoundStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RoundStatus::Active)
    }

    /// Transition table. Only `Active` has successors.
    pub fn can_transition_to(&self, next: RoundStatus) -> bool {
        use RoundStatus::*;
        match self {
            Active => match next {
                PlayerBlackjack | PlayerBust | DealerBust | PlayerWin | DealerWin | Push | Expired => true,
                Active => false,
            },
            PlayerBlackjack | PlayerBust | DealerBust | PlayerWin | DealerWin | Push | Expired => false,
        }
    }

    /// Amount returned to the player for a round ending in this status
    pub fn payout(&self, stake: u64) -> u64 {
        match self {
            RoundStatus::PlayerBlackjack => stake.saturating_add(stake.saturating_mul(3) / 2),
            RoundStatus::DealerBust | RoundStatus::PlayerWin => stake.saturating_mul(2),
            RoundStatus::Push | RoundStatus::Expired => stake,
            RoundStatus::PlayerBust | RoundStatus::DealerWin | RoundStatus::Active => 0,
        }
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Persisted round. Fields change only through the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlackjackRound {
    id: Uuid,
    user_id: u64,
    bet_id: Uuid,
    bet_amount: u64,
    player_hand: Vec<Card>,
    dealer_hand: Vec<Card>,
    player_total: u32,
    dealer_total: u32,
    status: RoundStatus,
    payout: Option<u64>,
    doubled: bool,
    fairness: Option<FairnessReceipt>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl BlackjackRound {
    fn new(user_id: u64, bet_id: Uuid, bet_amount: u64, player_hand: Vec<Card>, dealer_hand: Vec<Card>) -> Self {
        let mut round = Self {
            id: Uuid::new_v4(),
            user_id,
            bet_id,
            bet_amount,
            player_hand,
            dealer_hand,
            player_total: 0,
            dealer_total: 0,
            status: RoundStatus::Active,
            payout: None,
            doubled: false,
            fairness: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        round.refresh_totals();
        round
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn bet_id(&self) -> Uuid {
        self.bet_id
    }

    pub fn bet_amount(&self) -> u64 {
        self.bet_amount
    }

    pub fn status(&self) -> RoundStatus {
        self.status
    }

    pub fn payout(&self) -> Option<u64> {
        self.payout
    }

    pub fn player_hand(&self) -> &[Card] {
        &self.player_hand
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    fn refresh_totals(&mut self) {
        self.player_total = hand_total(&self.player_hand);
        self.dealer_total = hand_total(&self.dealer_hand);
    }

    fn push_player_card(&mut self, card: Card) {
        self.player_hand.push(card);
        self.refresh_totals();
    }

    fn push_dealer_card(&mut self, card: Card) {
        self.dealer_hand.push(card);
        self.refresh_totals();
    }

    /// Move to `next`, fixing the payout. Terminal rounds never change again.
    fn transition(&mut self, next: RoundStatus) -> Result<(), InvalidOperation> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidOperation::IllegalTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.payout = Some(next.payout(self.bet_amount));
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Caller-facing view; the hole card stays hidden while the round is live
    pub fn view(&self, balance: u64) -> RoundState {
        let dealer_hand: Vec<Card> = if self.status.is_terminal() {
            self.dealer_hand.clone()
        } else {
            self.dealer_hand.iter().take(1).copied().collect()
        };

        RoundState {
            round_id: self.id,
            user_id: self.user_id,
            bet_id: self.bet_id,
            bet_amount: self.bet_amount,
            player_total: self.player_total,
            dealer_total: hand_total(&dealer_hand),
            player_hand: self.player_hand.clone(),
            dealer_hand,
            status: self.status,
            payout: self.payout,
            can_double: self.status == RoundStatus::Active && self.player_hand.len() == 2,
            balance,
            fairness: self.fairness.clone(),
        }
    }
}

/// What the caller sees after each action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundState {
    pub round_id: Uuid,
    pub user_id: u64,
    pub bet_id: Uuid,
    pub bet_amount: u64,
    pub player_hand: Vec<Card>,
    pub dealer_hand: Vec<Card>,
    pub player_total: u32,
    pub dealer_total: u32,
    pub status: RoundStatus,
    pub payout: Option<u64>,
    pub can_double: bool,
    pub balance: u64,
    /// Nonce audit for a settled round; the cards come from the shoe
    pub fairness: Option<FairnessReceipt>,
}

pub struct BlackjackEngine {
    store: Arc<dyn KeyValueStore>,
    ledger: Arc<WalletLedger>,
    shoes: Arc<dyn ShoeSource>,
    fairness: Arc<FairnessService>,
    rules: BlackjackConfig,
}

impl BlackjackEngine {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        ledger: Arc<WalletLedger>,
        shoes: Arc<dyn ShoeSource>,
        fairness: Arc<FairnessService>,
        rules: BlackjackConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            shoes,
            fairness,
            rules,
        }
    }

    fn fresh_shoe(&self) -> Result<Shoe, EntropyError> {
        self.shoes.shuffled_shoe(self.rules.deck_count)
    }

    fn draw(shoe: &mut Shoe) -> Result<Card, EntropyError> {
        shoe.draw()
            .ok_or_else(|| EntropyError::ShuffleSourceUnavailable("shoe exhausted".to_string()))
    }

    /// Debit the stake and deal. A player natural settles immediately.
    pub fn initialize_game(&self, user_id: u64, bet_amount: u64) -> GameResult<RoundState> {
        let mut txn = self.ledger.begin(user_id)?;
        let bet_id = txn.debit(bet_amount, GameType::Blackjack, "blackjack")?;

        let mut shoe = self.fresh_shoe()?;
        let p1 = Self::draw(&mut shoe)?;
        let d1 = Self::draw(&mut shoe)?;
        let p2 = Self::draw(&mut shoe)?;
        let d2 = Self::draw(&mut shoe)?;

        let mut round = BlackjackRound::new(user_id, bet_id, bet_amount, vec![p1, p2], vec![d1, d2]);

        if is_natural(&round.player_hand) {
            let outcome = if is_natural(&round.dealer_hand) {
                RoundStatus::Push
            } else {
                RoundStatus::PlayerBlackjack
            };
            round.transition(outcome)?;
            self.settle(&mut txn, &mut round)?;
        }

        game_store::stage_round(&mut txn, &round, None)?;
        let receipt = txn.commit()?;

        tracing::info!(
            round_id = %round.id,
            user_id,
            bet_amount,
            status = %round.status,
            "Blackjack round dealt"
        );
        Ok(round.view(receipt.balance))
    }

    pub fn hit(&self, round_id: Uuid, user_id: u64) -> GameResult<RoundState> {
        let mut txn = self.ledger.begin(user_id)?;
        let (mut round, snapshot) = self.load_active(round_id, user_id)?;

        let mut shoe = self.fresh_shoe()?;
        round.push_player_card(Self::draw(&mut shoe)?);

        if is_bust(&round.player_hand) {
            round.transition(RoundStatus::PlayerBust)?;
            self.settle(&mut txn, &mut round)?;
        }

        self.finish(txn, round, snapshot)
    }

    pub fn stand(&self, round_id: Uuid, user_id: u64) -> GameResult<RoundState> {
        let mut txn = self.ledger.begin(user_id)?;
        let (mut round, snapshot) = self.load_active(round_id, user_id)?;

        self.play_dealer(&mut round)?;
        self.settle(&mut txn, &mut round)?;

        self.finish(txn, round, snapshot)
    }

    /// Double the stake, take exactly one card, then bust or stand
    pub fn double_down(&self, round_id: Uuid, user_id: u64) -> GameResult<RoundState> {
        let mut txn = self.ledger.begin(user_id)?;
        let (mut round, snapshot) = self.load_active(round_id, user_id)?;

        if round.player_hand.len() != 2 {
            return Err(InvalidOperation::IllegalAction(
                "double down requires exactly two cards".to_string(),
            )
            .into());
        }

        txn.increase_stake(round.bet_id, round.bet_amount)?;
        round.bet_amount = round.bet_amount.saturating_mul(2);
        round.doubled = true;

        let mut shoe = self.fresh_shoe()?;
        round.push_player_card(Self::draw(&mut shoe)?);

        if is_bust(&round.player_hand) {
            round.transition(RoundStatus::PlayerBust)?;
        } else {
            self.play_dealer(&mut round)?;
        }
        self.settle(&mut txn, &mut round)?;

        self.finish(txn, round, snapshot)
    }

    /// Refund an Active round that started before `cutoff`. Returns the
    /// refunded amount, or `None` if the round has moved on since it was
    /// listed.
    pub fn expire(&self, round_id: Uuid, user_id: u64, cutoff: DateTime<Utc>) -> GameResult<Option<u64>> {
        let mut txn = self.ledger.begin(user_id)?;
        let Some((mut round, snapshot)) = game_store::load_round(self.store.as_ref(), round_id)? else {
            return Ok(None);
        };
        if round.user_id != user_id || round.status.is_terminal() || round.created_at > cutoff {
            return Ok(None);
        }

        let refunded = txn.refund(round.bet_id)?;
        round.transition(RoundStatus::Expired)?;
        game_store::stage_round(&mut txn, &round, Some(snapshot))?;
        txn.commit()?;

        tracing::info!(round_id = %round_id, user_id, refunded, "Orphaned round refunded");
        Ok(Some(refunded))
    }

    /// Current view of a round owned by `user_id`
    pub fn state(&self, round_id: Uuid, user_id: u64) -> GameResult<RoundState> {
        let (round, _) = self.load_owned(round_id, user_id)?;
        let balance = self.ledger.get_balance(user_id)?;
        Ok(round.view(balance))
    }

    fn load_owned(&self, round_id: Uuid, user_id: u64) -> GameResult<(BlackjackRound, Vec<u8>)> {
        let (round, snapshot) = game_store::load_round(self.store.as_ref(), round_id)?
            .ok_or(InvalidOperation::RoundNotFound(round_id))?;

        if round.user_id != user_id {
            tracing::warn!(round_id = %round_id, user_id, "Round accessed by non-owner");
            return Err(InvalidOperation::NotOwned { round_id, user_id }.into());
        }
        Ok((round, snapshot))
    }

    fn load_active(&self, round_id: Uuid, user_id: u64) -> GameResult<(BlackjackRound, Vec<u8>)> {
        let (round, snapshot) = self.load_owned(round_id, user_id)?;
        if round.status.is_terminal() {
            return Err(InvalidOperation::RoundNotActive(round_id).into());
        }
        Ok((round, snapshot))
    }

    fn dealer_should_hit(&self, cards: &[Card]) -> bool {
        let total = hand_total(cards);
        total < 17 || (self.rules.dealer_hits_soft_17 && total == 17 && is_soft(cards))
    }

    /// Reveal, draw to 17 and compare
    fn play_dealer(&self, round: &mut BlackjackRound) -> GameResult<()> {
        let mut shoe = self.fresh_shoe()?;
        while self.dealer_should_hit(&round.dealer_hand) {
            round.push_dealer_card(Self::draw(&mut shoe)?);
        }

        let outcome = if round.dealer_total > 21 {
            RoundStatus::DealerBust
        } else if round.player_total > round.dealer_total {
            RoundStatus::PlayerWin
        } else if round.dealer_total > round.player_total {
            RoundStatus::DealerWin
        } else {
            RoundStatus::Push
        };
        round.transition(outcome)?;
        Ok(())
    }

    /// Credit the payout of a terminal round and attach its fairness receipt
    fn settle(&self, txn: &mut LedgerTxn<'_>, round: &mut BlackjackRound) -> GameResult<()> {
        let Some(payout) = round.payout else {
            return Err(InvalidOperation::IllegalAction("round has no payout".to_string()).into());
        };
        txn.credit(round.bet_id, payout)?;
        round.fairness = self.fairness.stage_receipt(txn)?;

        tracing::debug!(
            round_id = %round.id,
            user_id = round.user_id,
            status = %round.status,
            payout,
            "Blackjack round settled"
        );
        Ok(())
    }

    fn finish(&self, mut txn: LedgerTxn<'_>, round: BlackjackRound, snapshot: Vec<u8>) -> GameResult<RoundState> {
        game_store::stage_round(&mut txn, &round, Some(snapshot))?;
        let receipt = txn.commit()?;
        Ok(round.view(receipt.balance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FairnessConfig, WalletConfig};
    use crate::games::types::{Rank, Suit};
    use crate::games::GameError;
    use crate::rng::OsRandomSource;
    use crate::storage::MemoryStorage;
    use crate::wallet::LedgerError;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Hands out predefined shoes in order
    struct StackedShoes(Mutex<VecDeque<Vec<Card>>>);

    impl StackedShoes {
        fn new(shoes: Vec<Vec<Rank>>) -> Self {
            let shoes = shoes
                .into_iter()
                .map(|ranks| ranks.into_iter().map(|r| Card::new(r, Suit::Hearts)).collect())
                .collect();
            Self(Mutex::new(shoes))
        }
    }

    impl ShoeSource for StackedShoes {
        fn shuffled_shoe(&self, _deck_count: usize) -> Result<Shoe, EntropyError> {
            self.0
                .lock()
                .pop_front()
                .map(Shoe::new)
                .ok_or_else(|| EntropyError::ShuffleSourceUnavailable("no more shoes".to_string()))
        }
    }

    struct Table {
        engine: BlackjackEngine,
        ledger: Arc<WalletLedger>,
    }

    fn table(shoes: Vec<Vec<Rank>>, rules: BlackjackConfig) -> Table {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStorage::new());
        let ledger = Arc::new(WalletLedger::new(store.clone(), WalletConfig::default()));
        ledger.open_account(1).unwrap();
        ledger.add_funds(1, 1_000).unwrap();
        let fairness = Arc::new(FairnessService::new(
            store.clone(),
            Arc::new(OsRandomSource),
            FairnessConfig::default(),
        ));
        let engine = BlackjackEngine::new(
            store,
            ledger.clone(),
            Arc::new(StackedShoes::new(shoes)),
            fairness,
            rules,
        );
        Table { engine, ledger }
    }

    use Rank::*;

    #[test]
    fn test_transition_table() {
        let all = [
            RoundStatus::Active,
            RoundStatus::PlayerBlackjack,
            RoundStatus::PlayerBust,
            RoundStatus::DealerBust,
            RoundStatus::PlayerWin,
            RoundStatus::DealerWin,
            RoundStatus::Push,
            RoundStatus::Expired,
        ];
        for from in all {
            for to in all {
                let expected = from == RoundStatus::Active && to != RoundStatus::Active;
                assert_eq!(from.can_transition_to(to), expected, "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_payouts() {
        assert_eq!(RoundStatus::PlayerBlackjack.payout(100), 250);
        assert_eq!(RoundStatus::PlayerBlackjack.payout(5), 12);
        assert_eq!(RoundStatus::PlayerWin.payout(100), 200);
        assert_eq!(RoundStatus::DealerBust.payout(100), 200);
        assert_eq!(RoundStatus::Push.payout(100), 100);
        assert_eq!(RoundStatus::DealerWin.payout(100), 0);
        assert_eq!(RoundStatus::PlayerBust.payout(100), 0);
    }

    #[test]
    fn test_player_blackjack_pays_three_to_two() {
        // Deal order: player, dealer, player, dealer
        let t = table(vec![vec![Ace, Nine, King, Seven]], BlackjackConfig::default());
        let state = t.engine.initialize_game(1, 100).unwrap();

        assert_eq!(state.status, RoundStatus::PlayerBlackjack);
        assert_eq!(state.payout, Some(250));
        assert_eq!(state.dealer_hand.len(), 2);
        assert_eq!(state.balance, 1_150);
        assert!(state.fairness.is_some());
        assert_eq!(t.ledger.wager(state.bet_id).unwrap().unwrap().payout, Some(250));
    }

    #[test]
    fn test_each_settled_round_consumes_one_nonce() {
        let t = table(
            vec![vec![Ace, Nine, King, Seven], vec![Ten, Nine, Six, Seven], vec![Queen]],
            BlackjackConfig::default(),
        );
        let first = t.engine.initialize_game(1, 100).unwrap();
        assert_eq!(first.fairness.as_ref().unwrap().nonce, 0);

        let open = t.engine.initialize_game(1, 100).unwrap();
        assert_eq!(open.status, RoundStatus::Active);
        assert!(open.fairness.is_none());

        let settled = t.engine.hit(open.round_id, 1).unwrap();
        assert_eq!(settled.status, RoundStatus::PlayerBust);
        let receipt = settled.fairness.unwrap();
        assert_eq!(receipt.nonce, 1);
        assert_eq!(receipt.server_seed_hash, first.fairness.unwrap().server_seed_hash);
    }

    #[test]
    fn test_both_naturals_push() {
        let t = table(vec![vec![Ace, Ace, King, Queen]], BlackjackConfig::default());
        let state = t.engine.initialize_game(1, 100).unwrap();

        assert_eq!(state.status, RoundStatus::Push);
        assert_eq!(state.payout, Some(100));
        assert_eq!(state.balance, 1_000);
    }

    #[test]
    fn test_hole_card_hidden_while_active() {
        let t = table(vec![vec![Ten, Nine, Six, Seven]], BlackjackConfig::default());
        let state = t.engine.initialize_game(1, 100).unwrap();

        assert_eq!(state.status, RoundStatus::Active);
        assert_eq!(state.dealer_hand, vec![Card::new(Nine, Suit::Hearts)]);
        assert_eq!(state.dealer_total, 9);
        assert_eq!(state.player_total, 16);
        assert_eq!(state.balance, 900);
        assert!(state.can_double);
        assert_eq!(state.payout, None);
    }

    #[test]
    fn test_hit_to_bust() {
        let t = table(
            vec![vec![Ten, Nine, Six, Seven], vec![Queen]],
            BlackjackConfig::default(),
        );
        let dealt = t.engine.initialize_game(1, 100).unwrap();
        let state = t.engine.hit(dealt.round_id, 1).unwrap();

        assert_eq!(state.status, RoundStatus::PlayerBust);
        assert_eq!(state.payout, Some(0));
        assert_eq!(state.player_total, 26);
        assert_eq!(state.balance, 900);

        let again = t.engine.hit(dealt.round_id, 1).unwrap_err();
        assert!(matches!(
            again,
            GameError::InvalidOperation(InvalidOperation::RoundNotActive(_))
        ));
    }

    #[test]
    fn test_stand_dealer_draws_to_seventeen() {
        // Player 19, dealer 9+5 draws 2 then 4 to reach 20
        let t = table(
            vec![vec![Ten, Nine, Nine, Five], vec![Two, Four, King]],
            BlackjackConfig::default(),
        );
        let dealt = t.engine.initialize_game(1, 100).unwrap();
        let state = t.engine.stand(dealt.round_id, 1).unwrap();

        assert_eq!(state.dealer_total, 20);
        assert_eq!(state.dealer_hand.len(), 4);
        assert_eq!(state.status, RoundStatus::DealerWin);
        assert_eq!(state.balance, 900);
    }

    #[test]
    fn test_stand_dealer_bust_pays_double() {
        let t = table(
            vec![vec![Ten, Ten, Eight, Six], vec![King]],
            BlackjackConfig::default(),
        );
        let dealt = t.engine.initialize_game(1, 100).unwrap();
        let state = t.engine.stand(dealt.round_id, 1).unwrap();

        assert_eq!(state.status, RoundStatus::DealerBust);
        assert_eq!(state.payout, Some(200));
        assert_eq!(state.balance, 1_100);
    }

    #[test]
    fn test_stand_push_and_player_win() {
        let t = table(
            vec![vec![Ten, Ten, Eight, Eight], vec![]],
            BlackjackConfig::default(),
        );
        let dealt = t.engine.initialize_game(1, 100).unwrap();
        let state = t.engine.stand(dealt.round_id, 1).unwrap();
        assert_eq!(state.status, RoundStatus::Push);
        assert_eq!(state.balance, 1_000);

        let t = table(
            vec![vec![Ten, Ten, Ten, Seven], vec![]],
            BlackjackConfig::default(),
        );
        let dealt = t.engine.initialize_game(1, 100).unwrap();
        let state = t.engine.stand(dealt.round_id, 1).unwrap();
        assert_eq!(state.status, RoundStatus::PlayerWin);
        assert_eq!(state.balance, 1_100);
    }

    #[test]
    fn test_soft_seventeen_rule() {
        // Dealer A+6 is soft 17; player 18
        let shoes = || vec![vec![Ten, Ace, Eight, Six], vec![Two]];

        let stands = table(shoes(), BlackjackConfig::default());
        let dealt = stands.engine.initialize_game(1, 100).unwrap();
        let state = stands.engine.stand(dealt.round_id, 1).unwrap();
        assert_eq!(state.dealer_total, 17);
        assert_eq!(state.status, RoundStatus::PlayerWin);

        let hits = table(
            shoes(),
            BlackjackConfig {
                dealer_hits_soft_17: true,
                ..Default::default()
            },
        );
        let dealt = hits.engine.initialize_game(1, 100).unwrap();
        let state = hits.engine.stand(dealt.round_id, 1).unwrap();
        assert_eq!(state.dealer_total, 19);
        assert_eq!(state.status, RoundStatus::DealerWin);
    }

    #[test]
    fn test_double_down_doubles_stake_and_settles() {
        // Player 5+6=11 doubles into 21, dealer 10+7 stands
        let t = table(
            vec![vec![Five, Ten, Six, Seven], vec![King], vec![]],
            BlackjackConfig::default(),
        );
        let dealt = t.engine.initialize_game(1, 100).unwrap();
        let state = t.engine.double_down(dealt.round_id, 1).unwrap();

        assert_eq!(state.bet_amount, 200);
        assert_eq!(state.player_hand.len(), 3);
        assert_eq!(state.status, RoundStatus::PlayerWin);
        assert_eq!(state.payout, Some(400));
        assert_eq!(state.balance, 1_200);
        assert_eq!(t.ledger.wager(state.bet_id).unwrap().unwrap().amount, 200);
    }

    #[test]
    fn test_double_down_requires_two_cards() {
        let t = table(
            vec![vec![Two, Ten, Three, Seven], vec![Four]],
            BlackjackConfig::default(),
        );
        let dealt = t.engine.initialize_game(1, 100).unwrap();
        t.engine.hit(dealt.round_id, 1).unwrap();
        let err = t.engine.double_down(dealt.round_id, 1).unwrap_err();
        assert!(matches!(
            err,
            GameError::InvalidOperation(InvalidOperation::IllegalAction(_))
        ));
    }

    #[test]
    fn test_double_down_without_funds_changes_nothing() {
        let t = table(vec![vec![Five, Ten, Six, Seven]], BlackjackConfig::default());
        let dealt = t.engine.initialize_game(1, 600).unwrap();
        let err = t.engine.double_down(dealt.round_id, 1).unwrap_err();
        assert!(matches!(
            err,
            GameError::Ledger(LedgerError::InsufficientFunds { .. })
        ));

        let state = t.engine.state(dealt.round_id, 1).unwrap();
        assert_eq!(state.status, RoundStatus::Active);
        assert_eq!(state.bet_amount, 600);
        assert_eq!(state.balance, 400);
    }

    #[test]
    fn test_insufficient_funds_deals_nothing() {
        let t = table(vec![vec![Ten, Nine, Six, Seven]], BlackjackConfig::default());
        let err = t.engine.initialize_game(1, 5_000).unwrap_err();
        assert!(matches!(
            err,
            GameError::Ledger(LedgerError::InsufficientFunds {
                required: 5_000,
                available: 1_000
            })
        ));
        assert_eq!(t.ledger.get_balance(1).unwrap(), 1_000);
    }

    #[test]
    fn test_entropy_failure_aborts_debit() {
        let t = table(vec![], BlackjackConfig::default());
        let err = t.engine.initialize_game(1, 100).unwrap_err();
        assert!(matches!(err, GameError::ShuffleSourceUnavailable(_)));
        assert_eq!(t.ledger.get_balance(1).unwrap(), 1_000);
        assert_eq!(t.ledger.transactions(1, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_other_user_cannot_act() {
        let t = table(vec![vec![Ten, Nine, Six, Seven]], BlackjackConfig::default());
        t.ledger.open_account(2).unwrap();
        let dealt = t.engine.initialize_game(1, 100).unwrap();

        let err = t.engine.stand(dealt.round_id, 2).unwrap_err();
        assert!(matches!(
            err,
            GameError::InvalidOperation(InvalidOperation::NotOwned { .. })
        ));
        let err = t.engine.hit(Uuid::new_v4(), 1).unwrap_err();
        assert!(matches!(
            err,
            GameError::InvalidOperation(InvalidOperation::RoundNotFound(_))
        ));
    }

    #[test]
    fn test_expire_refunds_active_round_once() {
        let t = table(vec![vec![Ten, Nine, Six, Seven]], BlackjackConfig::default());
        let dealt = t.engine.initialize_game(1, 100).unwrap();

        let past = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(t.engine.expire(dealt.round_id, 1, past).unwrap(), None);

        let future = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(t.engine.expire(dealt.round_id, 1, future).unwrap(), Some(100));
        assert_eq!(t.engine.expire(dealt.round_id, 1, future).unwrap(), None);

        let state = t.engine.state(dealt.round_id, 1).unwrap();
        assert_eq!(state.status, RoundStatus::Expired);
        assert_eq!(state.balance, 1_000);
    }
}
