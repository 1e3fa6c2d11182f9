//! End-to-end flows through the `Casino` facade: funds, blackjack with a
//! stacked shoe, provably-fair roulette, seed reveal and orphan recovery.

use fairplay::{
    config::{CasinoConfig, OutcomeSource},
    errors::EntropyError,
    games::{
        BetKind, Card, GameError, ProvablyFairVerifier, Rank, RouletteBet, RoundStatus, Shoe, ShoeSource, Suit,
    },
    rng::OsRandomSource,
    session::TtlSessionStore,
    storage::MemoryStorage,
    wallet::{LedgerError, TransactionType},
    Casino,
};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Hands out predefined shoes in order, then falls back to fresh decks
struct StackedShoes(Mutex<VecDeque<Vec<Rank>>>);

impl ShoeSource for StackedShoes {
    fn shuffled_shoe(&self, _deck_count: usize) -> Result<Shoe, EntropyError> {
        let ranks = self
            .0
            .lock()
            .pop_front()
            .ok_or_else(|| EntropyError::ShuffleSourceUnavailable("stack exhausted".to_string()))?;
        Ok(Shoe::new(ranks.into_iter().map(|r| Card::new(r, Suit::Spades)).collect()))
    }
}

fn casino(config: CasinoConfig, shoes: Vec<Vec<Rank>>) -> Casino {
    let ttl = config.session_ttl();
    Casino::with_components(
        config,
        Arc::new(MemoryStorage::new()),
        Arc::new(OsRandomSource),
        Arc::new(StackedShoes(Mutex::new(shoes.into()))),
        Arc::new(TtlSessionStore::new(ttl)),
    )
    .unwrap()
}

fn funded(casino: &Casino, user_id: u64, amount: u64) {
    let ledger = casino.ledger();
    ledger.open_account(user_id).unwrap();
    ledger.add_funds(user_id, amount).unwrap();
}

use Rank::*;

#[test]
fn test_blackjack_double_down_win() {
    // Player 6+5 doubles onto a Ten; dealer 9+8 stands on 17
    let casino = casino(
        CasinoConfig::testing(),
        vec![vec![Six, Nine, Five, Eight], vec![Ten], vec![]],
    );
    funded(&casino, 1, 1_000);

    let dealt = casino.deal(1, 100).unwrap();
    assert_eq!(dealt.status, RoundStatus::Active);
    assert!(dealt.can_double);
    assert_eq!(dealt.balance, 900);

    let state = casino.double_down(dealt.round_id, 1).unwrap();
    assert_eq!(state.player_total, 21);
    assert_eq!(state.dealer_total, 17);
    assert_eq!(state.status, RoundStatus::PlayerWin);
    assert_eq!(state.bet_amount, 200);
    assert_eq!(state.payout, Some(400));
    assert_eq!(state.balance, 1_200);

    let history = casino.ledger().transactions(1, 10).unwrap();
    let kinds: Vec<_> = history.iter().map(|t| t.tx_type).collect();
    assert_eq!(
        kinds,
        vec![
            TransactionType::Payout,
            TransactionType::Bet,
            TransactionType::Bet,
            TransactionType::Deposit
        ]
    );
    assert_eq!(history[0].balance_after, 1_200);
}

#[test]
fn test_blackjack_rejects_bet_over_balance() {
    let casino = casino(CasinoConfig::testing(), vec![]);
    funded(&casino, 2, 50);

    let err = casino.deal(2, 100).unwrap_err();
    assert!(matches!(
        err,
        GameError::Ledger(LedgerError::InsufficientFunds {
            required: 100,
            available: 50
        })
    ));
    assert_eq!(casino.ledger().get_balance(2).unwrap(), 50);
}

#[test]
fn test_shoe_failure_leaves_no_trace() {
    let casino = casino(CasinoConfig::testing(), vec![]);
    funded(&casino, 3, 500);

    let err = casino.deal(3, 100).unwrap_err();
    assert!(matches!(err, GameError::ShuffleSourceUnavailable(_)));
    assert_eq!(casino.ledger().get_balance(3).unwrap(), 500);
    assert_eq!(casino.ledger().transactions(3, 10).unwrap().len(), 1);
}

#[test]
fn test_provably_fair_roulette_is_reproducible() {
    let mut config = CasinoConfig::testing();
    config.roulette.outcome_source = OutcomeSource::ProvablyFair;
    let casino = casino(config, vec![]);
    funded(&casino, 4, 10_000);

    let commitment = casino.fairness().commitment(4).unwrap();
    let bets = [
        RouletteBet::new(BetKind::Straight(17), 10),
        RouletteBet::new(BetKind::Red, 100),
    ];
    let first = casino.spin(4, &bets).unwrap();
    let second = casino.spin(4, &bets).unwrap();

    let receipts = [first.fairness.clone().unwrap(), second.fairness.clone().unwrap()];
    assert_eq!(receipts[0].nonce, 0);
    assert_eq!(receipts[1].nonce, 1);
    assert_eq!(receipts[0].server_seed_hash, commitment.server_seed_hash);

    let rotation = casino.fairness().rotate(4).unwrap();
    assert_eq!(rotation.revealed.nonces_used, 2);
    assert!(ProvablyFairVerifier::commitment_matches(
        &rotation.revealed.server_seed,
        &commitment.server_seed_hash
    ));

    for (spin, receipt) in [&first, &second].into_iter().zip(&receipts) {
        assert!(ProvablyFairVerifier::verify(
            &rotation.revealed.server_seed,
            &receipt.client_seed,
            receipt.nonce,
            &receipt.result_hash
        ));
        let number = ProvablyFairVerifier::hash_to_number(&receipt.result_hash, 37).unwrap();
        assert_eq!(number as u8, spin.winning_number);
    }

    let expected = 10_000 - 220 + first.total_payout + second.total_payout;
    assert_eq!(casino.ledger().get_balance(4).unwrap(), expected);
}

#[test]
fn test_orphaned_round_refunded_by_reconcile() {
    let mut config = CasinoConfig::testing();
    config.reconciliation.orphan_timeout_secs = 1;
    let casino = casino(config, vec![vec![Ten, Nine, Six, Seven]]);
    funded(&casino, 5, 1_000);

    let dealt = casino.deal(5, 100).unwrap();
    assert_eq!(dealt.status, RoundStatus::Active);
    assert!(casino.reconcile().unwrap().refunded.is_empty());

    let report = casino.reconcile_at(Utc::now() + chrono::Duration::seconds(5)).unwrap();
    assert_eq!(report.refunded.len(), 1);
    assert_eq!(report.refunded[0].amount, 100);
    assert_eq!(casino.ledger().get_balance(5).unwrap(), 1_000);

    let state = casino.blackjack().state(dealt.round_id, 5).unwrap();
    assert_eq!(state.status, RoundStatus::Expired);
    assert!(casino.stand(dealt.round_id, 5).is_err());

    let newest = &casino.ledger().transactions(5, 1).unwrap()[0];
    assert_eq!(newest.tx_type, TransactionType::Refund);
    assert_eq!(newest.related_bet_id, Some(dealt.bet_id));
}

#[test]
fn test_sessions_follow_play() {
    let casino = casino(CasinoConfig::testing(), vec![vec![Ten, Nine, Ten, Seven], vec![Two]]);
    funded(&casino, 6, 1_000);

    let dealt = casino.deal(6, 100).unwrap();
    casino.stand(dealt.round_id, 6).unwrap();

    let session = casino.sessions().for_user(6).unwrap();
    assert_eq!(session.rounds, 2);
    assert!(casino.sessions().for_user(7).is_none());
}
