//! Blackjack hand valuation

use crate::games::types::Card;

/// Best total for a hand.
///
/// Aces start at 11 and are demoted to 1, one at a time, while the hand is
/// over 21. Always recomputed from the full card list.
pub fn hand_total(cards: &[Card]) -> u32 {
    let mut total = 0;
    let mut soft_aces = 0;

    for card in cards {
        total += card.numeric_value();
        if card.is_ace() {
            soft_aces += 1;
        }
    }

    while total > 21 && soft_aces > 0 {
        total -= 10;
        soft_aces -= 1;
    }

    total
}

/// True when at least one Ace is still counted as 11 in the best total
pub fn is_soft(cards: &[Card]) -> bool {
    let hard: u32 = cards
        .iter()
        .map(|c| if c.is_ace() { 1 } else { c.numeric_value() })
        .sum();
    cards.iter().any(Card::is_ace) && hard + 10 == hand_total(cards)
}

pub fn is_bust(cards: &[Card]) -> bool {
    hand_total(cards) > 21
}

/// Two-card 21
pub fn is_natural(cards: &[Card]) -> bool {
    cards.len() == 2 && hand_total(cards) == 21
}
