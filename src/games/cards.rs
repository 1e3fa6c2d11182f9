//! Deck construction and shuffling

use crate::errors::EntropyError;
use crate::games::types::{Card, Rank, Suit};
use crate::rng::RandomSource;
use std::sync::Arc;

pub const CARDS_PER_DECK: usize = 52;

/// Supplies freshly shuffled shoes to the blackjack engine
pub trait ShoeSource: Send + Sync {
    fn shuffled_shoe(&self, deck_count: usize) -> Result<Shoe, EntropyError>;
}

/// Builds standard decks and shuffles them with Fisher-Yates
#[derive(Clone)]
pub struct CardDeck {
    rng: Arc<dyn RandomSource>,
}

impl CardDeck {
    pub fn new(rng: Arc<dyn RandomSource>) -> Self {
        Self { rng }
    }

    /// `count` x 52 cards, unshuffled
    pub fn build_decks(count: usize) -> Vec<Card> {
        let mut cards = Vec::with_capacity(count * CARDS_PER_DECK);
        for _ in 0..count {
            for suit in Suit::ALL {
                for rank in Rank::ALL {
                    cards.push(Card::new(rank, suit));
                }
            }
        }
        cards
    }

    /// In-place Fisher-Yates: for i from len-1 down to 1, swap i with a
    /// uniform j in [0, i].
    pub fn shuffle(&self, cards: &mut [Card]) -> Result<(), EntropyError> {
        for i in (1..cards.len()).rev() {
            let j = self.rng.next_int(0, i as u64 + 1)? as usize;
            cards.swap(i, j);
        }
        Ok(())
    }
}

impl ShoeSource for CardDeck {
    fn shuffled_shoe(&self, deck_count: usize) -> Result<Shoe, EntropyError> {
        let mut cards = Self::build_decks(deck_count);
        self.shuffle(&mut cards)?;
        Ok(Shoe::new(cards))
    }
}

/// Cards dealt from the front, in order
#[derive(Debug, Clone)]
pub struct Shoe {
    cards: Vec<Card>,
    position: usize,
}

impl Shoe {
    pub fn new(cards: Vec<Card>) -> Self {
        Self { cards, position: 0 }
    }

    pub fn draw(&mut self) -> Option<Card> {
        let card = self.cards.get(self.position).copied()?;
        self.position += 1;
        Some(card)
    }

    pub fn remaining(&self) -> usize {
        self.cards.len() - self.position
    }
}
