//! Balanced stimulus deck.
//!
//! The deck holds `Q` threat and `Q` non-threat cards per race, drawn from the asset
//! pool with repetition when the pool has fewer variants than the quota, or
//! synthesized when there is no pool at all. Order is a Fisher–Yates shuffle.
//! Drawing past the end synthesizes an ad hoc card so a session never stalls.

use rand::RngCore;
#[cfg(test)]
use std::collections::VecDeque;

use crate::logging::{log, obj, v_int, Domain, Level};
use crate::stimulus::{
    Card, HeldObject, Race, StimulusAttributes, ATTIRES, GENDERS, NON_THREAT_OBJECTS, RACES,
    THREAT_OBJECTS,
};

pub const DEFAULT_QUOTA: usize = 5;

// =============================================================================
// Random source
// =============================================================================

/// Source of uniform indices. Injected everywhere the engine needs randomness.
pub trait RandomSource {
    /// Uniform index in `0..bound`. `bound` is always > 0.
    fn below(&mut self, bound: usize) -> usize;

    fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T
    where
        Self: Sized,
    {
        &items[self.below(items.len())]
    }

    fn coin(&mut self) -> bool
    where
        Self: Sized,
    {
        self.below(2) == 1
    }
}

/// Adapter for any `rand` generator.
#[derive(Debug, Clone)]
pub struct RngSource<R>(pub R);

impl<R: RngCore> RandomSource for RngSource<R> {
    fn below(&mut self, bound: usize) -> usize {
        use rand::Rng;
        self.0.gen_range(0..bound)
    }
}

/// Replays a fixed script of indices, each reduced modulo the requested bound.
/// Test builds only.
///
/// # Panics
///
/// `below` panics when the script runs out, so tests notice unexpected draws.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct SequenceSource {
    script: VecDeque<usize>,
}

#[cfg(test)]
impl SequenceSource {
    pub fn new(script: impl IntoIterator<Item = usize>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

#[cfg(test)]
impl RandomSource for SequenceSource {
    fn below(&mut self, bound: usize) -> usize {
        match self.script.pop_front() {
            Some(v) => v % bound,
            None => panic!("SequenceSource exhausted"),
        }
    }
}

// =============================================================================
// Construction
// =============================================================================

/// In-place Fisher–Yates shuffle.
pub fn shuffle<T, S: RandomSource>(items: &mut [T], source: &mut S) {
    for i in (1..items.len()).rev() {
        let j = source.below(i + 1);
        items.swap(i, j);
    }
}

/// Mints ids for synthesized cards.
#[derive(Debug, Clone, Default)]
pub struct VirtualMint {
    next: u64,
}

impl VirtualMint {
    pub fn card<S: RandomSource>(&mut self, race: Race, threat: bool, source: &mut S) -> Card {
        let gender = *source.pick(&GENDERS);
        let attire = *source.pick(&ATTIRES);
        let objects: &[HeldObject] = if threat { &THREAT_OBJECTS } else { &NON_THREAT_OBJECTS };
        let object = *source.pick(objects);
        self.next += 1;
        Card::new(
            format!("virt-{}", self.next),
            StimulusAttributes::new(race, gender, attire, object),
            None,
        )
    }

    pub fn ad_hoc<S: RandomSource>(&mut self, source: &mut S) -> Card {
        let race = *source.pick(&RACES);
        let threat = source.coin();
        self.card(race, threat, source)
    }
}

/// Build the quota-balanced, unshuffled card list.
pub fn balanced_cards<S: RandomSource>(
    pool: &[Card],
    quota: usize,
    mint: &mut VirtualMint,
    source: &mut S,
) -> Vec<Card> {
    let mut cards = Vec::with_capacity(RACES.len() * 2 * quota);

    if pool.is_empty() {
        for race in RACES {
            for _ in 0..quota {
                cards.push(mint.card(race, true, source));
                cards.push(mint.card(race, false, source));
            }
        }
        return cards;
    }

    for race in RACES {
        let (threat, safe): (Vec<&Card>, Vec<&Card>) = pool
            .iter()
            .filter(|c| c.attributes.race() == race)
            .partition(|c| c.attributes.is_threat());

        for i in 0..quota {
            if !threat.is_empty() {
                cards.push(threat[i % threat.len()].clone());
            }
            if !safe.is_empty() {
                cards.push(safe[i % safe.len()].clone());
            }
        }
    }
    cards
}

// =============================================================================
// Deck
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct Deck {
    cards: Vec<Card>,
    cursor: usize,
    mint: VirtualMint,
    underruns: u64,
}

impl Deck {
    /// Balanced, shuffled deck from `pool`.
    pub fn balanced<S: RandomSource>(pool: &[Card], quota: usize, source: &mut S) -> Self {
        let mut mint = VirtualMint::default();
        let mut cards = balanced_cards(pool, quota, &mut mint, source);
        shuffle(&mut cards, source);

        log(
            Level::Info,
            Domain::Deck,
            "deck.built",
            obj(&[
                ("cards", v_int(cards.len() as i64)),
                ("pool", v_int(pool.len() as i64)),
                ("quota", v_int(quota as i64)),
                ("synthetic", serde_json::Value::Bool(pool.is_empty())),
            ]),
        );

        Self {
            cards,
            cursor: 0,
            mint,
            underruns: 0,
        }
    }

    /// Deck in exactly the given order.
    pub fn from_cards(cards: Vec<Card>) -> Self {
        Self {
            cards,
            ..Default::default()
        }
    }

    pub fn draw<S: RandomSource>(&mut self, source: &mut S) -> Card {
        if let Some(card) = self.cards.get(self.cursor) {
            self.cursor += 1;
            return card.clone();
        }
        self.underruns += 1;
        let card = self.mint.ad_hoc(source);
        log(
            Level::Debug,
            Domain::Deck,
            "deck.underrun",
            obj(&[
                ("card_id", crate::logging::v_str(&card.id)),
                ("underruns", v_int(self.underruns as i64)),
            ]),
        );
        card
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn remaining(&self) -> usize {
        self.cards.len() - self.cursor
    }

    pub fn underruns(&self) -> u64 {
        self.underruns
    }
}
