use std::collections::HashSet;

use cardassist_core::{CardAction, CardIdentifier, CardOutcome};
use parking_lot::Mutex;
use tracing::debug;

/// In-memory set of active cards.
///
/// Each operation validates first and then performs its membership check and
/// mutation under one lock, so concurrent callers never lose an update on the
/// same card.
#[derive(Debug, Default)]
pub struct CardRegistry {
    active: Mutex<HashSet<CardIdentifier>>,
}

impl CardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activate(&self, card_number: &str) -> CardOutcome {
        let Some(card) = CardIdentifier::parse(card_number) else {
            return CardOutcome::InvalidFormat(CardAction::Activate);
        };

        let mut active = self.active.lock();
        if active.contains(&card) {
            return CardOutcome::AlreadyActive(card);
        }
        active.insert(card.clone());
        debug!(card = %card, active = active.len(), "card activated");
        CardOutcome::Activated(card)
    }

    pub fn deactivate(&self, card_number: &str) -> CardOutcome {
        let Some(card) = CardIdentifier::parse(card_number) else {
            return CardOutcome::InvalidFormat(CardAction::Deactivate);
        };

        let mut active = self.active.lock();
        if !active.remove(&card) {
            return CardOutcome::NotActive(card);
        }
        debug!(card = %card, active = active.len(), "card deactivated");
        CardOutcome::Deactivated(card)
    }

    pub fn is_active(&self, card_number: &str) -> bool {
        CardIdentifier::parse(card_number)
            .map(|card| self.active.lock().contains(&card))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<CardIdentifier> {
        let mut cards = self.active.lock().iter().cloned().collect::<Vec<_>>();
        cards.sort();
        cards
    }
}
