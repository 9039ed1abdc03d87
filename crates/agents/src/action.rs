use std::sync::Arc;

use cardassist_core::{extract_card_number, CardOutcome};
use cardassist_storage::CardRegistry;
use tracing::{info, instrument};

/// Card activation/deactivation driven by free text.
#[derive(Debug, Clone)]
pub struct ActionAgent {
    registry: Arc<CardRegistry>,
}

impl ActionAgent {
    pub fn new(registry: Arc<CardRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CardRegistry {
        &self.registry
    }

    #[instrument(skip_all)]
    pub fn activate_from_text(&self, text: &str) -> CardOutcome {
        let outcome = match extract_card_number(text) {
            Some(card_number) => self.registry.activate(&card_number),
            None => CardOutcome::NoIdentifierFound,
        };
        info!(outcome = ?outcome, "activation handled");
        outcome
    }

    #[instrument(skip_all)]
    pub fn deactivate_from_text(&self, text: &str) -> CardOutcome {
        let outcome = match extract_card_number(text) {
            Some(card_number) => self.registry.deactivate(&card_number),
            None => CardOutcome::NoIdentifierFound,
        };
        info!(outcome = ?outcome, "deactivation handled");
        outcome
    }
}
