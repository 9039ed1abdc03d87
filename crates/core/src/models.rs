use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::is_valid_card_number;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Activate,
    Deactivate,
    Knowledge,
}

impl Intent {
    pub const ALL: [Intent; 3] = [Self::Activate, Self::Deactivate, Self::Knowledge];

    /// Exact match against the classifier vocabulary. Callers lowercase first.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "activate" => Some(Self::Activate),
            "deactivate" => Some(Self::Deactivate),
            "knowledge" => Some(Self::Knowledge),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
            Self::Knowledge => "knowledge",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 9-digit card number. Only constructible from a string that passes
/// [`is_valid_card_number`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardIdentifier(String);

impl CardIdentifier {
    pub fn parse(value: &str) -> Option<Self> {
        is_valid_card_number(value).then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardAction {
    Activate,
    Deactivate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "card", rename_all = "snake_case")]
pub enum CardOutcome {
    Activated(CardIdentifier),
    AlreadyActive(CardIdentifier),
    Deactivated(CardIdentifier),
    NotActive(CardIdentifier),
    InvalidFormat(CardAction),
    NoIdentifierFound,
}

impl CardOutcome {
    pub fn message(&self) -> String {
        match self {
            Self::Activated(card) => format!("Card {card} has been successfully activated."),
            Self::AlreadyActive(card) => format!("Card {card} is already activated."),
            Self::Deactivated(card) => format!("Card {card} has been successfully deactivated."),
            Self::NotActive(card) => format!("Card {card} is not currently active."),
            Self::InvalidFormat(CardAction::Activate) => {
                "Invalid card number. Activation failed.".to_string()
            }
            Self::InvalidFormat(CardAction::Deactivate) => {
                "Invalid card number. Deactivation failed.".to_string()
            }
            Self::NoIdentifierFound => {
                "Error: No valid 9-digit card number found in the input.".to_string()
            }
        }
    }

    pub fn changed_registry(&self) -> bool {
        matches!(self, Self::Activated(_) | Self::Deactivated(_))
    }
}

impl fmt::Display for CardOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub raw_response: String,
    pub parsed_answer: Option<String>,
    pub intent: Intent,
    /// Set when the answer line was missing or named an unknown intent.
    pub defaulted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutedReply {
    pub intent: Intent,
    pub classification: ClassificationResult,
    pub reply_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDoc {
    pub id: String,
    pub title: String,
    pub source_path: String,
    pub start_page: Option<usize>,
    pub end_page: Option<usize>,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub title: String,
    pub text: String,
    pub snippet: String,
    pub score: f32,
    pub source_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub at: DateTime<Utc>,
    pub user_text: String,
    pub assistant_text: String,
    pub intent: Option<Intent>,
    pub failed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub turns: Vec<ConversationTurn>,
}
