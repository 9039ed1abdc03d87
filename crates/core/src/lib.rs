pub mod error;
pub mod extract;
pub mod intent;
pub mod models;
pub mod validation;

pub use error::{GenerationError, RouterError};
pub use extract::extract_card_number;
pub use intent::{
    build_classification_prompt, classify_response, normalize_text, parse_intent_answer,
};
pub use models::*;
pub use validation::is_valid_card_number;
