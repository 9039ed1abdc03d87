//! Text-generation collaborator used for intent classification and
//! knowledge answers.

mod client;
mod config;
mod scripted;

use async_trait::async_trait;

pub use cardassist_core::GenerationError;
pub use client::ChatCompletionsClient;
pub use config::GenerationConfig;
pub use scripted::ScriptedGenerator;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn model_name(&self) -> &str;

    /// One completion for `prompt`, trimmed. No retries are attempted.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}
