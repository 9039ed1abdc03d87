use std::sync::Arc;

use cardassist_core::GenerationError;
use cardassist_llm::TextGenerator;
use cardassist_observability::AppMetrics;
use cardassist_retrieval::Retriever;
use tracing::{info, instrument};

pub const NO_INFORMATION_REPLY: &str =
    "I'm sorry, I couldn't find information related to your question.";

/// Answers questions from retrieved guide passages.
#[derive(Clone)]
pub struct KnowledgeAnswerer {
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn TextGenerator>,
    metrics: Arc<AppMetrics>,
}

impl KnowledgeAnswerer {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn TextGenerator>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            retriever,
            generator,
            metrics,
        }
    }

    /// Empty retrieval short-circuits to [`NO_INFORMATION_REPLY`] without a
    /// generation call.
    #[instrument(skip_all)]
    pub async fn answer(&self, question: &str) -> Result<String, GenerationError> {
        let context = self.retriever.search(question);
        if context.trim().is_empty() {
            self.metrics.inc_knowledge_not_found();
            info!("no passages retrieved");
            return Ok(NO_INFORMATION_REPLY.to_string());
        }

        let passages = context.lines().filter(|line| !line.trim().is_empty()).count();
        self.metrics.add_retrieval_hits(passages);
        info!(passages, "answering from retrieved passages");

        let answer = self
            .generator
            .generate(&grounding_prompt(&context, question))
            .await?;
        Ok(answer.trim().to_string())
    }
}

pub fn grounding_prompt(context: &str, question: &str) -> String {
    format!(
        "Use the following information from the card user guide to answer the question:\n\n{}\n\nQuestion: {}\nAnswer:",
        context.trim_end(),
        question
    )
}
