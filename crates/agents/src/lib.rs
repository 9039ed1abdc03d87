mod action;
mod knowledge;
mod router;

use std::sync::Arc;

use cardassist_llm::TextGenerator;
use cardassist_observability::AppMetrics;
use cardassist_retrieval::Retriever;
use cardassist_storage::CardRegistry;

pub use action::ActionAgent;
pub use knowledge::{grounding_prompt, KnowledgeAnswerer, NO_INFORMATION_REPLY};
pub use router::IntentRouter;

/// Wires the three agents around one generator. The registry is passed in so
/// its lifetime stays with the caller (process, session or test).
pub fn assemble_router(
    generator: Arc<dyn TextGenerator>,
    registry: Arc<CardRegistry>,
    retriever: Arc<dyn Retriever>,
    metrics: Arc<AppMetrics>,
) -> IntentRouter {
    let actions = ActionAgent::new(registry);
    let knowledge = KnowledgeAnswerer::new(retriever, generator.clone(), metrics.clone());
    IntentRouter::new(generator, actions, knowledge, metrics)
}
