use std::sync::Arc;
use std::time::Instant;

use cardassist_core::{
    build_classification_prompt, classify_response, ClassificationResult, GenerationError,
    Intent, RoutedReply, RouterError,
};
use cardassist_llm::TextGenerator;
use cardassist_observability::AppMetrics;
use tracing::{error, info, instrument, warn};

use crate::action::ActionAgent;
use crate::knowledge::KnowledgeAnswerer;

/// Single decision point: classify a message with one generation call, then
/// hand the raw message to exactly one handler.
///
/// Calls share no state beyond the injected collaborators. Unparseable or
/// unknown classifications fall back to [`Intent::Knowledge`] so an unreliable
/// classifier never mutates a card. Generation failures are returned to the
/// caller untouched.
#[derive(Clone)]
pub struct IntentRouter {
    generator: Arc<dyn TextGenerator>,
    actions: ActionAgent,
    knowledge: KnowledgeAnswerer,
    metrics: Arc<AppMetrics>,
}

impl IntentRouter {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        actions: ActionAgent,
        knowledge: KnowledgeAnswerer,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            generator,
            actions,
            knowledge,
            metrics,
        }
    }

    pub fn actions(&self) -> &ActionAgent {
        &self.actions
    }

    pub fn metrics(&self) -> &Arc<AppMetrics> {
        &self.metrics
    }

    /// Classifies without dispatching.
    #[instrument(skip_all, fields(model = %self.generator.model_name()))]
    pub async fn classify(&self, text: &str) -> Result<ClassificationResult, GenerationError> {
        let raw = self
            .generator
            .generate(&build_classification_prompt(text))
            .await?;
        let classification = classify_response(raw);

        if classification.defaulted {
            self.metrics.inc_classification_fallback();
            warn!(
                parsed_answer = ?classification.parsed_answer,
                "classification unusable, defaulting to knowledge"
            );
        }

        Ok(classification)
    }

    /// Returns the handler's reply verbatim.
    pub async fn decide_and_execute(&self, text: &str) -> Result<String, RouterError> {
        self.route(text).await.map(|routed| routed.reply_text)
    }

    #[instrument(skip_all, fields(input_chars = text.len()))]
    pub async fn route(&self, text: &str) -> Result<RoutedReply, RouterError> {
        let started = Instant::now();
        self.metrics.inc_request();

        let result = self.classify_and_dispatch(text).await;

        self.metrics.observe_latency(started.elapsed());
        if let Err(err) = &result {
            self.metrics.inc_generation_failure();
            error!(error = %err, "routing failed");
        }
        result
    }

    async fn classify_and_dispatch(&self, text: &str) -> Result<RoutedReply, RouterError> {
        let classification = self
            .classify(text)
            .await
            .map_err(RouterError::Classification)?;
        let intent = classification.intent;
        info!(
            intent = %intent,
            defaulted = classification.defaulted,
            "intent resolved"
        );

        self.metrics.inc_dispatch(intent);
        let reply_text = self.dispatch(intent, text).await?;

        Ok(RoutedReply {
            intent,
            classification,
            reply_text,
        })
    }

    async fn dispatch(&self, intent: Intent, text: &str) -> Result<String, RouterError> {
        match intent {
            Intent::Activate => Ok(self.actions.activate_from_text(text).message()),
            Intent::Deactivate => Ok(self.actions.deactivate_from_text(text).message()),
            Intent::Knowledge => self
                .knowledge
                .answer(text)
                .await
                .map_err(RouterError::Knowledge),
        }
    }
}

#[cfg(test)]
mod tests {
    use cardassist_llm::ScriptedGenerator;
    use cardassist_retrieval::Retriever;
    use cardassist_storage::CardRegistry;
    use parking_lot::Mutex;

    use super::*;
    use crate::{assemble_router, NO_INFORMATION_REPLY};

    #[derive(Default)]
    struct RecordingRetriever {
        passages: String,
        queries: Mutex<Vec<String>>,
    }

    impl Retriever for RecordingRetriever {
        fn search(&self, query: &str) -> String {
            self.queries.lock().push(query.to_string());
            self.passages.clone()
        }
    }

    struct Harness {
        router: IntentRouter,
        generator: Arc<ScriptedGenerator>,
        registry: Arc<CardRegistry>,
        retriever: Arc<RecordingRetriever>,
        metrics: Arc<AppMetrics>,
    }

    fn harness(passages: &str) -> Harness {
        let generator = Arc::new(ScriptedGenerator::new());
        let registry = Arc::new(CardRegistry::new());
        let retriever = Arc::new(RecordingRetriever {
            passages: passages.to_string(),
            ..RecordingRetriever::default()
        });
        let metrics = AppMetrics::shared();
        let router = assemble_router(
            generator.clone(),
            registry.clone(),
            retriever.clone(),
            metrics.clone(),
        );
        Harness {
            router,
            generator,
            registry,
            retriever,
            metrics,
        }
    }

    const ACTIVATE_REPLY: &str =
        "Thought: the user wants a card switched on\nAction: CLASSIFY_INTENT[activate]\nAnswer: activate";

    #[tokio::test]
    async fn activate_answer_dispatches_to_activation() {
        let h = harness("");
        h.generator.push_reply(ACTIVATE_REPLY);

        let reply = h
            .router
            .decide_and_execute("activate card 123456789")
            .await
            .unwrap();

        assert_eq!(reply, "Card 123456789 has been successfully activated.");
        assert!(h.registry.is_active("123456789"));
        assert_eq!(h.generator.calls(), 1);
        assert!(h.retriever.queries.lock().is_empty());
    }

    #[tokio::test]
    async fn repeated_activation_reports_already_active() {
        let h = harness("");
        h.generator.push_reply(ACTIVATE_REPLY);
        h.generator.push_reply("Answer: activate");
        let input = "Please activate card number 123456789 for me";

        let first = h.router.decide_and_execute(input).await.unwrap();
        let second = h.router.decide_and_execute(input).await.unwrap();

        assert_eq!(first, "Card 123456789 has been successfully activated.");
        assert_eq!(second, "Card 123456789 is already activated.");
        assert_eq!(h.registry.len(), 1);
    }

    #[tokio::test]
    async fn deactivate_answer_dispatches_to_deactivation() {
        let h = harness("");
        h.registry.activate("987654321");
        h.generator
            .push_reply("Thought: block it\nAction: CLASSIFY_INTENT[deactivate]\nAnswer: deactivate");

        let routed = h
            .router
            .route("please deactivate 987654321, it was stolen")
            .await
            .unwrap();

        assert_eq!(routed.intent, Intent::Deactivate);
        assert_eq!(
            routed.reply_text,
            "Card 987654321 has been successfully deactivated."
        );
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn unparseable_classification_defaults_to_knowledge() {
        let h = harness("Activation  Call the number on the sticker.\n");
        h.generator
            .push_reply("I believe the user wants to activate 123456789.");
        h.generator.push_reply("Call the number on the sticker.");

        let routed = h
            .router
            .route("activate 123456789 how?")
            .await
            .unwrap();

        assert_eq!(routed.intent, Intent::Knowledge);
        assert!(routed.classification.defaulted);
        assert_eq!(routed.reply_text, "Call the number on the sticker.");
        assert!(h.registry.is_empty());
        assert_eq!(
            *h.retriever.queries.lock(),
            vec!["activate 123456789 how?".to_string()]
        );
        assert_eq!(h.metrics.snapshot().classification_fallback_total, 1);
    }

    #[tokio::test]
    async fn unknown_intent_defaults_to_knowledge() {
        let h = harness("");
        h.generator.push_reply("Answer: block_card");

        let routed = h.router.route("block 123456789").await.unwrap();

        assert_eq!(routed.intent, Intent::Knowledge);
        assert_eq!(routed.classification.parsed_answer.as_deref(), Some("block_card"));
        assert_eq!(routed.reply_text, NO_INFORMATION_REPLY);
        assert!(h.registry.is_empty());
        assert_eq!(h.generator.calls(), 1);
    }

    #[tokio::test]
    async fn last_answer_line_decides_dispatch() {
        let h = harness("");
        h.generator.push_reply(
            "Thought: my first answer: activate seemed right\nAnswer: activate\nThought: no, they want it off\nAnswer: deactivate",
        );

        let reply = h.router.decide_and_execute("stop card 555666777").await.unwrap();

        assert_eq!(reply, "Card 555666777 is not currently active.");
    }

    #[tokio::test]
    async fn classification_failure_propagates_without_side_effects() {
        let h = harness("Fees  none\n");
        h.generator
            .push_error(GenerationError::Transport("timed out".to_string()));

        let err = h
            .router
            .decide_and_execute("activate 123456789")
            .await
            .unwrap_err();

        assert_eq!(
            err,
            RouterError::Classification(GenerationError::Transport("timed out".to_string()))
        );
        assert!(h.registry.is_empty());
        assert!(h.retriever.queries.lock().is_empty());
        assert_eq!(h.metrics.snapshot().generation_failures_total, 1);
    }

    #[tokio::test]
    async fn knowledge_generation_failure_is_tagged() {
        let h = harness("Fees  3 percent abroad\n");
        h.generator.push_reply("Answer: knowledge");
        h.generator.push_error(GenerationError::Status {
            status: 500,
            body: "boom".to_string(),
        });

        let err = h.router.decide_and_execute("what are the fees").await.unwrap_err();

        assert!(matches!(err, RouterError::Knowledge(GenerationError::Status { status: 500, .. })));
    }

    #[tokio::test]
    async fn classification_prompt_embeds_user_input() {
        let h = harness("");
        h.generator.push_reply("Answer: knowledge");

        h.router.decide_and_execute("what is a PIN?").await.unwrap();

        let prompts = h.generator.prompts();
        assert!(prompts[0].contains("User Input: \"what is a PIN?\""));
        assert!(prompts[0].contains("CLASSIFY_INTENT[activate/deactivate/knowledge]"));
    }
}
