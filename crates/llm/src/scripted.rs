use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cardassist_core::GenerationError;
use parking_lot::Mutex;

use crate::TextGenerator;

/// Generator replaying queued replies in order. Records every prompt it
/// receives; once the queue is drained it repeats the fallback reply, or fails
/// when none is set.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let generator = Self::new();
        for reply in replies {
            generator.push_reply(reply);
        }
        generator
    }

    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().push_back(Ok(reply.into()));
    }

    pub fn push_error(&self, error: GenerationError) {
        self.replies.lock().push_back(Err(error));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());

        let next = self.replies.lock().pop_front();
        match next {
            Some(reply) => reply.map(|text| text.trim().to_string()),
            None => self.fallback.clone().ok_or_else(|| {
                GenerationError::NotConfigured("scripted generator has no replies left".to_string())
            }),
        }
    }
}
