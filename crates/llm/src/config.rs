use std::env;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama3-70b-8192";
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant specializing in card management services.";

#[derive(Clone)]
pub struct GenerationConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: 0.2,
            max_tokens: 500,
            connect_timeout: Duration::from_secs(6),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl GenerationConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            api_key: non_empty("CARDASSIST_LLM_API_KEY").or_else(|| non_empty("GROQ_API_KEY")),
            base_url: non_empty("CARDASSIST_LLM_BASE_URL")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            model: non_empty("CARDASSIST_LLM_MODEL").unwrap_or(defaults.model),
            system_prompt: defaults.system_prompt,
            temperature: non_empty("CARDASSIST_LLM_TEMPERATURE")
                .and_then(|value| value.parse::<f32>().ok())
                .map(|value| value.clamp(0.0, 2.0))
                .unwrap_or(defaults.temperature),
            max_tokens: non_empty("CARDASSIST_LLM_MAX_TOKENS")
                .and_then(|value| value.parse::<u32>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(defaults.max_tokens),
            connect_timeout: defaults.connect_timeout,
            request_timeout: non_empty("CARDASSIST_LLM_TIMEOUT_SECONDS")
                .and_then(|value| value.parse::<u64>().ok())
                .map(|secs| Duration::from_secs(secs.clamp(1, 600)))
                .unwrap_or(defaults.request_timeout),
        }
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
