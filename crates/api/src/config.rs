use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub kb_root: PathBuf,
    pub search_top_k: usize,
    pub bind: String,
    pub api_key: String,
    pub rate_limit_window: Duration,
    pub rate_limit_max: usize,
    pub max_sessions: usize,
    pub allowed_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            kb_root: PathBuf::from("kb"),
            search_top_k: 3,
            bind: "0.0.0.0:8080".to_string(),
            api_key: "dev-cardassist-key".to_string(),
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max: 60,
            max_sessions: 10_000,
            allowed_origins: vec!["http://localhost:8501".to_string()],
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            kb_root: env::var("CARDASSIST_KB_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.kb_root),
            search_top_k: env::var("CARDASSIST_SEARCH_TOP_K")
                .ok()
                .and_then(|value| value.parse::<usize>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(defaults.search_top_k),
            bind: env::var("CARDASSIST_BIND").unwrap_or(defaults.bind),
            api_key: env::var("CARDASSIST_API_KEY")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(defaults.api_key),
            rate_limit_window: env::var("CARDASSIST_RATE_LIMIT_WINDOW_SECONDS")
                .ok()
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_window),
            rate_limit_max: env::var("CARDASSIST_RATE_LIMIT_MAX")
                .ok()
                .and_then(|value| value.parse::<usize>().ok())
                .unwrap_or(defaults.rate_limit_max),
            max_sessions: env::var("CARDASSIST_MAX_SESSIONS")
                .ok()
                .and_then(|value| value.parse::<usize>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(defaults.max_sessions),
            allowed_origins: env::var("CARDASSIST_ALLOWED_ORIGINS")
                .ok()
                .map(|value| {
                    value
                        .split(',')
                        .map(|origin| origin.trim().to_string())
                        .filter(|origin| !origin.is_empty())
                        .collect::<Vec<_>>()
                })
                .filter(|origins| !origins.is_empty())
                .unwrap_or(defaults.allowed_origins),
        }
    }

    pub fn with_kb_root(mut self, kb_root: impl Into<PathBuf>) -> Self {
        self.kb_root = kb_root.into();
        self
    }
}
