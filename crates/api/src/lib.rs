mod config;
mod rate_limit;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Json, Path as AxumPath, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{body::Body, Router};
use cardassist_agents::{assemble_router, IntentRouter};
use cardassist_core::{CardIdentifier, Intent, RetrievedChunk};
use cardassist_llm::{ChatCompletionsClient, GenerationConfig, TextGenerator};
use cardassist_observability::AppMetrics;
use cardassist_retrieval::{HashedTokenEmbedder, KnowledgeIndex, PassageRetriever};
use cardassist_storage::{CardRegistry, ConversationLog};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub use crate::config::ApiConfig;
use crate::rate_limit::ClientRateLimiter;

const MAX_MESSAGE_CHARS: usize = 2_000;
const MAX_SEARCH_LIMIT: usize = 20;

#[derive(Clone)]
pub struct ApiState {
    pub router: Arc<IntentRouter>,
    pub index: Arc<KnowledgeIndex>,
    pub registry: Arc<CardRegistry>,
    pub conversations: Arc<ConversationLog>,
    pub metrics: Arc<AppMetrics>,
    pub generation_model: String,
    api_key: String,
    limiter: ClientRateLimiter,
    allowed_origins: Arc<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    generation_model: String,
    knowledge: cardassist_retrieval::RetrievalStats,
    active_cards: usize,
    sessions: usize,
    metrics: cardassist_observability::MetricsSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub reply_text: String,
    pub intent: Option<Intent>,
    pub classification_defaulted: bool,
    pub error: bool,
}

#[derive(Debug, Deserialize)]
struct KbSearchRequest {
    query: String,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct KbSearchResponse {
    hits: Vec<RetrievedChunk>,
}

#[derive(Debug, Serialize)]
struct ActiveCardsResponse {
    active_cards: Vec<CardIdentifier>,
}

/// Builds the app with the generation client configured from the environment.
pub fn build_app(config: ApiConfig) -> Result<Router> {
    let client = ChatCompletionsClient::new(GenerationConfig::from_env())?;
    if !client.config().is_configured() {
        tracing::warn!("no generation API key configured; chat requests will report an error");
    }
    build_app_with_generator(config, Arc::new(client))
}

pub fn build_app_with_generator(
    config: ApiConfig,
    generator: Arc<dyn TextGenerator>,
) -> Result<Router> {
    let metrics = AppMetrics::shared();
    let index = Arc::new(
        KnowledgeIndex::from_kb_dir(
            &config.kb_root,
            Some(Arc::new(HashedTokenEmbedder::default())),
        )
        .with_context(|| {
            format!(
                "failed loading knowledge base from {}",
                config.kb_root.display()
            )
        })?,
    );
    let retriever = Arc::new(PassageRetriever::new(index.clone(), config.search_top_k));
    let registry = Arc::new(CardRegistry::new());
    let generation_model = generator.model_name().to_string();

    let router = Arc::new(assemble_router(
        generator,
        registry.clone(),
        retriever,
        metrics.clone(),
    ));

    let state = ApiState {
        router,
        index,
        registry,
        conversations: Arc::new(ConversationLog::with_max_sessions(config.max_sessions)),
        metrics,
        generation_model,
        api_key: config.api_key,
        limiter: ClientRateLimiter::new(config.rate_limit_window, config.rate_limit_max),
        allowed_origins: Arc::new(config.allowed_origins),
    };

    Ok(build_router(state))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/chat", post(chat))
        .route("/v1/chat/:session_id/history", get(chat_history))
        .route("/v1/kb/search", post(kb_search))
        .route("/v1/cards", get(active_cards))
        .layer(build_cors_layer(&state.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(16 * 1024))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        generation_model: state.generation_model.clone(),
        knowledge: state.index.stats(),
        active_cards: state.registry.len(),
        sessions: state.conversations.session_count(),
        metrics: state.metrics.snapshot(),
    };
    (StatusCode::OK, Json(payload))
}

/// Chat boundary: generation failures become a readable reply and the
/// session carries on.
async fn chat(State(state): State<ApiState>, Json(request): Json<ChatRequest>) -> Response {
    let trimmed = request.text.trim();
    if trimmed.is_empty() {
        return bad_request("text must not be empty");
    }
    if trimmed.chars().count() > MAX_MESSAGE_CHARS {
        return bad_request("text is too long");
    }
    let text = request.text.as_str();

    let session_id = state.conversations.open(request.session_id.as_deref());

    let response = match state.router.route(text).await {
        Ok(routed) => ChatResponse {
            session_id: session_id.clone(),
            reply_text: routed.reply_text,
            intent: Some(routed.intent),
            classification_defaulted: routed.classification.defaulted,
            error: false,
        },
        Err(err) => {
            error!(session_id = %session_id, error = %err, "chat request failed");
            ChatResponse {
                session_id: session_id.clone(),
                reply_text: format!("An error occurred: {err}"),
                intent: None,
                classification_defaulted: false,
                error: true,
            }
        }
    };

    state.conversations.record(
        &session_id,
        text,
        &response.reply_text,
        response.intent,
        response.error,
    );
    info!(
        session_id = %session_id,
        intent = ?response.intent,
        error = response.error,
        "chat handled"
    );

    (StatusCode::OK, Json(response)).into_response()
}

async fn chat_history(
    State(state): State<ApiState>,
    AxumPath(session_id): AxumPath<String>,
) -> Response {
    match state.conversations.history(&session_id) {
        Some(turns) => (
            StatusCode::OK,
            Json(serde_json::json!({ "session_id": session_id, "turns": turns })),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "not_found",
                "message": "unknown session"
            })),
        )
            .into_response(),
    }
}

async fn kb_search(State(state): State<ApiState>, Json(request): Json<KbSearchRequest>) -> Response {
    if request.query.trim().is_empty() {
        return bad_request("query must not be empty");
    }
    let limit = request.limit.unwrap_or(5).clamp(1, MAX_SEARCH_LIMIT);
    let hits = state.index.search(&request.query, limit);
    (StatusCode::OK, Json(KbSearchResponse { hits })).into_response()
}

async fn active_cards(State(state): State<ApiState>) -> impl IntoResponse {
    Json(ActiveCardsResponse {
        active_cards: state.registry.snapshot(),
    })
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "error": "invalid_request",
            "message": message
        })),
    )
        .into_response()
}

fn is_public_endpoint(path: &str) -> bool {
    matches!(path, "/health")
}

async fn api_key_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if !constant_time_eq(header_key.as_bytes(), state.api_key.as_bytes()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "unauthorized",
                "message": "missing or invalid x-api-key"
            })),
        )
            .into_response();
    }

    next.run(request).await
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let ip = request_ip(&request);
    if let Err(retry_after) = state.limiter.check(&ip) {
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "rate_limited",
                "message": "rate limit exceeded for this client"
            })),
        )
            .into_response();
        if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().max(1).to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        return response;
    }

    next.run(request).await
}

fn constant_time_eq(lhs: &[u8], rhs: &[u8]) -> bool {
    if lhs.len() != rhs.len() {
        return false;
    }
    let mut diff = 0_u8;
    for (a, b) in lhs.iter().zip(rhs.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}

fn request_ip(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "local".to_string())
}

fn build_cors_layer(allowed_origins: &Arc<Vec<String>>) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-api-key"),
        ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_forwarded(value: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/v1/chat");
        if let Some(value) = value {
            builder = builder.header("x-forwarded-for", value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn request_ip_uses_first_forwarded_address() {
        let request = request_with_forwarded(Some("203.0.113.7, 10.0.0.1"));
        assert_eq!(request_ip(&request), "203.0.113.7");
    }

    #[test]
    fn request_ip_falls_back_to_local() {
        assert_eq!(request_ip(&request_with_forwarded(None)), "local");
        assert_eq!(request_ip(&request_with_forwarded(Some(" "))), "local");
    }

    #[test]
    fn only_health_is_public() {
        assert!(is_public_endpoint("/health"));
        assert!(!is_public_endpoint("/v1/chat"));
        assert!(!is_public_endpoint("/v1/cards"));
    }

    #[test]
    fn api_key_comparison() {
        assert!(constant_time_eq(b"dev-cardassist-key", b"dev-cardassist-key"));
        assert!(!constant_time_eq(b"dev-cardassist-key", b"dev-cardassist-kez"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
