use std::path::PathBuf;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use cardassist_api::{build_app_with_generator, ApiConfig};
use cardassist_core::GenerationError;
use cardassist_llm::ScriptedGenerator;
use serde_json::{json, Value};
use tower::ServiceExt;

const API_KEY: &str = "dev-cardassist-key";

fn kb_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../kb")
}

fn app_with(generator: Arc<ScriptedGenerator>) -> Router {
    let config = ApiConfig::default().with_kb_root(kb_root());
    build_app_with_generator(config, generator).expect("app should build")
}

fn chat_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/chat")
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let app = app_with(Arc::new(ScriptedGenerator::new()));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;
    assert_eq!(parsed["status"], "ok");
    assert_eq!(parsed["generation_model"], "scripted");
    assert!(parsed["knowledge"]["docs_loaded"].as_u64().unwrap() >= 7);
}

#[tokio::test]
async fn chat_requires_api_key() {
    let app = app_with(Arc::new(ScriptedGenerator::new()));

    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "text": "activate 123456789" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn activation_twice_in_one_session() {
    let generator = Arc::new(ScriptedGenerator::new().with_fallback(
        "Thought: the user wants the card switched on\nAction: CLASSIFY_INTENT[activate]\nAnswer: activate",
    ));
    let app = app_with(generator.clone());

    let first = app
        .clone()
        .oneshot(chat_request(
            json!({ "text": "Please activate card number 123456789 for me" }),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first = json_body(first).await;
    assert_eq!(
        first["reply_text"],
        "Card 123456789 has been successfully activated."
    );
    assert_eq!(first["intent"], "activate");
    assert_eq!(first["error"], false);
    let session_id = first["session_id"].as_str().unwrap().to_string();

    let second = app
        .clone()
        .oneshot(chat_request(json!({
            "session_id": session_id,
            "text": "Please activate card number 123456789 for me"
        })))
        .await
        .unwrap();
    let second = json_body(second).await;
    assert_eq!(second["reply_text"], "Card 123456789 is already activated.");
    assert_eq!(second["session_id"], session_id.as_str());
    assert_eq!(generator.calls(), 2);

    let cards = app.clone().oneshot(get_request("/v1/cards")).await.unwrap();
    assert_eq!(cards.status(), StatusCode::OK);
    assert_eq!(json_body(cards).await["active_cards"], json!(["123456789"]));

    let history = app
        .oneshot(get_request(&format!("/v1/chat/{session_id}/history")))
        .await
        .unwrap();
    assert_eq!(history.status(), StatusCode::OK);
    let history = json_body(history).await;
    let turns = history["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(
        turns[1]["assistant_text"],
        "Card 123456789 is already activated."
    );
}

#[tokio::test]
async fn knowledge_question_is_answered_from_the_guide() {
    let generator = Arc::new(ScriptedGenerator::with_replies([
        "Thought: this is a question about fees\nAction: CLASSIFY_INTENT[knowledge]\nAnswer: knowledge",
        "Payments in a foreign currency carry a 2.5 percent fee.",
    ]));
    let app = app_with(generator.clone());

    let response = app
        .oneshot(chat_request(
            json!({ "text": "What is the foreign transaction fee?" }),
        ))
        .await
        .unwrap();

    let parsed = json_body(response).await;
    assert_eq!(parsed["intent"], "knowledge");
    assert_eq!(
        parsed["reply_text"],
        "Payments in a foreign currency carry a 2.5 percent fee."
    );

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("Fees and Charges"));
    assert!(prompts[1].ends_with("Question: What is the foreign transaction fee?\nAnswer:"));
}

#[tokio::test]
async fn unmatched_question_skips_generation() {
    let generator = Arc::new(ScriptedGenerator::with_replies(["Answer: knowledge"]));
    let app = app_with(generator.clone());

    let response = app
        .oneshot(chat_request(json!({ "text": "xyzzy quux plugh" })))
        .await
        .unwrap();

    let parsed = json_body(response).await;
    assert_eq!(
        parsed["reply_text"],
        "I'm sorry, I couldn't find information related to your question."
    );
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn generation_failure_is_reported_in_reply() {
    let generator = Arc::new(ScriptedGenerator::new());
    generator.push_error(GenerationError::Status {
        status: 503,
        body: "upstream unavailable".to_string(),
    });
    let app = app_with(generator);

    let response = app
        .oneshot(chat_request(json!({ "text": "activate 123456789" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;
    assert_eq!(parsed["error"], true);
    assert!(parsed["intent"].is_null());
    assert!(parsed["reply_text"]
        .as_str()
        .unwrap()
        .starts_with("An error occurred: "));
}

#[tokio::test]
async fn empty_text_is_rejected() {
    let generator = Arc::new(ScriptedGenerator::new());
    let app = app_with(generator.clone());

    let response = app
        .oneshot(chat_request(json!({ "text": "   " })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn unknown_session_history_is_not_found() {
    let app = app_with(Arc::new(ScriptedGenerator::new()));

    let response = app
        .oneshot(get_request("/v1/chat/no-such-session/history"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn kb_search_returns_guide_sections() {
    let app = app_with(Arc::new(ScriptedGenerator::new()));

    let request = Request::builder()
        .method("POST")
        .uri("/v1/kb/search")
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(
            json!({ "query": "lost stolen card replacement", "limit": 3 }).to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = json_body(response).await;
    let hits = parsed["hits"].as_array().unwrap();
    assert!(!hits.is_empty());
    assert!(hits.len() <= 3);
    assert!(hits
        .iter()
        .any(|hit| hit["title"] == "Lost or Stolen Cards"));
}

#[tokio::test]
async fn rate_limit_rejects_excess_requests() {
    let config = ApiConfig {
        rate_limit_max: 1,
        ..ApiConfig::default().with_kb_root(kb_root())
    };
    let app = build_app_with_generator(config, Arc::new(ScriptedGenerator::new()))
        .expect("app should build");

    let first = app.clone().oneshot(get_request("/v1/cards")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(get_request("/v1/cards")).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key("retry-after"));
}

#[tokio::test]
async fn message_reaches_handlers_untrimmed() {
    let generator = Arc::new(ScriptedGenerator::with_replies([
        "Answer: knowledge",
        "A replacement card costs 5 EUR.",
    ]));
    let app = app_with(generator.clone());

    let response = app
        .oneshot(chat_request(
            json!({ "text": "  how much is a replacement card?\n" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let prompts = generator.prompts();
    assert!(prompts[1].ends_with("Question:   how much is a replacement card?\n\nAnswer:"));
}

#[tokio::test]
async fn client_chosen_session_id_is_replaced() {
    let generator = Arc::new(ScriptedGenerator::new().with_fallback("Answer: activate"));
    let app = app_with(generator);

    let response = app
        .clone()
        .oneshot(chat_request(json!({
            "session_id": "made-up-by-client",
            "text": "activate 123456789"
        })))
        .await
        .unwrap();
    let parsed = json_body(response).await;
    let issued = parsed["session_id"].as_str().unwrap();
    assert_ne!(issued, "made-up-by-client");

    let unknown = app
        .oneshot(get_request("/v1/chat/made-up-by-client/history"))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn session_count_is_capped() {
    let config = ApiConfig {
        max_sessions: 2,
        ..ApiConfig::default().with_kb_root(kb_root())
    };
    let generator = Arc::new(ScriptedGenerator::new().with_fallback("Answer: activate"));
    let app = build_app_with_generator(config, generator).expect("app should build");

    for idx in 0..5 {
        let response = app
            .clone()
            .oneshot(chat_request(json!({
                "session_id": format!("client-{idx}"),
                "text": "activate 123456789"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let health = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(json_body(health).await["sessions"], 2);
}
