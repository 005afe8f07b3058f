use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use cro_analyzer::api::routes::create_router;
use cro_analyzer::config::Config;
use cro_analyzer::error::{AppError, Result};
use cro_analyzer::llm::{LanguageModel, ModelError};
use cro_analyzer::scraper::PageFetcher;
use cro_analyzer::AppState;

const PAGE: &str = r#"<html><head><title>Acme</title>
<meta name="viewport" content="width=device-width">
</head><body><a class="cta" href="/signup">Sign up</a><form></form></body></html>"#;

const GOOD_REPLY: &str = "```json\n{\"overall_score\": 70, \"issues\": [{\"category\": \"Forms\", \"description\": \"Empty form\", \"impact\": \"Medium\", \"solution\": \"Add fields\"}]}\n```";

struct StaticFetcher {
    pages: HashMap<String, String>,
    calls: AtomicUsize,
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::FetchError("404 Not Found".to_string()))
    }
}

struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, _prompt: &str) -> std::result::Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::Api {
                status: 500,
                message: "no scripted reply".to_string(),
            })
    }
}

struct TestApp {
    router: Router,
    state: AppState,
    fetcher: Arc<StaticFetcher>,
    model: Arc<ScriptedModel>,
}

fn test_app(replies: &[&str]) -> TestApp {
    let config = Config::from_lookup(|key| match key {
        "GEMINI_API_KEY" => Some("test-key".to_string()),
        _ => None,
    })
    .unwrap();

    let fetcher = Arc::new(StaticFetcher {
        pages: HashMap::from([("https://acme.test/".to_string(), PAGE.to_string())]),
        calls: AtomicUsize::new(0),
    });
    let model = Arc::new(ScriptedModel {
        replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
        calls: AtomicUsize::new(0),
    });

    let state = AppState::with_components(config, fetcher.clone(), model.clone());
    TestApp {
        router: create_router(state.clone()),
        state,
        fetcher,
        model,
    }
}

fn json_post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn session_cookie(response: &axum::response::Response) -> String {
    let value = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie should be set")
        .to_str()
        .unwrap();
    value
        .split(';')
        .next()
        .unwrap()
        .strip_prefix("session_id=")
        .unwrap()
        .to_string()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

#[tokio::test]
async fn status_reports_running_and_sets_cookie() {
    let app = test_app(&[]);

    let response = app
        .router
        .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!session_cookie(&response).is_empty());
    let text = body_string(response).await;
    assert_eq!(
        text,
        "CRO Optimizer API Status: Running\nGemini API Configured: true"
    );
}

#[tokio::test]
async fn home_page_creates_session() {
    let app = test_app(&[]);

    let response = app
        .router
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let session_id = session_cookie(&response);
    assert!(app.state.sessions.get(&session_id).unwrap().timestamp.is_some());
    assert!(body_string(response).await.contains("CRO Optimizer API"));
}

#[tokio::test]
async fn analyze_json_returns_adjusted_report() {
    let app = test_app(&[GOOD_REPLY]);

    let response = app
        .router
        .oneshot(json_post("/api/analyze/json", r#"{"url": "https://acme.test/"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let session_id = session_cookie(&response);
    let json = body_json(response).await;

    // one optimization indicator (viewport meta) adds a point
    assert_eq!(json["overall_score"], 71);
    assert_eq!(json["health_score"]["value"], 71);
    assert_eq!(json["health_score"]["category"], "Good");
    assert_eq!(json["issues"][0]["category"], "Forms");
    assert_eq!(json["url"], "https://acme.test/");

    let session = app.state.sessions.get(&session_id).unwrap();
    assert_eq!(session.last_url.as_deref(), Some("https://acme.test/"));
    assert_eq!(session.analysis.unwrap().overall_score, 71);
    assert_eq!(session.website_signals.unwrap().ctas_count, 1);
}

#[tokio::test]
async fn analyze_text_accepts_form_body() {
    let app = test_app(&[GOOD_REPLY]);

    let request = Request::builder()
        .method("POST")
        .uri("/api/analyze")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("url=https%3A%2F%2Facme.test%2F"))
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain; charset=utf-8"
    );
    let text = body_string(response).await;
    assert!(text.starts_with("WEBSITE ANALYSIS REPORT\nURL: https://acme.test/"));
    assert!(text.contains("OVERALL UX HEALTH SCORE: 71/100"));
    assert!(text.contains("1. Forms"));
}

#[tokio::test]
async fn analyze_text_requires_url() {
    let app = test_app(&[]);

    let response = app
        .router
        .oneshot(json_post("/api/analyze", "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::SET_COOKIE).is_some());
    assert_eq!(body_string(response).await, "ERROR: URL is required");
}

#[tokio::test]
async fn analyze_json_rejects_malformed_url() {
    let app = test_app(&[]);

    let response = app
        .router
        .oneshot(json_post("/api/analyze/json", r#"{"url": "acme.test"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Invalid URL");
    assert_eq!(app.fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fetch_failure_is_a_server_error_with_detail() {
    let app = test_app(&[]);

    let response = app
        .router
        .oneshot(json_post("/api/analyze/json", r#"{"url": "https://missing.test/"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await["error"],
        "Failed to extract website content: 404 Not Found"
    );
    assert_eq!(app.model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unparseable_model_reply_fails_the_analysis() {
    let app = test_app(&["The website is lovely."]);

    let response = app
        .router
        .oneshot(json_post("/api/analyze", r#"{"url": "https://acme.test/"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_string(response).await,
        "ERROR: Failed to analyze website. Please try again later."
    );
}

#[tokio::test]
async fn repeated_analysis_reuses_cached_page_and_session() {
    let app = test_app(&[GOOD_REPLY, GOOD_REPLY]);

    let first = app
        .router
        .clone()
        .oneshot(json_post("/api/analyze/json", r#"{"url": "https://acme.test/"}"#))
        .await
        .unwrap();
    let session_id = session_cookie(&first);

    let mut second_request = json_post("/api/analyze/json", r#"{"url": "https://acme.test/"}"#);
    second_request.headers_mut().insert(
        header::COOKIE,
        format!("session_id={}", session_id).parse().unwrap(),
    );
    let second = app.router.clone().oneshot(second_request).await.unwrap();

    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(session_cookie(&second), session_id);
    assert_eq!(app.fetcher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(app.model.calls.load(Ordering::SeqCst), 2);
    assert_eq!(app.state.sessions.len(), 1);
}

#[tokio::test]
async fn chat_greeting_skips_model() {
    let app = test_app(&[]);

    let response = app
        .router
        .oneshot(json_post("/api/chat", r#"{"message": "hello"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let session_id = session_cookie(&response);
    let json = body_json(response).await;
    assert_eq!(json["response"], cro_analyzer::chat::GREETING_RESPONSE);
    assert_eq!(app.model.calls.load(Ordering::SeqCst), 0);
    assert_eq!(app.state.sessions.get(&session_id).unwrap().history.len(), 2);
}

#[tokio::test]
async fn chat_question_uses_model() {
    let app = test_app(&["Put your main CTA above the fold."]);

    let response = app
        .router
        .oneshot(json_post(
            "/api/chat",
            r#"{"message": "How do I get more signups on my landing page?"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["response"],
        "Put your main CTA above the fold."
    );
    assert_eq!(app.model.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn chat_model_failure_is_reported() {
    let app = test_app(&[]);

    let response = app
        .router
        .oneshot(json_post("/api/chat", r#"{"message": "Why is my bounce rate high?"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Failed to process your question.");
    assert!(json["response"].as_str().unwrap().contains("trouble connecting"));
}

#[tokio::test]
async fn chat_validates_body() {
    let app = test_app(&[]);

    let response = app
        .router
        .clone()
        .oneshot(json_post("/api/chat", "message=hello"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "Invalid request format. Expected JSON body."
    );

    let response = app
        .router
        .oneshot(json_post("/api/chat", r#"{"message": ""}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "No message provided");
}

#[tokio::test]
async fn unknown_paths_get_running_notice() {
    let app = test_app(&[]);

    let response = app
        .router
        .oneshot(Request::builder().uri("/dashboard").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.starts_with("CRO Optimizer API is running."));
}
