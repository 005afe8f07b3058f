use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{CorsLayer, Any};
use tracing::{error, info, warn};
use url::Url;

use crate::api::cookie::{with_session_cookie, SessionId};
use crate::api::models::{AnalyzeRequest, ChatFailure, ChatRequest, ChatResponse};
use crate::api::response;
use crate::chat;
use crate::error::{AppError, Result};
use crate::report::{build_report, AnalysisReport};
use crate::AppState;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/api/status", get(status_handler))
        .route("/api/analyze", post(analyze_text_handler))
        .route("/api/analyze/json", post(analyze_json_handler))
        .route("/api/chat", post(chat_handler))
        .fallback(fallback_handler)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

async fn home_handler(State(state): State<AppState>, session: SessionId) -> Response {
    state.sessions.sweep();
    state.sessions.get_or_create(session.as_str());
    with_session_cookie(response::home(), &session)
}

async fn status_handler(State(state): State<AppState>, session: SessionId) -> Response {
    let removed = state.sessions.sweep();
    if removed > 0 {
        info!(removed, "swept idle sessions");
    }

    let body = format!(
        "CRO Optimizer API Status: Running\nGemini API Configured: {}",
        !state.config.gemini_api_key.is_empty()
    );
    with_session_cookie(response::text(StatusCode::OK, body), &session)
}

async fn fallback_handler() -> Response {
    response::text(
        StatusCode::OK,
        "CRO Optimizer API is running. Frontend should be served separately in development."
            .to_string(),
    )
}

async fn analyze_text_handler(
    State(state): State<AppState>,
    session: SessionId,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let response = match analyze(&state, &session, &headers, &body).await {
        Ok((url, report)) => response::text_report(&url, &report),
        Err(err) => response::text_error(&err),
    };
    with_session_cookie(response, &session)
}

async fn analyze_json_handler(
    State(state): State<AppState>,
    session: SessionId,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let response = match analyze(&state, &session, &headers, &body).await {
        Ok((url, report)) => response::json_report(url, report),
        Err(err) => err.into_response(),
    };
    with_session_cookie(response, &session)
}

async fn analyze(
    state: &AppState,
    session: &SessionId,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(String, AnalysisReport)> {
    let session_id = session.as_str();
    state.sessions.get_or_create(session_id);
    state.sessions.touch(session_id);

    let url = requested_url(headers, body)
        .ok_or_else(|| AppError::ValidationError("URL is required".to_string()))?;
    validate_url(&url)?;

    info!(url = %url, session_id, "Processing analysis request");
    let start_time = std::time::Instant::now();

    state.sessions.update(session_id, |s| s.last_url = Some(url.clone()));

    let signals = state.pages.get_or_fetch(&url).await?;
    state
        .sessions
        .update(session_id, |s| s.website_signals = Some(signals.clone()));

    let outcome = build_report(&signals, state.model.as_ref()).await;
    if !outcome.success {
        warn!(url = %url, "analysis fell back to the default report");
        return Err(AppError::AnalysisError);
    }

    state
        .sessions
        .update(session_id, |s| s.analysis = Some(outcome.report.clone()));

    info!(
        url = %url,
        score = outcome.report.overall_score,
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "Analysis request completed"
    );
    Ok((url, outcome.report))
}

/// The `url` field of a JSON body, falling back to form encoding.
fn requested_url(headers: &HeaderMap, body: &[u8]) -> Option<String> {
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

    let json_url = if is_form {
        None
    } else {
        serde_json::from_slice::<AnalyzeRequest>(body)
            .ok()
            .and_then(|req| req.url)
    };

    json_url
        .or_else(|| {
            url::form_urlencoded::parse(body)
                .find(|(key, _)| key == "url")
                .map(|(_, value)| value.into_owned())
        })
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
}

fn validate_url(raw: &str) -> Result<()> {
    let parsed = Url::parse(raw).map_err(|_| AppError::ValidationError("Invalid URL".to_string()))?;
    if parsed.scheme().is_empty() || parsed.host_str().is_none_or(str::is_empty) {
        return Err(AppError::ValidationError("Invalid URL format".to_string()));
    }
    Ok(())
}

async fn chat_handler(
    State(state): State<AppState>,
    session: SessionId,
    body: Bytes,
) -> Response {
    let response = match serde_json::from_slice::<ChatRequest>(&body) {
        Err(_) => AppError::ValidationError(
            "Invalid request format. Expected JSON body.".to_string(),
        )
        .into_response(),
        Ok(ChatRequest { message }) => match message.filter(|m| !m.trim().is_empty()) {
            None => AppError::ValidationError("No message provided".to_string()).into_response(),
            Some(message) => chat_reply(&state, &session, &message).await,
        },
    };
    with_session_cookie(response, &session)
}

async fn chat_reply(state: &AppState, session: &SessionId, message: &str) -> Response {
    let session_id = session.as_str();
    let result = chat::respond(&state.sessions, state.model.as_ref(), session_id, message).await;
    state.sessions.touch(session_id);

    match result {
        Ok(reply) => Json(ChatResponse { response: reply }).into_response(),
        Err(err) => {
            error!(session_id, error = %err, "chat interaction failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ChatFailure {
                    error: "Failed to process your question.".to_string(),
                    response: "I'm having trouble connecting right now. Please try again in a moment."
                        .to_string(),
                }),
            )
                .into_response()
        }
    }
}
