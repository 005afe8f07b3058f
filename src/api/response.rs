use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;

use crate::error::AppError;
use crate::report::{format_report, AnalysisReport};
use super::models::AnalyzeResponse;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

const HOME_PAGE: &str = include_str!("home.html");

pub fn text(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, TEXT_PLAIN)], body).into_response()
}

/// `ERROR: <reason>` body for the plain-text endpoints.
pub fn text_error(err: &AppError) -> Response {
    text(err.status_code(), format!("ERROR: {}", err))
}

pub fn text_report(url: &str, report: &AnalysisReport) -> Response {
    text(StatusCode::OK, format_report(url, report))
}

pub fn json_report(url: String, report: AnalysisReport) -> Response {
    (StatusCode::OK, Json(AnalyzeResponse { report, url })).into_response()
}

pub fn home() -> Response {
    Html(HOME_PAGE).into_response()
}
