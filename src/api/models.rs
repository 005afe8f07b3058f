use serde::{Deserialize, Serialize};

use crate::report::AnalysisReport;

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    pub url: Option<String>,
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
}

#[derive(Serialize)]
pub struct AnalyzeResponse {
    #[serde(flatten)]
    pub report: AnalysisReport,
    pub url: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Serialize)]
pub struct ChatFailure {
    pub error: String,
    pub response: String,
}
