//! Heuristic scoring: turns page signals plus the model's critique into a
//! scored report.

use std::fmt::Write as _;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::llm::LanguageModel;
use crate::scraper::{truncate_chars, WebsiteSignals};

pub const MAX_ISSUES: usize = 5;
const TEXT_SAMPLE_CHARS: usize = 10_000;
const DEFAULT_SCORE: u8 = 65;

pub const ISSUE_CATEGORIES: &[&str] = &[
    "Call-to-Action",
    "Forms",
    "Navigation",
    "Social Proof",
    "Page Speed",
    "Mobile Responsiveness",
    "Content",
];

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").expect("Failed to compile fenced block pattern")
});
static BRACED_OBJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\{[\s\S]*\})").expect("Failed to compile braced object pattern")
});

/// Ordered health-score tiers, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthTier {
    Critical,
    Poor,
    NeedsImprovement,
    Good,
    VeryGood,
    Excellent,
}

impl HealthTier {
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => HealthTier::Excellent,
            80..=89 => HealthTier::VeryGood,
            70..=79 => HealthTier::Good,
            60..=69 => HealthTier::NeedsImprovement,
            50..=59 => HealthTier::Poor,
            _ => HealthTier::Critical,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HealthTier::Excellent => "Excellent",
            HealthTier::VeryGood => "Very Good",
            HealthTier::Good => "Good",
            HealthTier::NeedsImprovement => "Needs Improvement",
            HealthTier::Poor => "Poor",
            HealthTier::Critical => "Critical",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            HealthTier::Excellent => {
                "Your website is optimized for conversions with only minor improvements needed."
            }
            HealthTier::VeryGood => {
                "Your website performs well but has some opportunities for improvement."
            }
            HealthTier::Good => {
                "Your website has a solid foundation but several areas need attention."
            }
            HealthTier::NeedsImprovement => {
                "Your website has some issues that may be impacting conversions."
            }
            HealthTier::Poor => {
                "Your website has significant conversion issues that need attention."
            }
            HealthTier::Critical => {
                "Your website has critical issues that are severely limiting conversions."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    pub value: u8,
    pub category: String,
    pub description: String,
}

impl HealthScore {
    pub fn from_score(score: u8) -> Self {
        let tier = HealthTier::from_score(score);
        Self {
            value: score,
            category: tier.label().to_string(),
            description: tier.description().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub category: String,
    pub description: String,
    pub impact: String,
    pub solution: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub overall_score: u8,
    pub health_score: HealthScore,
    pub issues: Vec<Issue>,
}

impl AnalysisReport {
    /// Fallback used whenever the model cannot produce a usable analysis.
    pub fn fallback() -> Self {
        Self {
            overall_score: DEFAULT_SCORE,
            health_score: HealthScore {
                value: DEFAULT_SCORE,
                category: HealthTier::NeedsImprovement.label().to_string(),
                description: "Several significant issues that need attention.".to_string(),
            },
            issues: vec![Issue {
                category: "Error Processing".to_string(),
                description: "We encountered an issue analyzing this website. Please try again."
                    .to_string(),
                impact: "High".to_string(),
                solution: "Refresh and retry the analysis.".to_string(),
            }],
        }
    }
}

/// The model's raw verdict before score adjustment.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelVerdict {
    pub overall_score: u8,
    pub issues: Vec<Issue>,
}

#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub report: AnalysisReport,
    /// False when the fallback report was substituted.
    pub success: bool,
}

/// Number of technical best-practice markers present, 0 to 8.
pub fn count_optimization_indicators(signals: &WebsiteSignals) -> u8 {
    [
        signals.async_scripts_count > 0,
        signals.defer_scripts_count > 0,
        signals.lazy_loaded_images_count > 0,
        signals.has_responsive_meta,
        signals.media_queries_count > 2,
        signals.has_manifest,
        signals.has_service_worker,
        signals.aria_attributes_count > 5,
    ]
    .into_iter()
    .filter(|present| *present)
    .count() as u8
}

/// Apply the reputation bonus, then the optimization bonus, each capped at 100.
pub fn adjust_score(score: u8, reputable: bool, optimization_indicators: u8) -> u8 {
    let mut score = score.min(100);
    if reputable {
        let bonus = (score / 10).clamp(5, 10);
        let adjusted = (score + bonus).min(100);
        debug!(from = score, to = adjusted, "reputable domain bonus");
        score = adjusted;
    }
    if optimization_indicators > 0 {
        let adjusted = (score + optimization_indicators.min(5)).min(100);
        debug!(from = score, to = adjusted, "optimization indicator bonus");
        score = adjusted;
    }
    score
}

/// Salvage a verdict from free-form model output.
///
/// Tries the whole text, then a fenced code block, then the outermost braces.
pub fn parse_model_reply(text: &str) -> Option<ModelVerdict> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let candidates = [
        Some(text),
        FENCED_BLOCK
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str()),
        BRACED_OBJECT
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str()),
    ];

    candidates
        .into_iter()
        .flatten()
        .filter_map(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .find_map(|value| verdict_from_json(&value))
}

fn verdict_from_json(value: &Value) -> Option<ModelVerdict> {
    let object = value.as_object()?;
    let score = match object.get("overall_score")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !score.is_finite() {
        return None;
    }

    let issues = object
        .get("issues")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(issue_from_json)
                .take(MAX_ISSUES)
                .collect()
        })
        .unwrap_or_default();

    Some(ModelVerdict {
        overall_score: score.round().clamp(0.0, 100.0) as u8,
        issues,
    })
}

fn issue_from_json(value: &Value) -> Option<Issue> {
    let object = value.as_object()?;
    let field = |key: &str, default: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    };
    Some(Issue {
        category: field("category", "Issue"),
        description: field("description", "No description available"),
        impact: field("impact", "Unknown"),
        solution: field("solution", "No solution provided"),
    })
}

/// Combine a verdict with the page's signals into the final report.
pub fn finalize_report(verdict: ModelVerdict, signals: &WebsiteSignals) -> AnalysisReport {
    let indicators = count_optimization_indicators(signals);
    let score = adjust_score(verdict.overall_score, signals.is_reputable_domain, indicators);
    AnalysisReport {
        overall_score: score,
        health_score: HealthScore::from_score(score),
        issues: verdict.issues,
    }
}

pub fn build_prompt(signals: &WebsiteSignals) -> String {
    let first_sample = truncate_chars(&signals.text_content, TEXT_SAMPLE_CHARS);
    let second_sample = truncate_chars(&signals.text_content[first_sample.len()..], TEXT_SAMPLE_CHARS);
    let keywords = if signals.keywords.is_empty() {
        "Not specified"
    } else {
        signals.keywords.as_str()
    };

    let mut prompt = String::with_capacity(signals.text_content.len() + 4096);
    prompt.push_str("Analyze this website data for UX and conversion rate optimization (CRO) issues:\n\n");
    let _ = writeln!(prompt, "URL: {}", signals.url);
    let _ = writeln!(prompt, "Page title: {}", signals.title);
    let _ = writeln!(prompt, "Meta description: {}", signals.meta_description);
    let _ = writeln!(prompt, "Keywords: {}\n", keywords);

    prompt.push_str("Key statistics:\n");
    let stats: [(&str, String); 15] = [
        ("CTAs detected", signals.ctas_count.to_string()),
        ("Forms detected", signals.forms_count.to_string()),
        ("Navigation elements", signals.nav_elements_count.to_string()),
        ("Testimonial/social proof elements", signals.testimonials_count.to_string()),
        ("Scripts count", signals.scripts_count.to_string()),
        ("Async scripts", signals.async_scripts_count.to_string()),
        ("Defer scripts", signals.defer_scripts_count.to_string()),
        ("Images count", signals.images_count.to_string()),
        ("Lazy-loaded images", signals.lazy_loaded_images_count.to_string()),
        ("Large images count", signals.large_images_count.to_string()),
        ("Has responsive meta tag", signals.has_responsive_meta.to_string()),
        ("Media queries detected", signals.media_queries_count.to_string()),
        ("Has web app manifest", signals.has_manifest.to_string()),
        ("Has service worker", signals.has_service_worker.to_string()),
        ("Accessibility attributes", signals.aria_attributes_count.to_string()),
    ];
    for (label, value) in stats {
        let _ = writeln!(prompt, "- {}: {}", label, value);
    }

    let _ = writeln!(prompt, "\nPage content sample (first part): {}", first_sample);
    let _ = writeln!(prompt, "\nPage content sample (second part): {}", second_sample);

    prompt.push_str(
        "\nAnalysis guidelines:
1. Consider that established/popular websites often use sophisticated techniques
2. Low element counts might be intentional for minimalist design
3. High element counts aren't inherently problematic if well-organized
4. Evaluate page based on UX best practices for its apparent purpose
5. Consider mobile responsiveness and performance optimization features
6. Identify issues that genuinely impact conversions, not just technical preferences

Provide your analysis as a structured JSON object with the following format:

{
  \"overall_score\": <A number from 0-100 representing overall UX health>,
  \"issues\": [
    {
",
    );
    let _ = writeln!(
        prompt,
        "      \"category\": \"<Category name: {}>\",",
        ISSUE_CATEGORIES.join(", ")
    );
    prompt.push_str(
        "      \"description\": \"<Detailed explanation of the issue>\",
      \"impact\": \"<High, Medium, or Low>\",
      \"solution\": \"<Specific recommendation to fix the issue>\"
    }
  ]
}
",
    );
    let _ = writeln!(
        prompt,
        "\nIdentify {} key issues across different categories that would most impact conversion rates.",
        MAX_ISSUES
    );
    prompt.push_str(
        "For each issue give a clear problem description, the expected impact on conversion rates, and a specific, actionable solution.

Scoring guidance:
- 90-100: Exceptional websites with minimal issues
- 80-89: Good websites with a few minor improvements needed
- 70-79: Decent websites with several areas for improvement
- 60-69: Websites with significant issues affecting conversions
- 50-59: Websites with major usability or conversion problems
- Below 50: Only for websites with critical, pervasive issues

YOU MUST RETURN A VALID JSON OBJECT. DO NOT INCLUDE ANY EXPLANATION TEXT BEFORE OR AFTER THE JSON.
",
    );
    prompt
}

/// Ask the model for a critique of `signals` and build the scored report.
///
/// Never fails: model or parse errors produce the fallback report with
/// `success == false`.
pub async fn build_report(signals: &WebsiteSignals, model: &dyn LanguageModel) -> ReportOutcome {
    let prompt = build_prompt(signals);
    info!(url = %signals.url, prompt_len = prompt.len(), "requesting model analysis");

    let reply = match model.generate(&prompt).await {
        Ok(reply) => reply,
        Err(err) => {
            warn!(url = %signals.url, error = %err, "model analysis failed");
            return ReportOutcome {
                report: AnalysisReport::fallback(),
                success: false,
            };
        }
    };

    match parse_model_reply(&reply) {
        Some(verdict) => {
            let report = finalize_report(verdict, signals);
            info!(url = %signals.url, score = report.overall_score, "analysis complete");
            ReportOutcome {
                report,
                success: true,
            }
        }
        None => {
            warn!(url = %signals.url, reply_len = reply.len(), "could not extract JSON from model reply");
            ReportOutcome {
                report: AnalysisReport::fallback(),
                success: false,
            }
        }
    }
}

/// Plain-text rendering of a report.
pub fn format_report(url: &str, report: &AnalysisReport) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "WEBSITE ANALYSIS REPORT");
    let _ = writeln!(text, "URL: {}\n", url);
    let _ = writeln!(text, "OVERALL UX HEALTH SCORE: {}/100", report.overall_score);
    let _ = writeln!(
        text,
        "HEALTH ASSESSMENT: {} - {}\n",
        report.health_score.category, report.health_score.description
    );
    let _ = writeln!(text, "KEY ISSUES AND RECOMMENDATIONS:");

    for (i, issue) in report.issues.iter().enumerate() {
        let _ = writeln!(text, "\n{}. {}", i + 1, issue.category);
        let _ = writeln!(text, "   Problem: {}", issue.description);
        let _ = writeln!(text, "   Impact: {}", issue.impact);
        let _ = writeln!(text, "   Solution: {}", issue.solution);
    }
    text
}
