use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, ClientBuilder};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, Result};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Maximum number of characters of visible text kept per page.
pub const TEXT_CONTENT_LIMIT: usize = 20_000;

const LARGE_PIXELS: u64 = 1200;
const LARGE_PERCENT: f64 = 80.0;
const LARGE_EM: f64 = 10.0;
const LARGE_VIEWPORT: f64 = 50.0;

const CTA_PHRASES: &[&str] = &[
    "sign up",
    "get started",
    "try now",
    "buy now",
    "subscribe",
    "download",
    "join",
    "start",
];

const SOCIAL_PROOF_TERMS: &[&str] = &[
    "testimonial",
    "review",
    "stars",
    "rating",
    "trust",
    "customer story",
];

pub const REPUTABLE_DOMAINS: &[&str] = &[
    "google", "amazon", "apple", "microsoft", "facebook", "meta", "twitter",
    "linkedin", "github", "stackoverflow", "netflix", "spotify", "airbnb",
    "uber", "shopify", "stripe", "slack", "notion", "zoom", "dropbox",
    "mailchimp", "hubspot", "salesforce", "adobe", "squarespace", "wix",
    "wordpress", "webflow", "atlassian", "canva", "figma", "asana", "trello",
];

static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("title"));
static DESCRIPTION_SELECTOR: Lazy<Selector> = Lazy::new(|| selector(r#"meta[name="description"]"#));
static KEYWORDS_SELECTOR: Lazy<Selector> = Lazy::new(|| selector(r#"meta[name="keywords"]"#));
static VIEWPORT_SELECTOR: Lazy<Selector> = Lazy::new(|| selector(r#"meta[name="viewport"]"#));
static CTA_CANDIDATE_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("a, button"));
static FORM_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("form"));
static NAV_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("nav, header, menu"));
static CLASSED_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("[class]"));
static ANY_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("*"));
static FOOTER_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("footer"));
static SCRIPT_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("script"));
static ASYNC_SCRIPT_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("script[async]"));
static DEFER_SCRIPT_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("script[defer]"));
static IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("img"));
static LAZY_IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| selector(r#"img[loading="lazy"]"#));
static STYLE_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("style"));
static MANIFEST_SELECTOR: Lazy<Selector> = Lazy::new(|| selector(r#"link[rel~="manifest"]"#));

static ARIA_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"aria-[a-z]+").expect("Failed to compile aria attribute pattern")
});

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("Failed to parse static selector")
}

/// Structural and UX signals extracted from one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebsiteSignals {
    pub url: String,
    pub title: String,
    pub meta_description: String,
    pub keywords: String,
    pub text_content: String,
    pub ctas_count: usize,
    pub forms_count: usize,
    pub nav_elements_count: usize,
    pub testimonials_count: usize,
    pub footer_elements_count: usize,
    pub scripts_count: usize,
    pub async_scripts_count: usize,
    pub defer_scripts_count: usize,
    pub images_count: usize,
    pub lazy_loaded_images_count: usize,
    pub large_images_count: usize,
    pub has_responsive_meta: bool,
    pub responsive_meta_content: String,
    pub media_queries_count: usize,
    pub has_manifest: bool,
    pub has_service_worker: bool,
    pub aria_attributes_count: usize,
    pub is_reputable_domain: bool,
}

/// Source of raw page markup.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = ClientBuilder::new()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5).min(timeout))
            .pool_max_idle_per_host(10)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let html = response.text().await?;
        debug!(url, bytes = html.len(), "fetched page");
        Ok(html)
    }
}

/// Extract the fixed signal set from a page. Pure and deterministic.
pub fn extract_signals(html: &str, url: &str) -> WebsiteSignals {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "No title found".to_string());

    let viewport = document.select(&VIEWPORT_SELECTOR).next();

    let scripts: Vec<ElementRef> = document.select(&SCRIPT_SELECTOR).collect();
    let images: Vec<ElementRef> = document.select(&IMG_SELECTOR).collect();

    let testimonials_by_class = document
        .select(&CLASSED_SELECTOR)
        .filter(|el| class_contains(el, &["testimonial", "review"]))
        .count();
    let social_proof = document
        .select(&ANY_SELECTOR)
        .filter(|el| {
            let markup = el.html().to_lowercase();
            SOCIAL_PROOF_TERMS.iter().any(|term| markup.contains(term))
        })
        .count();

    let footers = document.select(&FOOTER_SELECTOR).count()
        + document
            .select(&CLASSED_SELECTOR)
            .filter(|el| class_contains(el, &["footer"]))
            .count();

    WebsiteSignals {
        url: url.to_string(),
        title,
        meta_description: meta_content(&document, &DESCRIPTION_SELECTOR),
        keywords: meta_content(&document, &KEYWORDS_SELECTOR),
        text_content: visible_text(&document),
        ctas_count: document.select(&CTA_CANDIDATE_SELECTOR).filter(is_cta).count(),
        forms_count: document.select(&FORM_SELECTOR).count(),
        nav_elements_count: document.select(&NAV_SELECTOR).count(),
        testimonials_count: testimonials_by_class + social_proof,
        footer_elements_count: footers,
        scripts_count: scripts.len(),
        async_scripts_count: document.select(&ASYNC_SCRIPT_SELECTOR).count(),
        defer_scripts_count: document.select(&DEFER_SCRIPT_SELECTOR).count(),
        images_count: images.len(),
        lazy_loaded_images_count: document.select(&LAZY_IMG_SELECTOR).count(),
        large_images_count: images.iter().filter(|img| is_large_image(img)).count(),
        has_responsive_meta: viewport.is_some(),
        responsive_meta_content: viewport
            .and_then(|el| el.value().attr("content"))
            .unwrap_or_default()
            .to_string(),
        media_queries_count: document
            .select(&STYLE_SELECTOR)
            .map(|el| el.inner_html().matches("@media").count())
            .sum(),
        has_manifest: document.select(&MANIFEST_SELECTOR).next().is_some(),
        has_service_worker: scripts.iter().any(|el| el.html().contains("serviceWorker")),
        aria_attributes_count: ARIA_ATTRIBUTE.find_iter(html).count(),
        is_reputable_domain: is_reputable_domain(url),
    }
}

fn meta_content(document: &Html, selector: &Selector) -> String {
    document
        .select(selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .unwrap_or_default()
        .to_string()
}

fn class_contains(el: &ElementRef, needles: &[&str]) -> bool {
    el.value()
        .attr("class")
        .map(|class| {
            let class = class.to_lowercase();
            needles.iter().any(|needle| class.contains(needle))
        })
        .unwrap_or(false)
}

fn is_cta(el: &ElementRef) -> bool {
    if class_contains(el, &["cta", "btn"]) {
        return true;
    }
    let text = el.text().collect::<String>().to_lowercase();
    CTA_PHRASES.iter().any(|phrase| text.contains(phrase))
}

fn is_large_image(img: &ElementRef) -> bool {
    ["width", "height"]
        .iter()
        .filter_map(|attr| img.value().attr(attr))
        .any(is_large_dimension)
}

/// Text nodes outside script-like containers, trimmed and space-joined.
fn visible_text(document: &Html) -> String {
    let mut text = String::new();
    for node in document.root_element().descendants() {
        let Some(chunk) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|el| el.name()))
            .is_some_and(|name| matches!(name, "script" | "style" | "noscript" | "template"));
        let chunk = chunk.trim();
        if hidden || chunk.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(chunk);
    }
    truncate_chars(&text, TEXT_CONTENT_LIMIT).to_string()
}

/// The first `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Whether a declared image dimension counts as large.
///
/// Plain numbers and `px` values are compared against 1200, percentages
/// against 80, `em`/`rem` against 10 and `vw`/`vh` against 50.
pub fn is_large_dimension(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    if value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse::<u64>().is_ok_and(|n| n > LARGE_PIXELS);
    }

    let lower = value.to_lowercase();
    if lower.contains('%') {
        return lower
            .replace('%', "")
            .trim()
            .parse::<f64>()
            .is_ok_and(|pct| pct > LARGE_PERCENT);
    }
    if lower.contains("px") {
        let digits = lower.replace("px", "");
        return !digits.is_empty()
            && digits.bytes().all(|b| b.is_ascii_digit())
            && digits.parse::<u64>().is_ok_and(|n| n > LARGE_PIXELS);
    }

    let threshold = if lower.contains("em") {
        LARGE_EM
    } else if lower.contains("vw") || lower.contains("vh") {
        LARGE_VIEWPORT
    } else {
        return false;
    };
    let numeric: String = lower
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    numeric.parse::<f64>().is_ok_and(|n| n > threshold)
}

/// The registrable label of a URL's host: `www.shop.example.co.uk` → `example`.
pub fn registrable_label(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = match parsed.host()? {
        url::Host::Domain(domain) => domain.trim_end_matches('.').to_lowercase(),
        url::Host::Ipv4(_) | url::Host::Ipv6(_) => return None,
    };

    let label = match psl::domain_str(&host) {
        Some(domain) => domain.split('.').next()?,
        None if !host.is_empty() && !host.contains('.') => host.as_str(),
        None => return None,
    };
    Some(label.to_string())
}

/// Whether the URL belongs to a well-known brand.
pub fn is_reputable_domain(url: &str) -> bool {
    registrable_label(url).is_some_and(|label| REPUTABLE_DOMAINS.contains(&label.as_str()))
}
