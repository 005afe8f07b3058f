pub mod api;
pub mod cache;
pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod rate_limit;
pub mod report;
pub mod scraper;
pub mod session;

use std::sync::Arc;

use cache::ContentCache;
use config::Config;
use error::{AppError, Result};
use llm::{GeminiClient, LanguageModel};
use rate_limit::{RateLimitedModel, RateLimiter};
use crate::scraper::{HttpFetcher, PageFetcher};
use session::SessionStore;

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionStore>,
    pub pages: Arc<ContentCache>,
    /// Rate-limited model used by every handler.
    pub model: Arc<dyn LanguageModel>,
}

impl AppState {
    /// Wire up the HTTP fetcher and the Gemini client from configuration.
    pub fn new(config: Config) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout)?);
        let gemini = GeminiClient::new(
            &config.gemini_api_key,
            &config.gemini_model,
            &config.gemini_base_url,
        )
        .map_err(|e| AppError::ConfigError(format!("Failed to configure Gemini API: {}", e)))?;

        Ok(Self::with_components(config, fetcher, Arc::new(gemini)))
    }

    /// Build state around an arbitrary fetcher and model; the model is wrapped
    /// in the configured rate limiter.
    pub fn with_components(
        config: Config,
        fetcher: Arc<dyn PageFetcher>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        let limiter = RateLimiter::new(config.rate_limit_max_requests, config.rate_limit_window);
        let model = RateLimitedModel::new(model, limiter, config.rate_limit_backoff);
        let pages = ContentCache::new(
            fetcher,
            config.content_cache_ttl,
            config.content_cache_persistent,
        );

        Self {
            sessions: Arc::new(SessionStore::new(config.session_idle_timeout)),
            pages: Arc::new(pages),
            model: Arc::new(model),
            config: Arc::new(config),
        }
    }
}
