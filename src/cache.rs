//! Per-URL memo of fetched-and-extracted page signals.
//!
//! Two layers sit in front of the fetcher: a TTL layer and an optional
//! secondary layer without expiry. Keys are the exact URL strings; failures
//! are never stored, so a broken URL is re-fetched on every request.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::scraper::{extract_signals, PageFetcher, WebsiteSignals};

struct CachedPage {
    signals: Arc<WebsiteSignals>,
    fetched_at: Instant,
}

impl CachedPage {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

pub struct ContentCache {
    fetcher: Arc<dyn PageFetcher>,
    ttl: Duration,
    persistent: bool,
    fresh: Mutex<HashMap<String, CachedPage>>,
    persisted: Mutex<HashMap<String, Arc<WebsiteSignals>>>,
}

impl ContentCache {
    pub fn new(fetcher: Arc<dyn PageFetcher>, ttl: Duration, persistent: bool) -> Self {
        Self {
            fetcher,
            ttl,
            persistent,
            fresh: Mutex::new(HashMap::new()),
            persisted: Mutex::new(HashMap::new()),
        }
    }

    /// Return cached signals for `url`, fetching and extracting on a miss.
    pub async fn get_or_fetch(&self, url: &str) -> Result<Arc<WebsiteSignals>> {
        if let Some(signals) = self.lookup(url) {
            return Ok(signals);
        }

        info!(url, "fetching website content");
        let started = std::time::Instant::now();
        let html = match self.fetcher.fetch(url).await {
            Ok(html) => html,
            Err(err) => {
                warn!(url, error = %err, "website fetch failed");
                return Err(err);
            }
        };
        let signals = Arc::new(extract_signals(&html, url));
        info!(url, elapsed_ms = started.elapsed().as_millis() as u64, "extracted website signals");

        self.store(url, signals.clone());
        Ok(signals)
    }

    fn lookup(&self, url: &str) -> Option<Arc<WebsiteSignals>> {
        {
            let fresh = self.fresh.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(page) = fresh.get(url).filter(|page| page.is_fresh(self.ttl)) {
                debug!(url, "content cache hit");
                return Some(page.signals.clone());
            }
        }

        if !self.persistent {
            return None;
        }
        let persisted = self.persisted.lock().unwrap_or_else(PoisonError::into_inner);
        let hit = persisted.get(url).cloned();
        if hit.is_some() {
            debug!(url, "persistent content cache hit");
        }
        hit
    }

    fn store(&self, url: &str, signals: Arc<WebsiteSignals>) {
        self.fresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                url.to_string(),
                CachedPage {
                    signals: signals.clone(),
                    fetched_at: Instant::now(),
                },
            );
        if self.persistent {
            self.persisted
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(url.to_string(), signals);
        }
    }

    /// Number of URLs held by the TTL layer, stale entries included.
    pub fn len(&self) -> usize {
        self.fresh.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
