//! Rolling-window throttle for outbound model calls.
//!
//! `RateLimiter` tracks the instants of recent calls and an optional
//! forced-retry deadline set after the service reports an exhausted quota.
//! `RateLimitedModel` composes a limiter around any [`LanguageModel`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::llm::{LanguageModel, ModelError};

/// Longest forced pause honored after a quota error.
pub const MAX_PENALTY: Duration = Duration::from_secs(3600);

#[derive(Default)]
struct LimiterState {
    calls: VecDeque<Instant>,
    retry_until: Option<Instant>,
}

impl LimiterState {
    /// How long to wait before a call may be issued, or `None` if it may go now.
    fn wait_needed(&mut self, now: Instant, max_requests: usize, window: Duration) -> Option<Duration> {
        if let Some(deadline) = self.retry_until {
            if deadline > now {
                return Some(deadline - now);
            }
            self.retry_until = None;
        }

        while let Some(&oldest) = self.calls.front() {
            if now.duration_since(oldest) >= window {
                self.calls.pop_front();
            } else {
                break;
            }
        }

        if self.calls.len() >= max_requests {
            let oldest = self.calls.front().copied()?;
            return Some((oldest + window).saturating_duration_since(now));
        }
        None
    }
}

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Wait until one more call fits in the window, then record it.
    ///
    /// The lock only covers the bookkeeping; the sleep happens outside it and
    /// the check is repeated on wake-up.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                let now = Instant::now();
                match state.wait_needed(now, self.max_requests, self.window) {
                    Some(wait) if !wait.is_zero() => wait,
                    _ => {
                        state.calls.push_back(now);
                        return;
                    }
                }
            };

            debug!(wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Hold every caller back until `delay` (at most [`MAX_PENALTY`]) has passed.
    pub fn penalize(&self, delay: Duration) {
        let now = Instant::now();
        let deadline = now.checked_add(delay.min(MAX_PENALTY)).unwrap_or(now);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.retry_until = Some(deadline);
    }

    /// Calls recorded inside the current window.
    pub fn in_flight_window(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        state
            .calls
            .iter()
            .filter(|&&ts| now.duration_since(ts) < self.window)
            .count()
    }
}

/// A [`LanguageModel`] that throttles the wrapped model and retries once on quota errors.
pub struct RateLimitedModel {
    inner: Arc<dyn LanguageModel>,
    limiter: RateLimiter,
    default_backoff: Duration,
}

impl RateLimitedModel {
    pub fn new(inner: Arc<dyn LanguageModel>, limiter: RateLimiter, default_backoff: Duration) -> Self {
        Self {
            inner,
            limiter,
            default_backoff,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

#[async_trait]
impl LanguageModel for RateLimitedModel {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        self.limiter.acquire().await;

        match self.inner.generate(prompt).await {
            Err(err) if err.is_quota_exceeded() => {
                let delay = err.retry_after().unwrap_or(self.default_backoff);
                warn!(retry_after_secs = delay.as_secs_f64(), error = %err, "model quota exceeded, retrying once");
                self.limiter.penalize(delay);
                self.limiter.acquire().await;
                self.inner.generate(prompt).await
            }
            result => result,
        }
    }
}
