//! In-memory per-visitor state keyed by the `session_id` cookie.
//!
//! Idle sessions are only evicted when [`SessionStore::sweep`] runs, which the
//! HTTP layer triggers from a few endpoints rather than on a timer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::report::AnalysisReport;
use crate::scraper::WebsiteSignals;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Last activity; `None` until the session is first stamped.
    pub timestamp: Option<DateTime<Utc>>,
    pub last_url: Option<String>,
    pub website_signals: Option<Arc<WebsiteSignals>>,
    pub analysis: Option<AnalysisReport>,
    pub history: Vec<ChatTurn>,
}

pub struct SessionStore {
    idle_timeout: Duration,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the session, creating and stamping it if absent.
    pub fn get_or_create(&self, session_id: &str) -> Session {
        self.lock()
            .entry(session_id.to_string())
            .or_insert_with(|| Session {
                timestamp: Some(Utc::now()),
                ..Session::default()
            })
            .clone()
    }

    /// Refresh the activity timestamp of an existing session.
    pub fn touch(&self, session_id: &str) -> bool {
        match self.lock().get_mut(session_id) {
            Some(session) => {
                session.timestamp = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Apply `f` to the session, creating an unstamped one if absent.
    pub fn update<R>(&self, session_id: &str, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut sessions = self.lock();
        f(sessions.entry(session_id.to_string()).or_default())
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.lock().get(session_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Stamp unstamped sessions and drop those idle longer than the timeout.
    /// Returns how many were removed.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = chrono::Duration::from_std(self.idle_timeout)
            .ok()
            .and_then(|idle| now.checked_sub_signed(idle));

        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|session_id, session| match session.timestamp {
            None => {
                session.timestamp = Some(now);
                true
            }
            Some(ts) if cutoff.is_some_and(|cutoff| ts < cutoff) => {
                info!(session_id = %session_id, "removing idle session");
                false
            }
            Some(_) => true,
        });
        before - sessions.len()
    }
}
