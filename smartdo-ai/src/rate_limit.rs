//! Fixed-window request limiter keyed by caller.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::RateLimitError;

pub const DEFAULT_REQUESTS_PER_WINDOW: u32 = 10;
pub const DEFAULT_WINDOW_SECS: i64 = 60;

/// Windows idle for this long are dropped on the next check.
const STALE_AFTER_SECS: i64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::seconds(DEFAULT_WINDOW_SECS),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_minute(DEFAULT_REQUESTS_PER_WINDOW)
    }
}

#[derive(Debug, Clone)]
struct Window {
    started: DateTime<Utc>,
    count: u32,
}

/// One caller's window, as written to disk between processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub caller: String,
    pub started: DateTime<Utc>,
    pub count: u32,
}

#[derive(Debug, Default)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Window>> {
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn check(&self, caller: &str) -> Result<(), RateLimitError> {
        self.check_at(caller, Utc::now())
    }

    /// Count one request for `caller` at `now`, or reject it.
    ///
    /// Rejected requests do not count against the window.
    pub fn check_at(&self, caller: &str, now: DateTime<Utc>) -> Result<(), RateLimitError> {
        let mut windows = self.lock();
        windows.retain(|_, w| (now - w.started).num_seconds() < STALE_AFTER_SECS);

        let window = windows.entry(caller.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now - window.started >= self.config.window {
            window.started = now;
            window.count = 0;
        }

        if window.count >= self.config.max_requests {
            let reset = window.started + self.config.window;
            let retry_after_secs = (reset - now).num_seconds().max(1) as u64;
            debug!(caller, retry_after_secs, "rate limit hit");
            return Err(RateLimitError::Exceeded {
                caller: caller.to_string(),
                retry_after_secs,
            });
        }

        window.count += 1;
        debug!(caller, count = window.count, "rate limit check passed");
        Ok(())
    }

    /// Requests left for `caller` in its current window.
    pub fn remaining_at(&self, caller: &str, now: DateTime<Utc>) -> u32 {
        match self.lock().get(caller) {
            Some(w) if now - w.started < self.config.window => {
                self.config.max_requests.saturating_sub(w.count)
            }
            _ => self.config.max_requests,
        }
    }

    /// Windows still open at `now`, sorted by caller.
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> Vec<WindowSnapshot> {
        let mut out: Vec<WindowSnapshot> = self
            .lock()
            .iter()
            .filter(|(_, w)| now - w.started < self.config.window)
            .map(|(caller, w)| WindowSnapshot {
                caller: caller.clone(),
                started: w.started,
                count: w.count,
            })
            .collect();
        out.sort_by(|a, b| a.caller.cmp(&b.caller));
        out
    }

    /// Load windows written by `snapshot_at`, skipping ones already closed.
    /// Windows started in the future (clock skew) are ignored too.
    pub fn restore_at(&self, windows: Vec<WindowSnapshot>, now: DateTime<Utc>) -> usize {
        let mut map = self.lock();
        let mut loaded = 0;
        for w in windows {
            let age = now - w.started;
            if age < Duration::zero() || age >= self.config.window {
                continue;
            }
            map.insert(
                w.caller,
                Window {
                    started: w.started,
                    count: w.count,
                },
            );
            loaded += 1;
        }
        loaded
    }
}
