//! Fixed-window request limiter keyed by caller identifier
//!
//! Each key gets a counter and a reset instant. The first request after the
//! reset instant opens a new window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// Outcome of one [`FixedWindowLimiter::check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateDecision {
    /// Convert a refusal into the 429 API error
    pub fn into_result(self) -> Result<u32, ApiError> {
        match self {
            RateDecision::Allowed { remaining } => Ok(remaining),
            RateDecision::Limited { retry_after } => Err(ApiError::RateLimited {
                // Round up so clients never retry inside the window
                retry_after_secs: retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0),
            }),
        }
    }
}

#[derive(Clone)]
pub struct FixedWindowLimiter {
    windows: Arc<Mutex<HashMap<String, Window>>>,
    max_requests: u32,
    window: Duration,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    pub async fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now()).await
    }

    /// Count one request for `key` at `now`
    pub async fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut windows = self.windows.lock().await;
        let window = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            reset_at: now + self.window,
        });

        if now >= window.reset_at {
            window.count = 0;
            window.reset_at = now + self.window;
        }

        if window.count >= self.max_requests {
            let retry_after = window.reset_at.saturating_duration_since(now);
            debug!(key, ?retry_after, "Rate limit reached");
            return RateDecision::Limited { retry_after };
        }

        window.count += 1;
        RateDecision::Allowed {
            remaining: self.max_requests - window.count,
        }
    }

    /// Drop windows that have already expired
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, w| w.reset_at > now);
        before - windows.len()
    }

    pub async fn tracked_keys(&self) -> usize {
        self.windows.lock().await.len()
    }
}
