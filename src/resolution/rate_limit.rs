//! Per-host request rate limiting shared by all workers

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Sliding-window limiter: at most `limit` requests per host in any `window`.
///
/// Independent of the worker count, so raising parallelism never raises the
/// load on a single host.
pub struct HostRateLimiter {
    limit: usize,
    window: Duration,
    history: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl HostRateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until a request to `host` fits in the window, then record it
    pub async fn acquire(&self, host: &str) {
        loop {
            let wake_at = match self.try_acquire(host, Instant::now()) {
                None => return,
                Some(at) => at,
            };
            debug!("Rate limit reached for {}, waiting", host);
            sleep_until(wake_at).await;
        }
    }

    /// Record a request if the window has room, otherwise return when the
    /// oldest request leaves the window
    fn try_acquire(&self, host: &str, now: Instant) -> Option<Instant> {
        // A poisoned lock only means another worker panicked mid-update; the
        // timestamps themselves are still usable.
        let mut history = self
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let sent = history.entry(host.to_string()).or_default();

        while sent
            .front()
            .is_some_and(|&at| now.duration_since(at) >= self.window)
        {
            sent.pop_front();
        }

        if sent.len() < self.limit {
            sent.push_back(now);
            return None;
        }

        sent.front().map(|&oldest| oldest + self.window)
    }
}
