use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Sliding-window limiter keyed by client address.
#[derive(Debug, Clone)]
pub struct ClientRateLimiter {
    inner: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    window: Duration,
    max_requests: usize,
}

impl ClientRateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            window,
            max_requests: max_requests.max(1),
        }
    }

    /// Records a request for `key`. `Err` carries the time until the oldest
    /// request in the window expires.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), Duration> {
        let mut guard = self.inner.lock();
        let window = self.window;
        guard.retain(|_, hits| {
            hits.back()
                .map(|last| now.duration_since(*last) <= window)
                .unwrap_or(false)
        });

        let hits = guard.entry(key.to_string()).or_default();
        while let Some(front) = hits.front() {
            if now.duration_since(*front) > window {
                hits.pop_front();
            } else {
                break;
            }
        }

        if hits.len() >= self.max_requests {
            let retry_after = hits
                .front()
                .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(window);
            return Err(retry_after);
        }

        hits.push_back(now);
        Ok(())
    }

    pub fn tracked_clients(&self) -> usize {
        self.inner.lock().len()
    }
}
