//! Rolling request budget for an upstream question source

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Allows at most `max_requests` within any trailing `window`.
/// Clones share the same budget.
#[derive(Debug, Clone)]
pub struct RollingBudget {
    /// Start times of requests still inside the window
    requests: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: u32,
    window: Duration,
}

impl RollingBudget {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Arc::new(Mutex::new(VecDeque::new())),
            max_requests,
            window,
        }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Take one request from the budget.
    /// Returns true if allowed, false if exhausted
    pub async fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now()).await
    }

    async fn try_acquire_at(&self, now: Instant) -> bool {
        let mut requests = self.requests.lock().await;
        while let Some(front) = requests.front() {
            if now.duration_since(*front) >= self.window {
                requests.pop_front();
            } else {
                break;
            }
        }

        if requests.len() as u32 >= self.max_requests {
            return false;
        }
        requests.push_back(now);
        true
    }

    pub async fn remaining(&self) -> u32 {
        let now = Instant::now();
        let requests = self.requests.lock().await;
        let used = requests
            .iter()
            .filter(|at| now.duration_since(**at) < self.window)
            .count() as u32;
        self.max_requests.saturating_sub(used)
    }
}
