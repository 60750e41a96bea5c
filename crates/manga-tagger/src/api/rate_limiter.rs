//! Request pacing for catalog clients.
//!
//! Every client owns its own limiter; two clients never share a budget.

use shared::config::RateLimitConfig;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::time::sleep;

const MINUTE: Duration = Duration::from_secs(60);

/// Per-second spacing plus a sliding per-minute window
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    max_per_minute: usize,
    last_request: Option<Instant>,
    window: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(max_per_second: f64, max_per_minute: u32) -> Self {
        let min_interval = if max_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / max_per_second)
        } else {
            Duration::ZERO
        };
        Self {
            min_interval,
            max_per_minute: max_per_minute.max(1) as usize,
            last_request: None,
            window: VecDeque::with_capacity(max_per_minute as usize),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_second, config.requests_per_minute)
    }

    fn expire(&mut self, now: Instant) {
        while let Some(&oldest) = self.window.front() {
            if now.duration_since(oldest) < MINUTE {
                break;
            }
            self.window.pop_front();
        }
    }

    /// Wait until another request fits both budgets, then record it
    pub async fn acquire(&mut self) {
        let now = Instant::now();
        self.expire(now);

        if self.window.len() >= self.max_per_minute {
            if let Some(&oldest) = self.window.front() {
                let wait = MINUTE.saturating_sub(now.duration_since(oldest));
                tracing::debug!(wait_ms = wait.as_millis() as u64, "Per-minute budget spent, waiting");
                sleep(wait).await;
            }
        }

        if let Some(last) = self.last_request {
            let wait = self.min_interval.saturating_sub(last.elapsed());
            if !wait.is_zero() {
                tracing::debug!(wait_ms = wait.as_millis() as u64, "Spacing request");
                sleep(wait).await;
            }
        }

        let sent = Instant::now();
        self.expire(sent);
        self.last_request = Some(sent);
        self.window.push_back(sent);
    }

    /// Requests made in the last minute
    pub fn recent_requests(&mut self) -> usize {
        self.expire(Instant::now());
        self.window.len()
    }
}
