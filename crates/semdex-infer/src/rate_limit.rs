//! Adaptive inter-call rate limiter for the remote embeddings API.
//!
//! Multiplicative decrease on sustained success, exponential backoff on 429s.
//! Non-rate-limited failures reset the streak without touching the delay.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

const MIN_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(120);
const DECREASE_AFTER: u32 = 3;

struct LimiterState {
    delay: Duration,
    streak: u32,
    last_call: Option<Instant>,
}

/// Single-lane adaptive limiter shared by all remote embedding calls.
pub struct RateLimiter {
    inner: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LimiterState {
                delay: MIN_DELAY,
                streak: 0,
                last_call: None,
            }),
        }
    }

    /// Sleep until the current delay has elapsed since the previous call.
    /// Holding the lane across the sleep serializes concurrent callers.
    pub async fn wait(&self) {
        let mut state = self.inner.lock().await;
        if let Some(last) = state.last_call {
            let elapsed = last.elapsed();
            if elapsed < state.delay {
                tokio::time::sleep(state.delay - elapsed).await;
            }
        }
        state.last_call = Some(Instant::now());
    }

    /// Three consecutive successes shrink the delay by 20%, floored at 1 s.
    pub async fn notify_success(&self) {
        let mut state = self.inner.lock().await;
        state.streak += 1;
        if state.streak >= DECREASE_AFTER {
            state.delay = state.delay.mul_f64(0.8).max(MIN_DELAY);
            state.streak = 0;
            debug!("rate limiter delay decreased to {:?}", state.delay);
        }
    }

    /// A rate-limited failure doubles the delay (plus 1 s), capped at 120 s.
    /// Other failures only reset the success streak.
    pub async fn notify_failure(&self, rate_limited: bool) {
        let mut state = self.inner.lock().await;
        state.streak = 0;
        if rate_limited {
            state.delay = (state.delay * 2 + Duration::from_secs(1)).min(MAX_DELAY);
            debug!("rate limiter delay increased to {:?}", state.delay);
        }
    }

    /// Current delay, exposed for tests and diagnostics.
    pub async fn current_delay(&self) -> Duration {
        self.inner.lock().await.delay
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
