//! Adaptive limiter gating every call to the source. Consecutive errors widen the
//! minimum spacing between calls; an upstream rate-limit signal opens a cooldown window.
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

const COOLDOWN_STEP: Duration = Duration::from_secs(60);
const COOLDOWN_MAX: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSnapshot {
    pub consecutive_errors: u32,
    pub cooling_down: bool,
}

#[derive(Debug)]
struct LimiterState {
    last_call: Option<Instant>,
    consecutive_errors: u32,
    cooldown_until: Option<Instant>,
}

pub struct RateLimiter {
    min_delay: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            state: Mutex::new(LimiterState {
                last_call: None,
                consecutive_errors: 0,
                cooldown_until: None,
            }),
        }
    }

    /// Effective spacing for the current error streak: `min_delay * (1 + 0.5 * errors)`.
    pub fn adaptive_delay(min_delay: Duration, consecutive_errors: u32) -> Duration {
        min_delay.mul_f64(1.0 + 0.5 * consecutive_errors as f64)
    }

    /// Cooldown opened by a rate-limit signal: one minute per error in the streak, at
    /// most five.
    pub fn cooldown_for(consecutive_errors: u32) -> Duration {
        COOLDOWN_STEP
            .saturating_mul(consecutive_errors)
            .min(COOLDOWN_MAX)
    }

    /// Waits until the next call may go out. The lock is held across the wait so calls
    /// leave strictly one at a time.
    pub async fn acquire(&self) {
        let mut st = self.state.lock().await;

        if let Some(until) = st.cooldown_until {
            if Instant::now() < until {
                let wait = until - Instant::now();
                warn!(wait_ms = wait.as_millis() as u64, "Rate limit cooldown");
                sleep_until(until).await;
            }
            st.cooldown_until = None;
        }

        if let Some(last) = st.last_call {
            let ready_at = last + Self::adaptive_delay(self.min_delay, st.consecutive_errors);
            if Instant::now() < ready_at {
                debug!(
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    errors = st.consecutive_errors,
                    "Rate limit wait"
                );
                sleep_until(ready_at).await;
            }
        }

        st.last_call = Some(Instant::now());
    }

    pub async fn report_success(&self) {
        let mut st = self.state.lock().await;
        st.consecutive_errors = st.consecutive_errors.saturating_sub(1);
    }

    pub async fn report_error(&self, rate_limited: bool) {
        let mut st = self.state.lock().await;
        st.consecutive_errors += 1;
        if rate_limited {
            let cooldown = Self::cooldown_for(st.consecutive_errors);
            st.cooldown_until = Some(Instant::now() + cooldown);
            warn!(
                cooldown_s = cooldown.as_secs(),
                consecutive_errors = st.consecutive_errors,
                "Rate limit hit"
            );
        }
    }

    pub async fn snapshot(&self) -> LimiterSnapshot {
        let st = self.state.lock().await;
        LimiterSnapshot {
            consecutive_errors: st.consecutive_errors,
            cooling_down: st.cooldown_until.is_some_and(|u| Instant::now() < u),
        }
    }
}
