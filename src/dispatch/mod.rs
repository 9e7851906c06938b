//! Rate-limited, retrying dispatch of translation calls.
//!
//! A [`Dispatcher`] owns the call window and the retry policy for a whole
//! build run. Every call goes through admission (sliding 60 s window capped at
//! `rpm` calls), then the generator; failures are classified and retried with
//! exponential backoff until the attempt budget is spent.
//!
//! Per call:
//!
//! ```text
//! ADMITTED → CALLING → SUCCESS
//!                    → FAILED (attempt < max)  → BACKOFF → ADMITTED
//!                    → FAILED (attempt == max) → RAISED
//! ```
//!
//! `dispatch` takes `&mut self`, so the window check and the append that
//! follows it can never interleave with another call.

mod retry;
mod window;

pub use retry::{FailureReason, RetryPolicy, RetryState, Transition};
pub use window::CallWindow;

use serde::Serialize;
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::gemini::{ContentGenerator, GeminiError, GenerateRequest, GenerateResponse};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchConfig {
    /// Maximum calls admitted in any trailing 60 s window.
    pub rpm: u32,
    pub retry: RetryPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            rpm: 12,
            retry: RetryPolicy::default(),
        }
    }
}

/// Counters reported in the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Attempts that reached the generator.
    pub calls: u32,
    pub retries: u32,
    pub throttle_waits: u32,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("gave up after {attempts} attempt(s), last failure ({reason}): {last}")]
    RetryExhausted {
        attempts: u32,
        reason: FailureReason,
        #[source]
        last: GeminiError,
    },
}

pub struct Dispatcher<G> {
    generator: G,
    window: CallWindow,
    config: DispatchConfig,
    stats: DispatchStats,
}

impl<G: ContentGenerator> Dispatcher<G> {
    pub fn new(generator: G, config: DispatchConfig) -> Self {
        Self {
            generator,
            window: CallWindow::new(config.rpm),
            config,
            stats: DispatchStats::default(),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    #[cfg(test)]
    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Issues `req`, retrying until it succeeds or the attempt budget is spent.
    ///
    /// `target` names the document the call is for and only appears in logs.
    pub async fn dispatch(
        &mut self,
        target: &str,
        req: &GenerateRequest,
    ) -> Result<GenerateResponse, DispatchError> {
        let mut retry = RetryState::new(self.config.retry);
        let max = self.config.retry.max_attempts;

        loop {
            self.admit(target).await;
            self.stats.calls += 1;

            let err = match self.generator.generate(req).await {
                Ok(resp) => return Ok(resp),
                Err(err) => err,
            };

            match retry.on_failure(&err) {
                Transition::Backoff {
                    attempt,
                    delay,
                    reason,
                } => {
                    self.stats.retries += 1;
                    warn!(
                        file = target,
                        stage = "retry",
                        attempt,
                        max,
                        %reason,
                        retry_delay = delay.as_secs_f64(),
                        error = %err,
                        "retry {attempt}/{max} ({reason}) in {:.1}s",
                        delay.as_secs_f64()
                    );
                    sleep(delay).await;
                }
                Transition::Raise { attempts, reason } => {
                    warn!(
                        file = target,
                        stage = "retry",
                        attempt = attempts,
                        max,
                        %reason,
                        error = %err,
                        "giving up after {attempts}/{max} attempts ({reason})"
                    );
                    return Err(DispatchError::RetryExhausted {
                        attempts,
                        reason,
                        last: err,
                    });
                }
            }
        }
    }

    /// Suspends until the window has room, then records the call.
    async fn admit(&mut self, target: &str) {
        loop {
            let now = Instant::now();
            match self.window.admission_delay(now) {
                None => {
                    self.window.record(now);
                    debug!(file = target, in_window = self.window.len(), "call admitted");
                    return;
                }
                Some(wait) => {
                    self.stats.throttle_waits += 1;
                    info!(
                        file = target,
                        stage = "throttle",
                        wait = wait.as_secs_f64(),
                        rpm = self.config.rpm,
                        "throttle: waiting {:.2}s (rpm={})",
                        wait.as_secs_f64(),
                        self.config.rpm
                    );
                    sleep(wait).await;
                }
            }
        }
    }
}
