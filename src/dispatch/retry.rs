use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::gemini::GeminiError;

/// Bounds applied to every retry sleep, whatever the computed or suggested delay.
pub const MIN_RETRY_SLEEP: Duration = Duration::from_secs(1);
pub const MAX_RETRY_SLEEP: Duration = Duration::from_secs(60);

/// Why an attempt failed, as far as retry timing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureReason {
    /// The service rejected the call for exceeding its quota.
    Quota,
    /// Anything else: network, 5xx, undecodable body.
    Transient,
}

impl FailureReason {
    pub fn of(err: &GeminiError) -> Self {
        if err.is_quota() {
            FailureReason::Quota
        } else {
            FailureReason::Transient
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Quota => write!(f, "quota"),
            FailureReason::Transient => write!(f, "transient"),
        }
    }
}

/// Retry budget and exponential backoff curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(1500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff after the `attempt`-th failure (1-based), before clamping:
    /// `min(base * 2^(attempt - 1), max_backoff)`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

pub fn clamp_sleep(delay: Duration) -> Duration {
    delay.clamp(MIN_RETRY_SLEEP, MAX_RETRY_SLEEP)
}

/// Outcome of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// Sleep for `delay`, then go back through admission.
    Backoff {
        attempt: u32,
        delay: Duration,
        reason: FailureReason,
    },
    /// Budget spent; surface the failure.
    Raise { attempts: u32, reason: FailureReason },
}

/// Per-dispatch retry bookkeeping. Dropped once the call succeeds or raises.
#[derive(Debug)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    pub fn on_failure(&mut self, err: &GeminiError) -> Transition {
        self.attempt += 1;
        let reason = FailureReason::of(err);

        if self.attempt >= self.policy.max_attempts {
            return Transition::Raise {
                attempts: self.attempt,
                reason,
            };
        }

        let backoff = self.policy.backoff_for_attempt(self.attempt);
        let delay = match reason {
            FailureReason::Quota => err.retry_after().unwrap_or(backoff),
            FailureReason::Transient => backoff,
        };

        Transition::Backoff {
            attempt: self.attempt,
            delay: clamp_sleep(delay),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> GeminiError {
        GeminiError::Api {
            status: 500,
            message: "internal".into(),
        }
    }

    fn quota(hint: Option<Duration>) -> GeminiError {
        GeminiError::QuotaExceeded {
            retry_after: hint,
            message: "exhausted".into(),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        let secs: Vec<f64> = (1..=7)
            .map(|k| policy.backoff_for_attempt(k).as_secs_f64())
            .collect();
        assert_eq!(secs, vec![1.5, 3.0, 6.0, 12.0, 24.0, 30.0, 30.0]);
    }

    #[test]
    fn backoff_survives_huge_attempt_numbers() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for_attempt(200), Duration::from_secs(30));
    }

    #[test]
    fn transient_delays_follow_the_curve_clamped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(90),
        };
        let mut state = RetryState::new(policy);
        let mut delays = Vec::new();
        for _ in 0..9 {
            match state.on_failure(&transient()) {
                Transition::Backoff { delay, reason, .. } => {
                    assert_eq!(reason, FailureReason::Transient);
                    delays.push(delay);
                }
                Transition::Raise { .. } => panic!("raised early"),
            }
        }
        for (i, delay) in delays.iter().enumerate() {
            let k = i as u32 + 1;
            assert_eq!(*delay, clamp_sleep(policy.backoff_for_attempt(k)));
        }
        // 0.25 s and 0.5 s are lifted to the floor; 64 s and up hit the ceiling.
        assert_eq!(delays[0], MIN_RETRY_SLEEP);
        assert_eq!(delays[1], MIN_RETRY_SLEEP);
        assert_eq!(delays[2], Duration::from_secs(1));
        assert_eq!(delays[3], Duration::from_secs(2));
        assert_eq!(delays[8], MAX_RETRY_SLEEP);
    }

    #[test]
    fn quota_prefers_server_hint() {
        let mut state = RetryState::new(RetryPolicy::default());
        let t = state.on_failure(&quota(Some(Duration::from_secs(10))));
        assert_eq!(
            t,
            Transition::Backoff {
                attempt: 1,
                delay: Duration::from_secs(10),
                reason: FailureReason::Quota,
            }
        );
    }

    #[test]
    fn quota_without_hint_uses_backoff() {
        let mut state = RetryState::new(RetryPolicy::default());
        let t = state.on_failure(&quota(None));
        assert_eq!(
            t,
            Transition::Backoff {
                attempt: 1,
                delay: Duration::from_millis(1500),
                reason: FailureReason::Quota,
            }
        );
    }

    #[test]
    fn server_hint_is_clamped() {
        let mut state = RetryState::new(RetryPolicy::default());
        match state.on_failure(&quota(Some(Duration::from_millis(200)))) {
            Transition::Backoff { delay, .. } => assert_eq!(delay, MIN_RETRY_SLEEP),
            t => panic!("unexpected {t:?}"),
        }
        match state.on_failure(&quota(Some(Duration::from_secs(300)))) {
            Transition::Backoff { delay, .. } => assert_eq!(delay, MAX_RETRY_SLEEP),
            t => panic!("unexpected {t:?}"),
        }
    }

    #[test]
    fn raises_on_last_attempt() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        let mut state = RetryState::new(policy);
        assert!(matches!(state.on_failure(&transient()), Transition::Backoff { attempt: 1, .. }));
        assert!(matches!(state.on_failure(&transient()), Transition::Backoff { attempt: 2, .. }));
        assert_eq!(
            state.on_failure(&quota(None)),
            Transition::Raise {
                attempts: 3,
                reason: FailureReason::Quota,
            }
        );
    }

    #[test]
    fn reason_display() {
        assert_eq!(FailureReason::Quota.to_string(), "quota");
        assert_eq!(FailureReason::Transient.to_string(), "transient");
        assert_eq!(FailureReason::of(&transient()), FailureReason::Transient);
    }
}
