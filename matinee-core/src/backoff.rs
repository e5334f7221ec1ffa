use std::time::Duration;

/// Caps the exponent so the multiplier cannot overflow
const MAX_EXPONENT: u32 = 16;

/// Capped exponential delay policy for re-establishing a lost transport.
///
/// Every failed attempt doubles the delay up to a ceiling. Once the
/// allowed attempts are spent the policy reports exhaustion and the
/// caller is expected to stop retrying until something external, like
/// an explicit user action, calls [`Backoff::reset`].
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
            attempt: 0,
        }
    }

    /// Returns the delay to wait before the next attempt, or `None`
    /// once the attempts are spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }

        let exponent = self.attempt.min(MAX_EXPONENT);
        let delay = self
            .base
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.cap);

        self.attempt += 1;
        Some(delay)
    }

    /// How many attempts were handed out since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Forgets previous failures, called after an attempt succeeds
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
