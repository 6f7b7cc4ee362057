//! Bounded retry with exponential or fixed backoff.

use std::fmt;
use std::time::Duration;

use rand::random;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `base * 2^(attempt - 1)`, capped at `max`
    Exponential { base: Duration, max: Duration },
    Fixed(Duration),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Upper bound of the random delay added to every wait
    pub jitter: Duration,
}

/// All attempts failed; carries the last error.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub source: E,
}

impl<E: fmt::Display> fmt::Display for Exhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gave up after {} attempts: {}", self.attempts, self.source)
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for Exhausted<E> {}

impl RetryPolicy {
    pub fn exponential(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { base, max },
            jitter: Duration::ZERO,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Wait before attempt `attempt + 1`, after `attempt` failures (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }

    /// Run `op` until it succeeds or the attempts run out.
    ///
    /// `op` receives the 1-based attempt number.
    pub fn run<T, E, F>(&self, label: &str, mut op: F) -> Result<T, Exhausted<E>>
    where
        E: fmt::Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= max_attempts => {
                    log::error!("{label}: attempt {attempt}/{max_attempts} failed: {err}");
                    return Err(Exhausted {
                        attempts: attempt,
                        source: err,
                    });
                }
                Err(err) => {
                    let delay = self.delay_for(attempt) + self.jitter_sample();
                    log::warn!(
                        "{label}: attempt {attempt}/{max_attempts} failed: {err}; retrying in {}ms",
                        delay.as_millis()
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }

    fn jitter_sample(&self) -> Duration {
        let bound = self.jitter.as_millis() as u64;
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(random::<u64>() % bound)
    }
}
