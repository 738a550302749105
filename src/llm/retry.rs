use std::future::Future;
use std::time::Duration;

use rand::Rng;

use super::LlmError;

/// Capped exponential backoff with random jitter for transient backend errors.
///
/// The wait before retry `n` is drawn uniformly between `base_delay` and
/// `min(max_delay, base_delay * 2^(n-1))`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// No waiting between attempts.
    #[cfg(test)]
    pub fn immediate() -> Self {
        Self::default()
            .with_base_delay(Duration::ZERO)
            .with_max_delay(Duration::ZERO)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let exp = 2f64.powi(attempt.saturating_sub(1).min(30) as i32);
        let ceiling = (base * exp).min(self.max_delay.as_secs_f64());

        if ceiling <= base {
            return self.base_delay;
        }

        Duration::from_secs_f64(rand::thread_rng().gen_range(base..=ceiling))
    }

    /// Run `op` until it succeeds, fails permanently, or the attempt budget
    /// is spent. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    tracing::warn!(
                        "{} failed: {}; retrying in {:?} (attempt {}/{})",
                        label,
                        e,
                        delay,
                        attempt,
                        self.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
