use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffPolicy {
    Constant,
    Linear,
    Exponential { factor: f32 },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Exponential { factor: 2.0 }
    }
}

/// When and how long to wait before re-issuing a failed request.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff: BackoffPolicy,
    /// Random extra wait in `0..=jitter` added to every delay.
    pub jitter: Duration,
    /// HTTP statuses worth retrying. Anything else fails immediately.
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
            jitter: Duration::from_secs(2),
            // 403 is what the search site returns when it throttles scripted clients
            retry_statuses: vec![403, 408, 429, 500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }

    /// Retries without any waiting.
    pub fn immediate(max_retries: usize) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff: BackoffPolicy::Constant,
            jitter: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Whether a request that failed with `status` on retry number `attempt`
    /// (0 = first attempt) should be tried again.
    pub fn should_retry(&self, status: u16, attempt: usize) -> bool {
        attempt < self.max_retries && self.is_retryable_status(status)
    }

    /// Backoff delay before retry `attempt + 1`, without jitter.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return std::cmp::min(self.initial_delay, self.max_delay);
        }

        let delay = match self.backoff {
            BackoffPolicy::Constant => self.initial_delay,
            BackoffPolicy::Linear => self.initial_delay * (attempt as u32 + 1),
            BackoffPolicy::Exponential { factor } => {
                let ms = self.initial_delay.as_millis() as f64 * f64::from(factor).powi(attempt as i32);
                Duration::from_millis(ms.round() as u64)
            }
        };

        std::cmp::min(delay, self.max_delay)
    }

    /// Backoff delay plus random jitter.
    pub fn jittered_delay_for(&self, attempt: usize) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.delay_for(attempt) + Duration::from_millis(extra)
    }
}
