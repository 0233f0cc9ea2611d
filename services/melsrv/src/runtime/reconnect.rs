//! Reconnection mechanism implementation
//!
//! Retries a connect function under a policy. The default policy retries
//! forever with a fixed delay; exponential backoff and jitter are opt-in.

use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reconnection error types
#[derive(Error, Debug)]
pub enum ReconnectError {
    /// Maximum retry attempts exceeded
    #[error("Maximum reconnection attempts exceeded")]
    MaxAttemptsExceeded,

    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Reconnection was cancelled
    #[error("Reconnection cancelled")]
    Cancelled,
}

/// Reconnection policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Maximum retry attempts (0 means unlimited)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Backoff multiplier (1.0 keeps the delay fixed)
    pub backoff_multiplier: f64,
    /// Whether to add ±25% jitter to delays
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

impl ReconnectPolicy {
    /// Fixed-delay policy that never gives up
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay.max(Duration::from_secs(60)),
            ..Self::default()
        }
    }
}

/// Connect retry loop with backoff
#[derive(Debug)]
pub struct ReconnectHelper {
    policy: ReconnectPolicy,
    /// Attempts made since the last successful connect
    current_attempt: u32,
}

impl ReconnectHelper {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            current_attempt: 0,
        }
    }

    /// Delay before the next attempt, based on failures so far
    pub fn calculate_next_delay(&self) -> Duration {
        let attempt = self.current_attempt.saturating_sub(1);
        let base_delay = self.policy.initial_delay;
        let multiplier = self.policy.backoff_multiplier.max(1.0);

        // delay = initial_delay * (multiplier ^ attempt)
        let factor = multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let mut delay = if factor.is_finite() {
            base_delay.mul_f64(factor.min(1e9))
        } else {
            self.policy.max_delay
        };

        if delay > self.policy.max_delay {
            delay = self.policy.max_delay;
        }

        if self.policy.jitter {
            let jitter_range = delay.as_millis() as f64 * 0.25;
            if jitter_range > 0.0 {
                let jitter = rand::thread_rng().gen_range(-jitter_range..jitter_range);
                let delay_ms = (delay.as_millis() as f64 + jitter).max(0.0);
                delay = Duration::from_millis(delay_ms as u64);
            }
        }

        delay
    }

    /// Execute one reconnection attempt
    ///
    /// The first attempt after a disconnect runs immediately; later attempts
    /// wait for the policy delay first. Cancellation during the wait aborts
    /// without attempting.
    pub async fn execute_reconnect<F, Fut, T, E>(
        &mut self,
        cancel: &CancellationToken,
        mut connect_fn: F,
    ) -> Result<T, ReconnectError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        if self.policy.max_attempts > 0 && self.current_attempt >= self.policy.max_attempts {
            warn!(
                "Maximum reconnection attempts ({}) exceeded",
                self.policy.max_attempts
            );
            return Err(ReconnectError::MaxAttemptsExceeded);
        }

        if self.current_attempt > 0 {
            let delay = self.calculate_next_delay();
            debug!("Waiting {:?} before reconnection attempt", delay);
            tokio::select! {
                _ = cancel.cancelled() => return Err(ReconnectError::Cancelled),
                _ = tokio::time::sleep(delay) => {},
            }
        }

        self.current_attempt += 1;

        debug!(
            "Connection attempt {}/{}",
            self.current_attempt,
            if self.policy.max_attempts == 0 {
                "∞".to_string()
            } else {
                self.policy.max_attempts.to_string()
            }
        );

        let start_time = Instant::now();

        match connect_fn().await {
            Ok(connection) => {
                info!(
                    "Connected after {:?} (attempt {})",
                    start_time.elapsed(),
                    self.current_attempt
                );
                self.current_attempt = 0;
                Ok(connection)
            },
            Err(e) => {
                warn!("Connection attempt {} failed: {}", self.current_attempt, e);
                Err(ReconnectError::ConnectionFailed(e.to_string()))
            },
        }
    }

    /// Retry until connected, cancelled or out of attempts
    pub async fn reconnect_until_connected<F, Fut, T, E>(
        &mut self,
        cancel: &CancellationToken,
        mut connect_fn: F,
    ) -> Result<T, ReconnectError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        loop {
            if cancel.is_cancelled() {
                return Err(ReconnectError::Cancelled);
            }
            match self.execute_reconnect(cancel, &mut connect_fn).await {
                Ok(connection) => return Ok(connection),
                Err(ReconnectError::ConnectionFailed(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
