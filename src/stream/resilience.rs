//! # Resilience — Rate Limiter, Circuit Breaker, Retry
//!
//! Optional wrappers around orchestrator operations per spec.md §4.6:
//! a token-bucket [`RateLimiter`], a three-state [`CircuitBreaker`], and
//! an exponential-backoff [`retry_with_backoff`]. None of these alter the
//! codec's correctness contracts — they only decide whether and when an
//! operation is allowed to run.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

use crate::config::ResilienceConfig;
use crate::error::{StreamError, StreamResult};

/// A token bucket: `capacity` tokens, refilled continuously at
/// `rate_per_sec`. `try_acquire` takes one token or fails
/// `RateLimitExceeded` without blocking.
pub struct RateLimiter {
    capacity: f64,
    rate_per_sec: f64,
    state: Mutex<(f64, Instant)>,
}

impl RateLimiter {
    pub fn new(rate_per_sec: u32) -> Self {
        let rate = rate_per_sec as f64;
        RateLimiter {
            capacity: rate,
            rate_per_sec: rate,
            state: Mutex::new((rate, Instant::now())),
        }
    }

    fn refill(&self, state: &mut (f64, Instant)) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.1).as_secs_f64();
        state.0 = (state.0 + elapsed * self.rate_per_sec).min(self.capacity);
        state.1 = now;
    }

    pub fn try_acquire(&self) -> StreamResult<()> {
        let mut state = self.state.lock();
        self.refill(&mut state);
        if state.0 >= 1.0 {
            state.0 -= 1.0;
            Ok(())
        } else {
            Err(StreamError::RateLimitExceeded)
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Trips to `Open` after `failure_threshold` consecutive failures; after
/// `reset_after`, moves to `HalfOpen` to let one trial call through. A
/// successful `HalfOpen` call closes the circuit; a failed one reopens it.
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_after: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(cfg: ResilienceConfig) -> Self {
        CircuitBreaker {
            failure_threshold: cfg.circuit_failure_threshold,
            reset_after: Duration::from_secs(cfg.circuit_reset_after_secs),
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        let mut s = self.state.lock();
        self.maybe_half_open(&mut s);
        s.state
    }

    fn maybe_half_open(&self, s: &mut BreakerState) {
        if s.state == CircuitState::Open {
            if let Some(opened_at) = s.opened_at {
                if opened_at.elapsed() >= self.reset_after {
                    s.state = CircuitState::HalfOpen;
                }
            }
        }
    }

    /// Checks whether a call is currently allowed; callers MUST back off
    /// (not retry) on `CircuitOpen`.
    pub fn guard(&self) -> StreamResult<()> {
        let mut s = self.state.lock();
        self.maybe_half_open(&mut s);
        match s.state {
            CircuitState::Open => Err(StreamError::CircuitOpen),
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
        }
    }

    pub fn record_success(&self) {
        let mut s = self.state.lock();
        s.consecutive_failures = 0;
        s.state = CircuitState::Closed;
        s.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut s = self.state.lock();
        s.consecutive_failures += 1;
        if s.state == CircuitState::HalfOpen || s.consecutive_failures >= self.failure_threshold {
            s.state = CircuitState::Open;
            s.opened_at = Some(Instant::now());
            warn!(
                target: "primechunk::stream::resilience",
                failures = s.consecutive_failures,
                "circuit breaker opened"
            );
        }
    }
}

/// Retries `op` up to `cfg.max_retries` times with exponential backoff
/// (`base_delay * 2^attempt`), only for errors the caller's closure marks
/// retryable via [`StreamError::TransientError`] or `Timeout`. A
/// `CircuitOpen` error is never retried, per spec.md §7's propagation
/// policy.
pub async fn retry_with_backoff<T, F, Fut>(cfg: &ResilienceConfig, mut op: F) -> StreamResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = StreamResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(StreamError::CircuitOpen) => return Err(StreamError::CircuitOpen),
            Err(e) if is_retryable(&e) && attempt < cfg.max_retries => {
                let delay = cfg.retry_base_delay_ms * (1u64 << attempt);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_retryable(e: &StreamError) -> bool {
    matches!(
        e,
        StreamError::TransientError { retryable: true, .. } | StreamError::Timeout
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_allows_up_to_capacity_then_rejects() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        assert!(matches!(
            limiter.try_acquire(),
            Err(StreamError::RateLimitExceeded)
        ));
    }

    #[test]
    fn circuit_breaker_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(ResilienceConfig {
            circuit_failure_threshold: 3,
            circuit_reset_after_secs: 100,
            ..ResilienceConfig::default()
        });
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(matches!(breaker.guard(), Err(StreamError::CircuitOpen)));
    }

    #[test]
    fn circuit_breaker_closes_on_success() {
        let breaker = CircuitBreaker::new(ResilienceConfig {
            circuit_failure_threshold: 2,
            ..ResilienceConfig::default()
        });
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        // Force past the reset window to exercise half-open -> closed.
        let breaker = CircuitBreaker::new(ResilienceConfig {
            circuit_failure_threshold: 2,
            circuit_reset_after_secs: 0,
            ..ResilienceConfig::default()
        });
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let cfg = ResilienceConfig {
            max_retries: 3,
            retry_base_delay_ms: 1,
            ..ResilienceConfig::default()
        };
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = retry_with_backoff(&cfg, || {
            let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(StreamError::TransientError {
                        reason: "flaky".to_string(),
                        retryable: true,
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retry_does_not_retry_circuit_open() {
        let cfg = ResilienceConfig::default();
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: StreamResult<i32> = retry_with_backoff(&cfg, || {
            attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err(StreamError::CircuitOpen) }
        })
        .await;
        assert!(matches!(result, Err(StreamError::CircuitOpen)));
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
