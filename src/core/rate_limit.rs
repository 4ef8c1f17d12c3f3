use crate::utils::error::{EtlError, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::sync::Arc;
use std::time::Duration;

/// Spaces Instagram requests at least `period` apart across all workers.
/// A zero period disables limiting.
#[derive(Clone)]
pub struct InstagramRateLimiter {
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    period: Duration,
}

impl InstagramRateLimiter {
    pub fn new(period: Duration) -> Self {
        let limiter = Quota::with_period(period).map(|quota| Arc::new(RateLimiter::direct(quota)));
        Self { limiter, period }
    }

    pub fn from_seconds(seconds: f64) -> Result<Self> {
        let period = Duration::try_from_secs_f64(seconds).map_err(|e| {
            EtlError::InvalidConfigValueError {
                field: "instagram_rate_limit".to_string(),
                value: seconds.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self::new(period))
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }
}

impl std::fmt::Debug for InstagramRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstagramRateLimiter")
            .field("period", &self.period)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_consecutive_acquisitions_are_spaced() {
        let limiter = InstagramRateLimiter::new(Duration::from_millis(200));

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        // 第一次立即通過，之後每次間隔 200ms
        assert!(start.elapsed() >= Duration::from_millis(380));
    }

    #[tokio::test]
    async fn test_clones_share_the_same_limiter() {
        let limiter = InstagramRateLimiter::new(Duration::from_millis(200));
        let other = limiter.clone();

        let start = Instant::now();
        limiter.acquire().await;
        other.acquire().await;

        assert!(start.elapsed() >= Duration::from_millis(180));
    }

    #[tokio::test]
    async fn test_zero_period_disables_limiting() {
        let limiter = InstagramRateLimiter::from_seconds(0.0).unwrap();
        assert!(!limiter.is_enabled());

        let start = Instant::now();
        for _ in 0..20 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_out_of_range_seconds_are_rejected() {
        let limiter = InstagramRateLimiter::from_seconds(1.5).unwrap();
        assert_eq!(limiter.period(), Duration::from_millis(1500));

        for seconds in [1e20, -1.0, f64::NAN, f64::INFINITY] {
            let err = InstagramRateLimiter::from_seconds(seconds).unwrap_err();
            assert!(matches!(err, EtlError::InvalidConfigValueError { .. }));
        }
    }
}
