use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Token-bucket limiter governing the delivery send budget. Each record
/// costs one token; `acquire` suspends the caller until a token is
/// available, which is the pipeline's sole backpressure mechanism.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    capacity: f64,
    period_secs: f64,
    // the bucket is modeled by the time of last refill and the current tokens
    tokens: Mutex<(f64, Instant)>,
}

impl RateLimiter {
    pub fn per_minute(records: u64) -> Self {
        Self::new(records, 60.0)
    }

    fn new(capacity: u64, period_secs: f64) -> Self {
        let capacity = capacity as f64;
        Self {
            inner: Arc::new(Inner {
                capacity,
                period_secs,
                tokens: Mutex::new((capacity, Instant::now())),
            }),
        }
    }

    /// Acquire permission to send one record. Awaits as needed.
    pub async fn acquire(&self) {
        if self.inner.capacity <= 0.0 {
            return;
        }
        // Basic token bucket: refill continuously, wait until a token accumulates
        loop {
            let mut guard = self.inner.tokens.lock().await;
            let (ref mut tokens, ref mut last) = *guard;
            let now = Instant::now();
            let elapsed = now.duration_since(*last).as_secs_f64();
            let refill_rate = self.inner.capacity / self.inner.period_secs; // tokens per second
            *tokens = (*tokens + elapsed * refill_rate).min(self.inner.capacity);
            *last = now;
            if *tokens >= 1.0 {
                *tokens -= 1.0;
                break;
            } else {
                // compute needed time to get a full token
                let need = 1.0 - *tokens;
                let secs = need / refill_rate;
                drop(guard);
                tokio::time::sleep(Duration::from_secs_f64(secs.max(0.001))).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_within_capacity_is_immediate() {
        let limiter = RateLimiter::per_minute(60);
        let started = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn exhausted_bucket_delays_the_next_acquire() {
        // two tokens per second
        let limiter = RateLimiter::new(2, 1.0);
        limiter.acquire().await;
        limiter.acquire().await;

        let started = Instant::now();
        limiter.acquire().await;
        assert!(started.elapsed() >= Duration::from_millis(300));
    }
}
