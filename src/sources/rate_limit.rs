//! Rate limiters for the two concrete sources (§4.3, §5).

use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Source A: a process-wide semaphore of permit 1 plus a 3.5 s trailing
/// delay after each completed call.
pub struct TrailingDelayLimiter {
    semaphore: Semaphore,
    delay: Duration,
}

impl TrailingDelayLimiter {
    pub fn new(delay: Duration) -> Self {
        Self {
            semaphore: Semaphore::new(1),
            delay,
        }
    }

    pub fn arxiv_default() -> Self {
        Self::new(Duration::from_millis(3500))
    }

    /// Runs `call`, holding the single permit for its duration plus the
    /// trailing delay, so the next caller cannot start until the pacing
    /// window has fully elapsed.
    pub async fn run<F, Fut, T>(&self, call: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let _permit = self.semaphore.acquire().await.expect("semaphore not closed");
        let result = call().await;
        tokio::time::sleep(self.delay).await;
        result
    }
}

/// Source B: a leaky bucket at a configurable rate (10 req/s with a contact
/// email, else capped to 100 req/day per §4.3).
pub struct LeakyBucket {
    capacity: u32,
    refill_per_second: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl LeakyBucket {
    pub fn new(capacity: u32, refill_per_second: f64) -> Self {
        Self {
            capacity,
            refill_per_second,
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn polite_pool_with_contact() -> Self {
        Self::new(10, 10.0)
    }

    /// 100 requests/day without a contact email, expressed as a steady
    /// trickle rather than a once-daily reset.
    pub fn anonymous_daily_budget() -> Self {
        Self::new(100, 100.0 / 86_400.0)
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_second).min(self.capacity as f64);
        state.last_refill = now;
    }

    /// Blocks until a token is available, then consumes it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().expect("bucket mutex poisoned");
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - state.tokens;
                    Some(Duration::from_secs_f64(deficit / self.refill_per_second))
                }
            };
            match wait {
                None => return,
                Some(duration) => tokio::time::sleep(duration).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trailing_delay_limiter_serializes_calls() {
        let limiter = TrailingDelayLimiter::new(Duration::from_millis(5));
        let start = Instant::now();
        limiter.run(|| async { 1 }).await;
        limiter.run(|| async { 2 }).await;
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn leaky_bucket_allows_burst_up_to_capacity() {
        let bucket = LeakyBucket::new(3, 1.0);
        let start = Instant::now();
        bucket.acquire().await;
        bucket.acquire().await;
        bucket.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(200));
    }
}
