//! Token-bucket rate limiter: an optional primitive for throttling calls to the LLM or search
//! client. Not required for a run to complete; provided for callers that want to bound request
//! rate against an upstream with its own limits.

use std::sync::Mutex;
use std::time::Instant;

/// A token bucket with a fixed capacity and a continuous refill rate.
pub struct TokenBucket {
    max_tokens: f64,
    refill_per_second: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(max_tokens: f64, refill_per_second: f64) -> Self {
        Self {
            max_tokens,
            refill_per_second,
            state: Mutex::new(BucketState {
                tokens: max_tokens,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_second).min(self.max_tokens);
        state.last_refill = now;
    }

    /// Suspend until `n` tokens are available, then consume them.
    pub async fn acquire(&self, n: f64) {
        loop {
            let wait = {
                let mut state = self.state.lock().unwrap();
                self.refill(&mut state);
                if state.tokens >= n {
                    state.tokens -= n;
                    None
                } else {
                    let deficit = n - state.tokens;
                    Some(std::time::Duration::from_secs_f64(deficit / self.refill_per_second))
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
    async fn acquire_within_capacity_does_not_block() {
        let bucket = TokenBucket::new(5.0, 1.0);
        let start = Instant::now();
        bucket.acquire(3.0).await;
        assert!(start.elapsed().as_millis() < 50);
    }
}
