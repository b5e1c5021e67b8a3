//! Per-connection token-bucket rate limiting for the WebSocket surface.
//!
//! Same algorithm as the teacher's rate limiter: a burst allowance that
//! refills continuously rather than resetting on a fixed tick.

use std::time::Instant;

pub struct RateLimiter {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            tokens: max_tokens,
            max_tokens,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    /// Default for inbound WebSocket frames: generous burst, steady
    /// refill, sized so normal terminal typing never trips it.
    pub fn default_ws() -> Self {
        Self::new(200.0, 50.0)
    }

    pub fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn burst_allowed_then_limited() {
        let mut limiter = RateLimiter::new(10.0, 1.0);
        for _ in 0..10 {
            assert!(limiter.try_consume());
        }
        assert!(!limiter.try_consume());
    }

    #[test]
    fn tokens_refill_over_time() {
        let mut limiter = RateLimiter::new(10.0, 10.0);
        for _ in 0..10 {
            limiter.try_consume();
        }
        assert!(!limiter.try_consume());

        sleep(Duration::from_millis(200));
        assert!(limiter.try_consume());
        assert!(limiter.try_consume());
        assert!(!limiter.try_consume());
    }
}
