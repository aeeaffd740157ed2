use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

const BASE_DELAY: Duration = Duration::from_millis(5);
const MAX_DELAY: Duration = Duration::from_secs(1000);

/// Per-key exponential backoff, the Rust-native analogue of client-go's
/// `workqueue.DefaultControllerRateLimiter` (spec.md §4.2: "Rate-limiting
/// uses exponential backoff on repeated enqueues of the same key"). Tracks
/// how many times a key has been re-added without an intervening
/// [`forget`](Self::forget) and doubles the delay each time, capped at
/// `MAX_DELAY`.
#[derive(Default)]
pub struct KeyRateLimiter {
    attempts: Mutex<HashMap<String, u32>>,
}

impl KeyRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay before `key` should become visible again, bumping its attempt
    /// counter.
    pub fn next_delay(&self, key: &str) -> Duration {
        let mut attempts = self.attempts.lock();
        let count = attempts.entry(key.to_string()).or_insert(0);
        let exp = (*count).min(20);
        *count += 1;
        let delay = BASE_DELAY.saturating_mul(1u32.checked_shl(exp).unwrap_or(u32::MAX));
        delay.min(MAX_DELAY)
    }

    /// Clears the backoff state for `key`, e.g. after it is processed
    /// successfully (client-go's `Forget`).
    pub fn forget(&self, key: &str) {
        self.attempts.lock().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_forget_resets() {
        let limiter = KeyRateLimiter::new();
        let d0 = limiter.next_delay("k");
        let d1 = limiter.next_delay("k");
        assert!(d1 > d0);
        limiter.forget("k");
        let d2 = limiter.next_delay("k");
        assert_eq!(d2, d0);
    }
}
