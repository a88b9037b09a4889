use std::time::Duration;

use dashmap::DashMap;

pub const BASE_DELAY: Duration = Duration::from_secs(5);
pub const MAX_DELAY: Duration = Duration::from_secs(5 * 60);

/// Per-key exponential backoff, reset by the next successful reconcile.
pub struct Backoff {
    attempts: DashMap<String, u32>,
    base: Duration,
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::new(BASE_DELAY, MAX_DELAY)
    }
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Backoff {
        Backoff {
            attempts: DashMap::new(),
            base,
            max,
        }
    }

    pub fn next_delay(&self, key: &str) -> Duration {
        let mut attempts = self.attempts.entry(key.to_string()).or_insert(0);
        let exponent = (*attempts).min(16);
        *attempts = attempts.saturating_add(1);
        self.base
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max)
    }

    pub fn reset(&self, key: &str) {
        self.attempts.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let backoff = Backoff::default();
        let delays = (0..8)
            .map(|_| backoff.next_delay("ns/store").as_secs())
            .collect::<Vec<_>>();
        assert_eq!(delays, vec![5, 10, 20, 40, 80, 160, 300, 300]);
    }

    #[test]
    fn test_backoff_is_per_key_and_resets() {
        let backoff = Backoff::default();
        backoff.next_delay("ns/a");
        backoff.next_delay("ns/a");
        assert_eq!(backoff.next_delay("ns/b"), BASE_DELAY);
        backoff.reset("ns/a");
        assert_eq!(backoff.next_delay("ns/a"), BASE_DELAY);
    }
}
