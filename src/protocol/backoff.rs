use std::time::Duration;

use crate::config::ReconnectConfig;

/// Why the last session ended, which decides how fast the delay grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Socket could not be opened, or dropped after a healthy session.
    Connection,
    /// The meeting client closed the socket right after we sent a token.
    Auth,
}

/// Capped exponential backoff.
///
/// Delays never decrease until [`Backoff::reset`] is called, which happens
/// once a session has stayed up long enough to be considered stable.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    auth_multiplier: u32,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, auth_multiplier: u32) -> Self {
        Self {
            initial,
            max: max.max(initial),
            auth_multiplier: auth_multiplier.max(2),
            current: None,
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.auth_failure_multiplier,
        )
    }

    pub fn next_delay(&mut self, failure: Failure) -> Duration {
        let factor = match failure {
            Failure::Connection => 2,
            Failure::Auth => self.auth_multiplier,
        };

        let next = match (self.current, failure) {
            (None, Failure::Connection) => self.initial,
            (None, Failure::Auth) => self.initial.saturating_mul(factor),
            (Some(current), _) => current.saturating_mul(factor),
        }
        .min(self.max);

        self.current = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.current = None;
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> Backoff {
        Backoff::new(Duration::from_millis(100), Duration::from_millis(1_000), 4)
    }

    #[test]
    fn test_delays_grow_until_cap() {
        let mut backoff = backoff();
        let delays: Vec<u64> = (0..8)
            .map(|_| backoff.next_delay(Failure::Connection).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000, 1000, 1000]);
    }

    #[test]
    fn test_delays_never_decrease_with_mixed_failures() {
        let mut backoff = backoff();
        let mut previous = Duration::ZERO;
        for failure in [
            Failure::Connection,
            Failure::Auth,
            Failure::Connection,
            Failure::Auth,
            Failure::Connection,
        ] {
            let delay = backoff.next_delay(failure);
            assert!(delay >= previous);
            assert!(delay <= backoff.max());
            previous = delay;
        }
    }

    #[test]
    fn test_auth_failures_back_off_faster() {
        let mut connection = backoff();
        let mut auth = backoff();
        connection.next_delay(Failure::Connection);
        auth.next_delay(Failure::Auth);
        assert!(auth.next_delay(Failure::Auth) > connection.next_delay(Failure::Connection));
    }

    #[test]
    fn test_reset_starts_over() {
        let mut backoff = backoff();
        backoff.next_delay(Failure::Connection);
        backoff.next_delay(Failure::Connection);
        backoff.reset();
        assert_eq!(
            backoff.next_delay(Failure::Connection),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_max_below_initial_is_raised() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_millis(10), 4);
        assert_eq!(backoff.next_delay(Failure::Connection), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(Failure::Auth), Duration::from_millis(500));
    }
}
