//! Time-windowed suppression of the assistant's own voice.
//!
//! While reply audio plays, the microphone hears it too. Speech-start events
//! that arrive before the guard's deadline are treated as echo and ignored.

use std::time::Duration;
use tokio::time::Instant;

/// A single absolute suppression deadline.
#[derive(Debug, Clone, Default)]
pub struct EchoGuard {
    deadline: Option<Instant>,
}

impl EchoGuard {
    /// A guard that suppresses nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress speech-start events for `window` from now.
    pub fn arm(&mut self, window: Duration) {
        self.arm_at(Instant::now(), window);
    }

    /// Suppress until `now + window`, never shortening a later deadline.
    pub fn arm_at(&mut self, now: Instant, window: Duration) {
        let candidate = now + window;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing > candidate => existing,
            _ => candidate,
        });
    }

    /// Whether a speech-start observed at `now` should be ignored.
    #[must_use]
    pub fn is_suppressed(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now < deadline)
    }

    /// The current deadline, if one was ever armed.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    const WINDOW: Duration = Duration::from_millis(1200);

    #[test]
    fn unarmed_guard_never_suppresses() {
        let guard = EchoGuard::new();
        assert!(!guard.is_suppressed(Instant::now()));
        assert!(guard.deadline().is_none());
    }

    #[test]
    fn window_is_half_open() {
        let t0 = Instant::now();
        let mut guard = EchoGuard::new();
        guard.arm_at(t0, WINDOW);

        assert!(guard.is_suppressed(t0));
        assert!(guard.is_suppressed(t0 + WINDOW - Duration::from_millis(1)));
        assert!(!guard.is_suppressed(t0 + WINDOW));
        assert!(!guard.is_suppressed(t0 + WINDOW + Duration::from_millis(1)));
    }

    #[test]
    fn rearming_extends_deadline() {
        let t0 = Instant::now();
        let mut guard = EchoGuard::new();
        guard.arm_at(t0, WINDOW);
        guard.arm_at(t0 + Duration::from_millis(1000), WINDOW);
        assert_eq!(guard.deadline(), Some(t0 + Duration::from_millis(2200)));
    }

    #[test]
    fn shorter_arm_does_not_shorten() {
        let t0 = Instant::now();
        let mut guard = EchoGuard::new();
        guard.arm_at(t0, WINDOW);
        guard.arm_at(t0, Duration::from_millis(10));
        assert_eq!(guard.deadline(), Some(t0 + WINDOW));
    }

    #[tokio::test(start_paused = true)]
    async fn arm_uses_tokio_clock() {
        let mut guard = EchoGuard::new();
        guard.arm(WINDOW);
        assert!(guard.is_suppressed(Instant::now()));
        tokio::time::advance(WINDOW).await;
        assert!(!guard.is_suppressed(Instant::now()));
    }
}
