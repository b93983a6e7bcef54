//! Sliding-window success-streak accumulation, separate from the per-frame match decision: a
//! single strong match isn't enough to unlock the door, a sustained streak within a time window
//! anchored at the *first* success of that streak is.

use crate::config::Config;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthState {
    Success,
    Failure,
}

pub struct AuthManager {
    window: Duration,
    required_success_count: u32,
    state: AuthState,
    streak: u32,
    window_start: Option<Instant>,
}

impl AuthManager {
    pub fn new(config: &Config) -> Self {
        Self {
            window: Duration::from_millis(config.auth_manager.window_ms),
            required_success_count: config.auth_manager.required_success_count,
            state: AuthState::Failure,
            streak: 0,
            window_start: None,
        }
    }

    /// Records a successful match. The window anchors to the first success of the streak; every
    /// subsequent success within that window just increments the count.
    pub fn on_success(&mut self) {
        if self.window_start.is_none() {
            self.window_start = Some(Instant::now());
        }
        self.streak += 1;
        self.state = AuthState::Success;
    }

    /// Records a failed match. Per spec, the streak is *not* cleared here — the FSM's own
    /// transition guards (and explicit `reset`) are what clear it.
    pub fn on_failure(&mut self) {
        self.state = AuthState::Failure;
    }

    /// True iff the last recorded outcome was a success and it landed within the still-open
    /// window started by the first success of the current streak.
    pub fn is_auth_valid(&self) -> bool {
        self.state == AuthState::Success
            && self
                .window_start
                .is_some_and(|t| t.elapsed() <= self.window)
    }

    /// Whether `label` should be allowed to proceed to entry: empty labels and anything
    /// prefixed (case-insensitively) with "Unknown" are always rejected regardless of streak.
    pub fn should_allow_entry(&self, label: &str) -> bool {
        if label.is_empty() {
            return false;
        }
        if label.get(..7).is_some_and(|prefix| prefix.eq_ignore_ascii_case("unknown")) {
            return false;
        }
        self.is_auth_valid() && self.streak >= self.required_success_count
    }

    pub fn reset(&mut self) {
        self.streak = 0;
        self.window_start = None;
        self.state = AuthState::Failure;
    }

    pub fn streak_len(&self) -> u32 {
        self.streak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with(required: u32, window_ms: u64) -> AuthManager {
        let mut cfg = Config::default();
        cfg.auth_manager.required_success_count = required;
        cfg.auth_manager.window_ms = window_ms;
        AuthManager::new(&cfg)
    }

    #[test]
    fn requires_streak_before_valid() {
        let mut mgr = manager_with(3, 30_000);
        assert!(!mgr.is_auth_valid());
        mgr.on_success();
        mgr.on_success();
        assert!(mgr.is_auth_valid()); // is_auth_valid only checks state+window, not streak count
        assert!(!mgr.should_allow_entry("alice")); // should_allow_entry also checks streak
        mgr.on_success();
        assert!(mgr.should_allow_entry("alice"));
    }

    #[test]
    fn unknown_label_never_allowed_even_with_streak() {
        let mut mgr = manager_with(1, 30_000);
        mgr.on_success();
        assert!(!mgr.should_allow_entry("Unknown"));
        assert!(!mgr.should_allow_entry("unknown_42"));
        assert!(!mgr.should_allow_entry(""));
        assert!(mgr.should_allow_entry("alice"));
    }

    #[test]
    fn non_ascii_label_does_not_panic_on_prefix_check() {
        let mut mgr = manager_with(1, 30_000);
        mgr.on_success();
        // "日本語ユーザ" has no byte-7 char boundary; get(..7) must return None, not panic.
        assert!(mgr.should_allow_entry("日本語ユーザ"));
    }

    #[test]
    fn failure_does_not_clear_streak() {
        let mut mgr = manager_with(1, 30_000);
        mgr.on_success();
        assert_eq!(mgr.streak_len(), 1);
        mgr.on_failure();
        assert_eq!(mgr.streak_len(), 1);
        assert!(!mgr.is_auth_valid()); // state flipped to Failure
    }

    #[test]
    fn reset_clears_streak_and_window() {
        let mut mgr = manager_with(1, 30_000);
        mgr.on_success();
        assert!(mgr.is_auth_valid());
        mgr.reset();
        assert!(!mgr.is_auth_valid());
        assert_eq!(mgr.streak_len(), 0);
    }
}
