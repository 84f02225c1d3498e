//! Pure quota-window arithmetic.
//!
//! Everything here is a function of a status snapshot and a timestamp, which
//! lets the tracker re-run the decision on every compare-and-swap attempt.

use chrono::{DateTime, Duration, Utc};

use crate::models::{ConsumeOutcome, UserStatus};

/// Length of a quota window unless configured otherwise
pub fn default_window() -> Duration {
    Duration::hours(24)
}

/// Whether the window starting at `window_start` has ended at `now`.
///
/// A clock reading behind `window_start` counts as zero elapsed time, so
/// skew never rolls a window early.
#[inline]
pub fn window_expired(window_start: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    now >= window_start && now - window_start >= window
}

/// Status with the window rolled over if it has ended
pub fn rolled(status: &UserStatus, now: DateTime<Utc>, window: Duration) -> UserStatus {
    let mut next = status.clone();
    if window_expired(next.window_start, now, window) {
        next.swipe_count = 0;
        next.window_start = now;
        next.recent_keys.clear();
    }
    next
}

/// What a consume attempt decided against one snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub outcome: ConsumeOutcome,
    /// Status to persist, `None` when nothing may change
    pub write: Option<UserStatus>,
}

/// Decide one consume against `status`.
///
/// Free users may take exactly `limit` swipes per window; the `limit + 1`-th
/// is refused without mutating anything. Premium users are always allowed
/// and only bump the shadow counter. A `key` already applied in the current
/// window replays its recorded outcome.
pub fn decide(
    status: &UserStatus,
    limit: u32,
    now: DateTime<Utc>,
    window: Duration,
    key: Option<&str>,
) -> Decision {
    let mut next = rolled(status, now, window);

    if let Some(applied) = key.and_then(|k| next.applied_key(k)) {
        return Decision {
            outcome: ConsumeOutcome {
                allowed: true,
                remaining: applied.remaining,
                window_start: next.window_start,
                is_premium: next.is_premium,
            },
            write: None,
        };
    }

    let remaining = if next.is_premium {
        next.swipe_count = next.swipe_count.saturating_add(1);
        limit
    } else if next.swipe_count < limit {
        next.swipe_count += 1;
        limit - next.swipe_count
    } else {
        return Decision {
            outcome: ConsumeOutcome {
                allowed: false,
                remaining: 0,
                window_start: next.window_start,
                is_premium: false,
            },
            write: None,
        };
    };

    if let Some(key) = key {
        next.remember_key(key, remaining);
    }

    Decision {
        outcome: ConsumeOutcome {
            allowed: true,
            remaining,
            window_start: next.window_start,
            is_premium: next.is_premium,
        },
        write: Some(next),
    }
}

/// Read-only view of a user's quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaView {
    pub used: u32,
    pub remaining: u32,
    pub window_start: DateTime<Utc>,
    pub resets_at: DateTime<Utc>,
    pub is_premium: bool,
}

/// Quota as the next consume would see it, without mutating anything
pub fn view(status: &UserStatus, limit: u32, now: DateTime<Utc>, window: Duration) -> QuotaView {
    let current = rolled(status, now, window);
    let remaining = if current.is_premium {
        limit
    } else {
        limit.saturating_sub(current.swipe_count)
    };

    QuotaView {
        used: current.swipe_count,
        remaining,
        window_start: current.window_start,
        resets_at: current.window_start + window,
        is_premium: current.is_premium,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn status_with(count: u32) -> UserStatus {
        UserStatus {
            swipe_count: count,
            ..UserStatus::fresh(t0())
        }
    }

    #[test]
    fn test_window_boundary() {
        let window = default_window();
        assert!(!window_expired(t0(), t0() + Duration::hours(24) - Duration::seconds(1), window));
        assert!(window_expired(t0(), t0() + Duration::hours(24), window));
        // Clock behind the window start never rolls
        assert!(!window_expired(t0(), t0() - Duration::hours(48), window));
    }

    #[test]
    fn test_last_allowed_swipe() {
        let decision = decide(&status_with(49), 50, t0(), default_window(), None);
        assert!(decision.outcome.allowed);
        assert_eq!(decision.outcome.remaining, 0);
        assert_eq!(decision.write.map(|s| s.swipe_count), Some(50));
    }

    #[test]
    fn test_over_limit_makes_no_write() {
        let decision = decide(&status_with(50), 50, t0() + Duration::hours(1), default_window(), None);
        assert!(!decision.outcome.allowed);
        assert_eq!(decision.outcome.remaining, 0);
        assert!(decision.write.is_none());
    }

    #[test]
    fn test_rollover_before_consume() {
        let now = t0() + Duration::hours(24) + Duration::milliseconds(1);
        let decision = decide(&status_with(50), 50, now, default_window(), None);
        assert!(decision.outcome.allowed);
        assert_eq!(decision.outcome.remaining, 49);
        assert_eq!(decision.outcome.window_start, now);
        let written = decision.write.unwrap();
        assert_eq!(written.swipe_count, 1);
        assert_eq!(written.window_start, now);
    }

    #[test]
    fn test_zero_limit_blocks_free_user() {
        let decision = decide(&status_with(0), 0, t0(), default_window(), None);
        assert!(!decision.outcome.allowed);
        assert!(decision.write.is_none());
    }

    #[test]
    fn test_premium_ignores_limit() {
        let mut status = status_with(7);
        status.is_premium = true;

        let decision = decide(&status, 0, t0(), default_window(), None);
        assert!(decision.outcome.allowed);
        assert!(decision.outcome.is_premium);
        assert_eq!(decision.write.unwrap().swipe_count, 8);
    }

    #[test]
    fn test_applied_key_replays() {
        let first = decide(&status_with(3), 10, t0(), default_window(), Some("req-1"));
        let stored = first.write.unwrap();
        assert_eq!(stored.swipe_count, 4);

        let replay = decide(&stored, 10, t0() + Duration::seconds(2), default_window(), Some("req-1"));
        assert_eq!(replay.outcome, first.outcome);
        assert!(replay.write.is_none());
    }

    #[test]
    fn test_view_applies_rollover_virtually() {
        let status = status_with(50);
        let during = view(&status, 50, t0() + Duration::hours(3), default_window());
        assert_eq!(during.remaining, 0);
        assert_eq!(during.resets_at, t0() + Duration::hours(24));

        let later = t0() + Duration::hours(30);
        let after = view(&status, 50, later, default_window());
        assert_eq!(after.used, 0);
        assert_eq!(after.remaining, 50);
        assert_eq!(after.window_start, later);
    }
}
