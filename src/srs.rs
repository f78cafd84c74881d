use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::models::{BundleState, LastResult};

pub const MIN_EASE: f64 = 1.3;
pub const MAX_EASE: f64 = 3.0;
pub const DEFAULT_EASE: f64 = 2.5;
/// Roughly a century. Keeps `due_at` well inside the representable range.
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    pub interval_days: u32,
    pub ease: f64,
}

/// Simplified SM-2 update.
///
/// Correct: interval grows by the ease factor (rounded to whole days) and
/// ease rises by 0.1. Incorrect: interval resets to one day and ease drops
/// by 0.2. Ease stays within [1.3, 3.0] and the interval stays within
/// [1, MAX_INTERVAL_DAYS].
pub fn next_interval(interval_days: u32, ease: f64, was_correct: bool) -> Schedule {
    let (interval, ease) = if was_correct {
        let grown = (interval_days as f64 * ease).round();
        (grown.clamp(1.0, MAX_INTERVAL_DAYS as f64) as u32, ease + 0.1)
    } else {
        (1, ease - 0.2)
    };

    Schedule {
        interval_days: interval.clamp(1, MAX_INTERVAL_DAYS),
        ease: ease.clamp(MIN_EASE, MAX_EASE),
    }
}

pub fn is_due(state: &BundleState, now: DateTime<Utc>) -> bool {
    state.due_at <= now
}

pub fn due_bundle_ids(states: &[BundleState], now: DateTime<Utc>) -> HashSet<String> {
    states
        .iter()
        .filter(|s| is_due(s, now))
        .map(|s| s.bundle_id.clone())
        .collect()
}

impl BundleState {
    /// A bundle nobody has reviewed yet, due immediately.
    pub fn new(bundle_id: String, now: DateTime<Utc>) -> Self {
        Self {
            bundle_id,
            ease: DEFAULT_EASE,
            interval_days: 1,
            due_at: now,
            last_result: None,
        }
    }
}

/// Applies one review outcome and reschedules the bundle.
pub fn review(state: &BundleState, was_correct: bool, now: DateTime<Utc>) -> BundleState {
    let schedule = next_interval(state.interval_days, state.ease, was_correct);
    let due_at = now
        .checked_add_signed(Duration::days(i64::from(schedule.interval_days)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    BundleState {
        bundle_id: state.bundle_id.clone(),
        ease: schedule.ease,
        interval_days: schedule.interval_days,
        due_at,
        last_result: Some(LastResult {
            correct: was_correct,
            timestamp: now,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_grows_interval_and_ease() {
        let s = next_interval(6, 2.5, true);
        assert_eq!(s.interval_days, 15);
        assert!((s.ease - 2.6).abs() < 1e-9);
    }

    #[test]
    fn test_incorrect_resets_interval() {
        let s = next_interval(15, 2.5, false);
        assert_eq!(s.interval_days, 1);
        assert!((s.ease - 2.3).abs() < 1e-9);
    }

    #[test]
    fn test_ease_is_clamped() {
        assert_eq!(next_interval(10, 3.0, true).ease, MAX_EASE);
        assert_eq!(next_interval(10, 1.3, false).ease, MIN_EASE);
        assert_eq!(next_interval(10, 1.35, false).ease, MIN_EASE);
        // out of range inputs still land in bounds
        assert_eq!(next_interval(1, 9.0, true).ease, MAX_EASE);
        assert_eq!(next_interval(1, 0.1, true).ease, MIN_EASE);
    }

    #[test]
    fn test_interval_never_below_one_day() {
        assert_eq!(next_interval(0, 1.3, true).interval_days, 1);
        for days in 0..30 {
            for ease in [1.3, 1.8, 2.5, 3.0] {
                for correct in [true, false] {
                    let s = next_interval(days, ease, correct);
                    assert!(s.interval_days >= 1);
                    assert!((MIN_EASE..=MAX_EASE).contains(&s.ease));
                }
            }
        }
    }

    #[test]
    fn test_interval_is_capped() {
        assert_eq!(next_interval(MAX_INTERVAL_DAYS, MAX_EASE, true).interval_days, MAX_INTERVAL_DAYS);
        assert_eq!(next_interval(u32::MAX, MAX_EASE, true).interval_days, MAX_INTERVAL_DAYS);
        assert_eq!(next_interval(u32::MAX, MAX_EASE, false).interval_days, 1);
    }

    #[test]
    fn test_long_correct_streak_stays_schedulable() {
        let now = Utc::now();
        let mut state = BundleState::new("b".to_string(), now);
        for _ in 0..40 {
            state = review(&state, true, now);
            assert!(state.interval_days <= MAX_INTERVAL_DAYS);
            assert!(state.due_at > now);
        }
        assert_eq!(state.interval_days, MAX_INTERVAL_DAYS);
        assert_eq!(state.due_at, now + Duration::days(MAX_INTERVAL_DAYS as i64));
    }

    #[test]
    fn test_interval_rounds_to_nearest_day() {
        // 3 * 1.5 = 4.5 rounds away from zero
        assert_eq!(next_interval(3, 1.5, true).interval_days, 5);
        // 2 * 1.3 = 2.6
        assert_eq!(next_interval(2, 1.3, true).interval_days, 3);
    }

    #[test]
    fn test_is_due_compares_against_now() {
        let now = Utc::now();
        let mut state = BundleState::new("b".to_string(), now);
        assert!(is_due(&state, now));

        state.due_at = now + Duration::seconds(1);
        assert!(!is_due(&state, now));

        state.due_at = now - Duration::days(3);
        assert!(is_due(&state, now));
    }

    #[test]
    fn test_due_bundle_ids() {
        let now = Utc::now();
        let due = BundleState::new("due".to_string(), now - Duration::hours(1));
        let later = BundleState::new("later".to_string(), now + Duration::days(2));
        let ids = due_bundle_ids(&[due, later], now);
        assert!(ids.contains("due"));
        assert!(!ids.contains("later"));
    }

    #[test]
    fn test_review_reschedules() {
        let now = Utc::now();
        let state = BundleState {
            interval_days: 4,
            ..BundleState::new("b".to_string(), now)
        };

        let next = review(&state, true, now);
        assert_eq!(next.interval_days, 10);
        assert_eq!(next.due_at, now + Duration::days(10));
        assert_eq!(next.last_result.as_ref().map(|r| r.correct), Some(true));
        assert!(!is_due(&next, now));

        let failed = review(&next, false, now);
        assert_eq!(failed.interval_days, 1);
        assert_eq!(failed.due_at, now + Duration::days(1));
    }
}
