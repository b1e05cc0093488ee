// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Decide which days of the lookback window may be rewritten by a sync.
//!
//! The fetch range is always the whole window, so the provider query has one
//! predictable shape. Only missing or needs-weight days are *eligible*: the
//! reconciler will not touch any other stored day.

use crate::models::DailyHistoryEntry;
use crate::time_utils::{day_start, days_between};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::{BTreeSet, HashMap};

/// Result of gap planning for one user.
#[derive(Debug, Clone, PartialEq)]
pub struct GapPlan {
    /// Start of the backfill query (UTC midnight, `today - lookback`)
    pub fetch_start: DateTime<Utc>,
    /// End of the backfill query (UTC midnight of today, exclusive)
    pub fetch_end: DateTime<Utc>,
    /// Days with no entry or with zero steps
    pub missing: BTreeSet<NaiveDate>,
    /// Days with steps but no weight
    pub needs_weight_only: BTreeSet<NaiveDate>,
}

impl GapPlan {
    /// Days the reconciler may overwrite.
    pub fn eligible_dates(&self) -> BTreeSet<NaiveDate> {
        self.missing
            .union(&self.needs_weight_only)
            .copied()
            .collect()
    }

    /// Whether every day in the window already has complete data.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.needs_weight_only.is_empty()
    }
}

/// Plan the backfill window `[today - lookback_days, today)`.
///
/// Today is never part of the plan; it is fetched separately on every cycle.
pub fn plan_gaps(
    existing_history: &[DailyHistoryEntry],
    today: NaiveDate,
    lookback_days: i64,
) -> GapPlan {
    let window_start = today - Duration::days(lookback_days);
    let by_date: HashMap<NaiveDate, &DailyHistoryEntry> =
        existing_history.iter().map(|e| (e.date, e)).collect();

    let mut missing = BTreeSet::new();
    let mut needs_weight_only = BTreeSet::new();

    for day in days_between(window_start, today) {
        match by_date.get(&day) {
            None => {
                missing.insert(day);
            }
            Some(entry) if entry.is_missing_steps() => {
                missing.insert(day);
            }
            Some(entry) if entry.needs_weight() => {
                needs_weight_only.insert(day);
            }
            Some(_) => {}
        }
    }

    tracing::debug!(
        window_start = %window_start,
        missing = missing.len(),
        needs_weight = needs_weight_only.len(),
        "Planned history gaps"
    );

    GapPlan {
        fetch_start: day_start(window_start),
        fetch_end: day_start(today),
        missing,
        needs_weight_only,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOKBACK: i64 = 30;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 31).unwrap()
    }

    /// Day `n` of the window, 1-based (day 1 = today - 30).
    fn window_day(n: i64) -> NaiveDate {
        today() - Duration::days(LOOKBACK) + Duration::days(n - 1)
    }

    fn entry(date: NaiveDate, steps: u32, weight_lbs: Option<f64>) -> DailyHistoryEntry {
        DailyHistoryEntry {
            user_id: "u1".to_string(),
            date,
            steps,
            weight_lbs,
        }
    }

    /// Complete history for every window day, with the given overrides.
    fn history_with(skip: &[i64], zero: &[i64], no_weight: &[i64]) -> Vec<DailyHistoryEntry> {
        (1..=LOOKBACK)
            .filter(|n| !skip.contains(n))
            .map(|n| {
                let steps = if zero.contains(&n) { 0 } else { 6000 };
                let weight = if no_weight.contains(&n) {
                    None
                } else {
                    Some(170.0)
                };
                entry(window_day(n), steps, weight)
            })
            .collect()
    }

    #[test]
    fn test_missing_and_zero_step_days_are_gaps() {
        let history = history_with(&[15], &[20], &[]);
        let plan = plan_gaps(&history, today(), LOOKBACK);

        let expected: BTreeSet<_> = [window_day(15), window_day(20)].into_iter().collect();
        assert_eq!(plan.missing, expected);
        assert!(plan.needs_weight_only.is_empty());
    }

    #[test]
    fn test_fetch_window_is_always_full() {
        let history = history_with(&[15], &[20], &[]);
        let plan = plan_gaps(&history, today(), LOOKBACK);

        assert_eq!(plan.fetch_start, day_start(window_day(1)));
        assert_eq!(plan.fetch_end, day_start(today()));
    }

    #[test]
    fn test_needs_weight_days() {
        let history = history_with(&[], &[], &[3, 7]);
        let plan = plan_gaps(&history, today(), LOOKBACK);

        assert!(plan.missing.is_empty());
        let expected: BTreeSet<_> = [window_day(3), window_day(7)].into_iter().collect();
        assert_eq!(plan.needs_weight_only, expected);
        assert_eq!(plan.eligible_dates(), expected);
    }

    #[test]
    fn test_zero_steps_without_weight_is_missing_not_needs_weight() {
        let history = history_with(&[], &[5], &[5]);
        let plan = plan_gaps(&history, today(), LOOKBACK);

        assert!(plan.missing.contains(&window_day(5)));
        assert!(!plan.needs_weight_only.contains(&window_day(5)));
    }

    #[test]
    fn test_empty_history_marks_whole_window() {
        let plan = plan_gaps(&[], today(), LOOKBACK);
        assert_eq!(plan.missing.len(), LOOKBACK as usize);
        assert!(!plan.missing.contains(&today()));
    }

    #[test]
    fn test_complete_history_has_no_eligible_days() {
        let plan = plan_gaps(&history_with(&[], &[], &[]), today(), LOOKBACK);
        assert!(plan.is_complete());
        assert!(plan.eligible_dates().is_empty());
    }

    #[test]
    fn test_entries_outside_window_are_ignored() {
        let mut history = history_with(&[], &[], &[]);
        history.push(entry(today(), 0, None));
        history.push(entry(window_day(0), 0, None));

        let plan = plan_gaps(&history, today(), LOOKBACK);
        assert!(plan.is_complete());
    }
}
