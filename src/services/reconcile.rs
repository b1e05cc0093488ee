// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Merge normalized provider samples into stored daily history.
//!
//! Only eligible days (from gap planning) and today may be written. Existing
//! values are only ever replaced by non-zero steps / non-null weight, so a
//! sparse or partial fetch cannot erase good data.

use crate::db::HistoryStore;
use crate::error::AppError;
use crate::models::{DailyHistoryEntry, DaySample};
use chrono::{Duration, NaiveDate};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub inserted: usize,
    pub updated: usize,
    /// Eligible samples that matched what is already stored
    pub unchanged: usize,
    /// Samples for days that may not be overwritten
    pub ineligible: usize,
}

/// Writes provider samples into a [`HistoryStore`].
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn HistoryStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Upsert `samples` for `user_id`.
    ///
    /// A sample is applied only when its date is in `eligible` or equals
    /// `today`. Unchanged entries are not rewritten, so running the same
    /// samples twice leaves the store exactly as after the first run.
    pub async fn upsert(
        &self,
        user_id: &str,
        samples: &[DaySample],
        eligible: &BTreeSet<NaiveDate>,
        today: NaiveDate,
    ) -> Result<ReconcileOutcome, AppError> {
        let mut outcome = ReconcileOutcome::default();

        let writable: Vec<&DaySample> = samples
            .iter()
            .filter(|s| {
                let ok = s.date == today || eligible.contains(&s.date);
                if !ok {
                    outcome.ineligible += 1;
                }
                ok
            })
            .collect();

        let (Some(first), Some(last)) = (
            writable.iter().map(|s| s.date).min(),
            writable.iter().map(|s| s.date).max(),
        ) else {
            return Ok(outcome);
        };

        let mut existing: HashMap<NaiveDate, DailyHistoryEntry> = self
            .store
            .get_history(user_id, first, last + Duration::days(1))
            .await?
            .into_iter()
            .map(|e| (e.date, e))
            .collect();

        for sample in writable {
            let next = match existing.get(&sample.date) {
                None => DailyHistoryEntry {
                    user_id: user_id.to_string(),
                    date: sample.date,
                    steps: sample.steps,
                    weight_lbs: sample.weight_lbs,
                },
                Some(current) => {
                    let merged = merge_entry(current, sample);
                    if merged == *current {
                        tracing::debug!(user_id, date = %sample.date, "History unchanged, skipping write");
                        outcome.unchanged += 1;
                        continue;
                    }
                    merged
                }
            };

            self.store.upsert_history(&next).await?;

            if existing.insert(next.date, next).is_some() {
                outcome.updated += 1;
            } else {
                outcome.inserted += 1;
            }
        }

        tracing::info!(
            user_id,
            inserted = outcome.inserted,
            updated = outcome.updated,
            unchanged = outcome.unchanged,
            ineligible = outcome.ineligible,
            "Reconciled provider samples"
        );

        Ok(outcome)
    }
}

/// Apply `sample` on top of `current` without regressing known values.
pub fn merge_entry(current: &DailyHistoryEntry, sample: &DaySample) -> DailyHistoryEntry {
    DailyHistoryEntry {
        user_id: current.user_id.clone(),
        date: current.date,
        steps: if sample.steps > 0 {
            sample.steps
        } else {
            current.steps
        },
        weight_lbs: sample.weight_lbs.or(current.weight_lbs),
    }
}
