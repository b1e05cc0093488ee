// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Per-day fitness history, as stored and as fetched from the provider.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Stored per-day history record, unique per `(user_id, date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DailyHistoryEntry {
    /// Owner of the record
    pub user_id: String,
    /// UTC calendar day
    pub date: NaiveDate,
    /// Step count for the day
    pub steps: u32,
    /// Body weight in pounds, if any was recorded
    pub weight_lbs: Option<f64>,
}

impl DailyHistoryEntry {
    /// Deterministic document ID, so repeated upserts hit the same record.
    pub fn doc_id(&self) -> String {
        history_doc_id(&self.user_id, self.date)
    }

    /// Whether this day still needs to be fetched (no steps recorded).
    ///
    /// Zero steps is indistinguishable from "not fetched yet", so such days
    /// are retried on every cycle.
    pub fn is_missing_steps(&self) -> bool {
        self.steps == 0
    }

    /// Whether the day has steps but no weight.
    pub fn needs_weight(&self) -> bool {
        self.steps > 0 && self.weight_lbs.is_none()
    }
}

/// Document ID for a user's history entry on a given day.
pub fn history_doc_id(user_id: &str, date: NaiveDate) -> String {
    format!("{}_{}", user_id, date.format("%Y-%m-%d"))
}

/// One normalized provider bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct DaySample {
    pub date: NaiveDate,
    pub steps: u32,
    pub weight_lbs: Option<f64>,
}
