// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Mass unit conversion shared by the sync engine and manual weight entry.

/// Pounds per kilogram.
const LBS_PER_KG: f64 = 2.20462;

/// Provider weights below this value are treated as kilograms.
///
/// Fragile: a user under 150 lbs whose source already reports pounds will
/// be converted a second time. Kept as-is for compatibility with stored data.
pub const KG_HEURISTIC_THRESHOLD: f64 = 150.0;

/// Convert kilograms to pounds, rounded to 2 decimal places.
///
/// Returns `None` unless `kg` is a finite, strictly positive number.
pub fn kg_to_lbs(kg: f64) -> Option<f64> {
    if !kg.is_finite() || kg <= 0.0 {
        return None;
    }
    Some(round2(kg * LBS_PER_KG))
}

/// Normalize a provider-reported weight of unknown unit to pounds.
///
/// Values under [`KG_HEURISTIC_THRESHOLD`] are assumed to be kilograms.
pub fn provider_weight_to_lbs(value: f64) -> Option<f64> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    if value < KG_HEURISTIC_THRESHOLD {
        kg_to_lbs(value)
    } else {
        Some(value)
    }
}

/// Round to 2 decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
