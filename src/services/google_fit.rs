// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Fit aggregate client and response normalization.
//!
//! Handles:
//! - One day-bucketed aggregate query for steps and body weight
//! - Bucket timestamps in epoch-millis or epoch-nanos, as numbers or strings
//! - Delta and summary step semantics
//! - Kilogram/pound disambiguation of weight values
//! - Status mapping for token refresh and rate-limit handling

use crate::models::DaySample;
use crate::services::provider::{FetchedDays, FitnessProvider, ProviderError};
use crate::time_utils::day_from_millis;
use crate::units::provider_weight_to_lbs;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

const STEP_DATA_TYPE: &str = "com.google.step_count.delta";
const WEIGHT_DATA_TYPE: &str = "com.google.weight";
const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Timestamps above this are epoch-nanoseconds rather than milliseconds.
const NANOS_THRESHOLD: i64 = 1_000_000_000_000_000;

/// Google Fit REST client.
#[derive(Clone)]
pub struct GoogleFitClient {
    http: reqwest::Client,
    base_url: String,
}

impl GoogleFitClient {
    /// Create a client whose every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transient(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Check response status and parse the JSON body.
    async fn check_response_json(&self, response: reqwest::Response) -> Result<Value, ProviderError> {
        let status = response.status();

        if status.as_u16() == 401 {
            return Err(ProviderError::Unauthorized);
        }

        if status.as_u16() == 429 {
            tracing::warn!("Google Fit rate limit hit (429)");
            return Err(ProviderError::RateLimited);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Transient(format!("HTTP {}: {}", status, body)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Transient(format!("Failed to read body: {}", e)))?;

        serde_json::from_str(&body)
            .map_err(|e| ProviderError::Malformed(format!("JSON parse error: {}", e)))
    }
}

#[async_trait]
impl FitnessProvider for GoogleFitClient {
    async fn fetch_aggregate(
        &self,
        token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<FetchedDays, ProviderError> {
        let url = format!("{}/users/me/dataset:aggregate", self.base_url);

        let body = serde_json::json!({
            "aggregateBy": [
                { "dataTypeName": STEP_DATA_TYPE },
                { "dataTypeName": WEIGHT_DATA_TYPE }
            ],
            "bucketByTime": { "durationMillis": DAY_MILLIS },
            "startTimeMillis": start.timestamp_millis(),
            "endTimeMillis": end.timestamp_millis(),
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Transient("request timed out".to_string())
                } else {
                    ProviderError::Transient(e.to_string())
                }
            })?;

        let json = self.check_response_json(response).await?;
        normalize_aggregate(&json)
    }
}

// ─── Normalization ───────────────────────────────────────────────────────────

/// Normalize an aggregate response into per-day samples.
///
/// Fails only when the body has no bucket list at all. Individual buckets
/// that cannot be read are logged and skipped.
pub fn normalize_aggregate(body: &Value) -> Result<FetchedDays, ProviderError> {
    let buckets = body
        .get("bucket")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::Malformed("response has no bucket array".to_string()))?;

    let mut fetched = FetchedDays::default();

    for (index, bucket) in buckets.iter().enumerate() {
        match normalize_bucket(bucket) {
            Ok(sample) => fetched.samples.push(sample),
            Err(reason) => {
                tracing::warn!(bucket = index, reason = %reason, "Skipping malformed bucket");
                fetched.skipped_buckets += 1;
            }
        }
    }

    Ok(fetched)
}

#[derive(Debug, PartialEq)]
enum DatasetKind {
    Steps { delta: bool },
    Weight,
    Unknown,
}

fn normalize_bucket(bucket: &Value) -> Result<DaySample, String> {
    let date = bucket_start_millis(bucket)
        .and_then(day_from_millis)
        .ok_or_else(|| "unreadable bucket start time".to_string())?;

    let datasets = bucket
        .get("dataset")
        .and_then(Value::as_array)
        .ok_or_else(|| format!("bucket {} has no dataset array", date))?;

    let mut steps = None;
    let mut weight_lbs = None;

    for (position, dataset) in datasets.iter().enumerate() {
        match dataset_kind(dataset, position) {
            DatasetKind::Steps { delta } => steps = Some(read_steps(dataset, delta)?),
            DatasetKind::Weight => weight_lbs = read_weight(dataset)?,
            DatasetKind::Unknown => {}
        }
    }

    Ok(DaySample {
        date,
        steps: steps.unwrap_or(0),
        weight_lbs,
    })
}

/// Bucket start in epoch-millis, accepting either field and either unit.
fn bucket_start_millis(bucket: &Value) -> Option<i64> {
    let raw = bucket
        .get("startTimeMillis")
        .or_else(|| bucket.get("startTimeNanos"))
        .and_then(number_as_i64)?;

    if raw > NANOS_THRESHOLD {
        Some(raw / 1_000_000)
    } else {
        Some(raw)
    }
}

/// Identify a dataset by its source/type name, falling back to the
/// position requested in `aggregateBy` (steps first, then weight).
fn dataset_kind(dataset: &Value, position: usize) -> DatasetKind {
    let source = dataset
        .get("dataSourceId")
        .and_then(Value::as_str)
        .or_else(|| {
            dataset
                .get("point")
                .and_then(Value::as_array)
                .and_then(|points| points.first())
                .and_then(|p| p.get("dataTypeName"))
                .and_then(Value::as_str)
        });

    match source {
        Some(name) if name.contains("step_count") => DatasetKind::Steps {
            delta: name.contains(".delta"),
        },
        Some(name) if name.contains("weight") => DatasetKind::Weight,
        Some(_) => DatasetKind::Unknown,
        None => match position {
            0 => DatasetKind::Steps { delta: true },
            1 => DatasetKind::Weight,
            _ => DatasetKind::Unknown,
        },
    }
}

fn points(dataset: &Value) -> &[Value] {
    dataset
        .get("point")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// The numeric values carried by one point.
fn point_values(point: &Value) -> Result<Vec<f64>, String> {
    let Some(values) = point.get("value").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    values
        .iter()
        .map(|v| {
            v.get("intVal")
                .or_else(|| v.get("fpVal"))
                .and_then(number_as_f64)
                .ok_or_else(|| format!("unreadable point value: {}", v))
        })
        .collect()
}

fn read_steps(dataset: &Value, delta: bool) -> Result<u32, String> {
    let mut total: f64 = 0.0;
    let mut last_positive: f64 = 0.0;

    for point in points(dataset) {
        for value in point_values(point)? {
            if value < 0.0 {
                return Err(format!("negative step count {}", value));
            }
            total += value;
            if value > 0.0 {
                last_positive = value;
            }
        }
    }

    let steps = if delta { total } else { last_positive };
    Ok(steps.round().min(u32::MAX as f64) as u32)
}

/// Most recent weight of the day: last value of the last point.
fn read_weight(dataset: &Value) -> Result<Option<f64>, String> {
    let Some(last_point) = points(dataset).last() else {
        return Ok(None);
    };
    Ok(point_values(last_point)?
        .last()
        .and_then(|&value| provider_weight_to_lbs(value)))
}

fn number_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn number_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|f: &f64| f.is_finite())
}
