// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Fit client tests against a mock aggregate endpoint.

use challenge_tracker::services::{FitnessProvider, GoogleFitClient, ProviderError};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AGGREGATE_PATH: &str = "/fitness/v1/users/me/dataset:aggregate";

fn window() -> (DateTime<Utc>, DateTime<Utc>) {
    (
        Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2025, 1, 4, 0, 0, 0).unwrap(),
    )
}

fn client(server: &MockServer, timeout: Duration) -> GoogleFitClient {
    GoogleFitClient::new(&format!("{}/fitness/v1/", server.uri()), timeout).unwrap()
}

async fn fetch_with_status(status: u16) -> Result<challenge_tracker::services::FetchedDays, ProviderError> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AGGREGATE_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_string("{\"error\":{}}"))
        .mount(&server)
        .await;

    let (start, end) = window();
    client(&server, Duration::from_secs(5))
        .fetch_aggregate("token", start, end)
        .await
}

#[tokio::test]
async fn test_aggregate_success() {
    let server = MockServer::start().await;
    let (start, end) = window();

    Mock::given(method("POST"))
        .and(path(AGGREGATE_PATH))
        .and(header("authorization", "Bearer access-1"))
        .and(body_partial_json(serde_json::json!({
            "startTimeMillis": start.timestamp_millis(),
            "endTimeMillis": end.timestamp_millis(),
            "bucketByTime": { "durationMillis": 86_400_000 },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "bucket": [
                {
                    "startTimeMillis": "1735776000000",
                    "endTimeMillis": "1735862400000",
                    "dataset": [
                        {
                            "dataSourceId": "derived:com.google.step_count.delta:com.google.android.gms:aggregated",
                            "point": [
                                { "value": [{ "intVal": 4000 }] },
                                { "value": [{ "intVal": 6500 }] }
                            ]
                        },
                        {
                            "dataSourceId": "derived:com.google.weight.summary:com.google.android.gms:aggregated",
                            "point": [{ "value": [{ "fpVal": 80.0 }, { "fpVal": 79.5 }, { "fpVal": 80.0 }] }]
                        }
                    ]
                },
                {
                    "startTimeMillis": "1735862400000",
                    "endTimeMillis": "1735948800000",
                    "dataset": [
                        { "dataSourceId": "derived:com.google.step_count.delta:com.google.android.gms:aggregated", "point": [] },
                        { "dataSourceId": "derived:com.google.weight.summary:com.google.android.gms:aggregated", "point": [] }
                    ]
                }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let fetched = client(&server, Duration::from_secs(5))
        .fetch_aggregate("access-1", start, end)
        .await
        .unwrap();

    assert_eq!(fetched.skipped_buckets, 0);
    assert_eq!(fetched.samples.len(), 2);

    let first = &fetched.samples[0];
    assert_eq!(first.date, NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
    assert_eq!(first.steps, 10_500);
    assert_eq!(first.weight_lbs, Some(176.37));

    let second = &fetched.samples[1];
    assert_eq!(second.steps, 0);
    assert_eq!(second.weight_lbs, None);
}

#[tokio::test]
async fn test_unauthorized() {
    assert_eq!(fetch_with_status(401).await, Err(ProviderError::Unauthorized));
}

#[tokio::test]
async fn test_rate_limited() {
    assert_eq!(fetch_with_status(429).await, Err(ProviderError::RateLimited));
}

#[tokio::test]
async fn test_server_error_is_transient() {
    assert!(matches!(
        fetch_with_status(503).await,
        Err(ProviderError::Transient(_))
    ));
}

#[tokio::test]
async fn test_missing_bucket_list_is_malformed() {
    assert!(matches!(
        fetch_with_status(200).await,
        Err(ProviderError::Malformed(_))
    ));
}

#[tokio::test]
async fn test_non_json_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AGGREGATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let (start, end) = window();
    let result = client(&server, Duration::from_secs(5))
        .fetch_aggregate("token", start, end)
        .await;
    assert!(matches!(result, Err(ProviderError::Malformed(_))));
}

#[tokio::test]
async fn test_timeout_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AGGREGATE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "bucket": [] }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let (start, end) = window();
    let result = client(&server, Duration::from_millis(200))
        .fetch_aggregate("token", start, end)
        .await;
    assert!(matches!(result, Err(ProviderError::Transient(_))));
}
