// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use challenge_tracker::config::Config;
use challenge_tracker::db::{FirestoreDb, MemoryDb};
use challenge_tracker::middleware::auth::create_jwt;
use challenge_tracker::models::DaySample;
use challenge_tracker::routes::create_router;
use challenge_tracker::services::{FetchedDays, FitnessProvider, ProviderError};
use challenge_tracker::{AppState, Stores};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Provider that serves canned days, filtered to the requested range.
#[derive(Default)]
pub struct StubProvider {
    days: Mutex<Vec<DaySample>>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl StubProvider {
    pub fn with_days(days: Vec<DaySample>) -> Self {
        Self {
            days: Mutex::new(days),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FitnessProvider for StubProvider {
    async fn fetch_aggregate(
        &self,
        _token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<FetchedDays, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (start, end) = (start.date_naive(), end.date_naive());
        let samples = self
            .days
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.date >= start && d.date < end)
            .cloned()
            .collect();
        Ok(FetchedDays {
            samples,
            skipped_buckets: 0,
        })
    }
}

/// In-memory app: router, shared state, and the backing store for seeding.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub db: MemoryDb,
}

/// Create a test app backed by [`MemoryDb`] and a provider with no data.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with(Config::default(), Arc::new(StubProvider::default()))
}

#[allow(dead_code)]
pub fn create_test_app_with(config: Config, provider: Arc<dyn FitnessProvider>) -> TestApp {
    let db = MemoryDb::new();
    let state = Arc::new(
        AppState::new(config, Stores::memory(db.clone()), provider)
            .expect("Failed to build app state"),
    );

    TestApp {
        router: create_router(state.clone()),
        state,
        db,
    }
}

/// `Authorization` header value for a session of `user_id`.
#[allow(dead_code)]
pub fn bearer(user_id: &str) -> String {
    let token = create_jwt(user_id, &Config::default().jwt_signing_key)
        .expect("Failed to create JWT");
    format!("Bearer {}", token)
}
