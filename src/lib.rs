// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Challenge Tracker: fitness data sync and challenge scoring.
//!
//! This crate provides the backend API that pulls daily steps and weight
//! from Google Fit, reconciles them into per-day history, and scores users
//! in step-goal and weight-loss challenges.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;
pub mod units;

use config::Config;
use db::{CredentialStore, EncryptedCredentialStore, FirestoreDb, HistoryStore, MemoryDb, Store};
use services::{
    BroadcastHub, ConsentBroker, FitnessProvider, GoogleGrantor, GoogleOAuthClient, KmsService,
    SyncDeps, SyncService,
};
use std::sync::Arc;

/// Storage handles, one per concern.
#[derive(Clone)]
pub struct Stores {
    pub store: Arc<dyn Store>,
    pub history: Arc<dyn HistoryStore>,
    pub credentials: Arc<dyn CredentialStore>,
}

impl Stores {
    /// Everything backed by one in-process [`MemoryDb`].
    pub fn memory(db: MemoryDb) -> Self {
        Self {
            store: Arc::new(db.clone()),
            history: Arc::new(db.clone()),
            credentials: Arc::new(db),
        }
    }

    /// Firestore documents with KMS-encrypted credentials.
    pub fn firestore(db: FirestoreDb, kms: KmsService) -> Self {
        Self {
            store: Arc::new(db.clone()),
            history: Arc::new(db.clone()),
            credentials: Arc::new(EncryptedCredentialStore::new(db, kms)),
        }
    }
}

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub history: Arc<dyn HistoryStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub oauth: GoogleOAuthClient,
    pub hub: BroadcastHub,
    pub consent: Arc<ConsentBroker>,
    pub sync: SyncService,
}

impl AppState {
    /// Wire the sync engine, consent broker and real-time hub together.
    pub fn new(
        config: Config,
        stores: Stores,
        provider: Arc<dyn FitnessProvider>,
    ) -> anyhow::Result<Self> {
        let oauth = GoogleOAuthClient::new(&config)?;
        let hub = BroadcastHub::new();
        let consent = Arc::new(ConsentBroker::new(Arc::new(hub.clone())));
        let grantor = GoogleGrantor::new(
            oauth.clone(),
            consent.clone(),
            config.sync.consent_timeout,
        );

        let sync = SyncService::new(
            SyncDeps {
                store: stores.store.clone(),
                history: stores.history.clone(),
                credentials: stores.credentials.clone(),
                provider,
                grantor: Arc::new(grantor),
                sink: Arc::new(hub.clone()),
            },
            config.sync.clone(),
        );

        Ok(Self {
            config,
            store: stores.store,
            history: stores.history,
            credentials: stores.credentials,
            oauth,
            hub,
            consent,
            sync,
        })
    }
}
