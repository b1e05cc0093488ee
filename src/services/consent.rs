// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rendezvous between a sync cycle that needs user consent and the OAuth
//! callback that eventually delivers it.

use crate::error::GrantError;
use crate::models::AccessCredential;
use crate::services::realtime::SnapshotSink;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Pending interactive grants, keyed by user.
pub struct ConsentBroker {
    waiters: DashMap<String, Vec<oneshot::Sender<AccessCredential>>>,
    sink: Arc<dyn SnapshotSink>,
}

impl ConsentBroker {
    pub fn new(sink: Arc<dyn SnapshotSink>) -> Self {
        Self {
            waiters: DashMap::new(),
            sink,
        }
    }

    /// Prompt the user and wait up to `timeout` for a fresh credential.
    ///
    /// Fails immediately when the user has no open real-time connection,
    /// since nobody could see the prompt.
    pub async fn wait(
        &self,
        user_id: &str,
        timeout: Duration,
    ) -> Result<AccessCredential, GrantError> {
        if !self.sink.has_listener(user_id) {
            return Err(GrantError::Unavailable(
                "no connected session to prompt".to_string(),
            ));
        }

        let (tx, rx) = oneshot::channel();
        self.waiters.entry(user_id.to_string()).or_default().push(tx);
        self.sink.publish_consent_required(user_id);

        tracing::info!(user_id, timeout_secs = timeout.as_secs(), "Waiting for user consent");

        let result = tokio::time::timeout(timeout, rx).await;
        self.prune(user_id);

        match result {
            Ok(Ok(credential)) => Ok(credential),
            Ok(Err(_)) => Err(GrantError::Unavailable("consent request dropped".to_string())),
            Err(_) => {
                tracing::warn!(user_id, "Consent request timed out");
                Err(GrantError::Unavailable("consent timed out".to_string()))
            }
        }
    }

    /// Hand a freshly granted credential to every waiter for `user_id`.
    ///
    /// Returns the number of waiters satisfied.
    pub fn fulfill(&self, user_id: &str, credential: &AccessCredential) -> usize {
        let Some((_, senders)) = self.waiters.remove(user_id) else {
            return 0;
        };

        senders
            .into_iter()
            .map(|tx| tx.send(credential.clone()).is_ok())
            .filter(|delivered| *delivered)
            .count()
    }

    /// Whether anyone is waiting on `user_id`.
    pub fn is_waiting(&self, user_id: &str) -> bool {
        self.waiters
            .get(user_id)
            .is_some_and(|senders| senders.iter().any(|tx| !tx.is_closed()))
    }

    fn prune(&self, user_id: &str) {
        if let Some(mut senders) = self.waiters.get_mut(user_id) {
            senders.retain(|tx| !tx.is_closed());
        }
        self.waiters.remove_if(user_id, |_, senders| senders.is_empty());
    }
}
