// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credential persistence in Firestore, encrypted with Cloud KMS.

use crate::db::{CredentialStore, FirestoreDb};
use crate::error::AppError;
use crate::models::credential::EncryptedCredential;
use crate::models::AccessCredential;
use crate::services::kms::{credential_aad, KmsService};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// [`CredentialStore`] that never writes a token to Firestore in plaintext.
#[derive(Clone)]
pub struct EncryptedCredentialStore {
    db: FirestoreDb,
    kms: KmsService,
}

impl EncryptedCredentialStore {
    pub fn new(db: FirestoreDb, kms: KmsService) -> Self {
        Self { db, kms }
    }
}

#[async_trait]
impl CredentialStore for EncryptedCredentialStore {
    async fn load_credential(&self, user_id: &str) -> Result<Option<AccessCredential>, AppError> {
        let Some(doc) = self.db.get_credential_doc(user_id).await? else {
            return Ok(None);
        };

        let aad = credential_aad(user_id);
        let token = self.kms.decrypt(&doc.token_encrypted, &aad).await?;
        let refresh_token = match &doc.refresh_token_encrypted {
            Some(enc) => Some(self.kms.decrypt(enc, &aad).await?),
            None => None,
        };

        let expires_at = DateTime::parse_from_rfc3339(&doc.expires_at)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to parse expiry: {}", e)))?
            .with_timezone(&Utc);

        Ok(Some(AccessCredential {
            token,
            expires_at,
            refresh_token,
        }))
    }

    async fn save_credential(
        &self,
        user_id: &str,
        credential: &AccessCredential,
    ) -> Result<(), AppError> {
        let aad = credential_aad(user_id);
        let token_encrypted = self.kms.encrypt(&credential.token, &aad).await?;
        let refresh_token_encrypted = match &credential.refresh_token {
            Some(refresh) => Some(self.kms.encrypt(refresh, &aad).await?),
            None => None,
        };

        let doc = EncryptedCredential {
            user_id: user_id.to_string(),
            token_encrypted,
            refresh_token_encrypted,
            expires_at: credential.expires_at.to_rfc3339(),
        };

        self.db.set_credential_doc(&doc).await
    }

    async fn delete_credential(&self, user_id: &str) -> Result<(), AppError> {
        self.db.delete_credential_doc(user_id).await
    }

    async fn connected_users(&self) -> Result<Vec<String>, AppError> {
        Ok(self
            .db
            .list_credential_docs()
            .await?
            .into_iter()
            .map(|doc| doc.user_id)
            .collect())
    }
}
