use crate::domain::ports::CredentialStore;
use crate::error::{BankError, Result};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const SALT_BYTES: usize = 16;

/// A salted, peppered SHA-256 password digest.
///
/// The pepper is deployment configuration and never stored with the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CredentialRecord {
    salt: String,
    hash: String,
}

impl CredentialRecord {
    pub(crate) fn issue(password: &str, pepper: &str) -> Self {
        let salt: [u8; SALT_BYTES] = rand::thread_rng().r#gen();
        let salt = hex::encode(salt);
        let hash = digest(&salt, password, pepper);
        Self { salt, hash }
    }

    pub(crate) fn verify(&self, password: &str, pepper: &str) -> bool {
        digests_match(&digest(&self.salt, password, pepper), &self.hash)
    }
}

fn digest(salt: &str, password: &str, pepper: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher.update(pepper.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compares digests without short-circuiting on the first mismatch.
fn digests_match(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

/// Credential store kept in process memory; records are lost on restart.
#[derive(Clone)]
pub struct InMemoryCredentialStore {
    pepper: String,
    records: Arc<RwLock<HashMap<String, CredentialRecord>>>,
}

impl InMemoryCredentialStore {
    pub fn new(pepper: impl Into<String>) -> Self {
        Self {
            pepper: pepper.into(),
            records: Arc::default(),
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn exists(&self, identification_number: &str) -> Result<bool> {
        let records = self.records.read().await;
        Ok(records.contains_key(identification_number))
    }

    async fn create(&self, identification_number: &str, password: &str) -> Result<()> {
        let record = CredentialRecord::issue(password, &self.pepper);
        let mut records = self.records.write().await;
        if records.contains_key(identification_number) {
            return Err(BankError::ConflictError(format!(
                "credential for {} already exists",
                identification_number
            )));
        }
        records.insert(identification_number.to_string(), record);
        Ok(())
    }

    async fn verify(&self, identification_number: &str, password: &str) -> Result<bool> {
        let records = self.records.read().await;
        Ok(records
            .get(identification_number)
            .is_some_and(|r| r.verify(password, &self.pepper)))
    }

    async fn remove(&self, identification_number: &str) -> Result<bool> {
        let mut records = self.records.write().await;
        Ok(records.remove(identification_number).is_some())
    }
}
