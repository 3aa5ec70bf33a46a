use super::account::{Account, AccountHolder, Merchant, PushToken};
use super::transaction::{LedgerEntry, LedgerQuery, Movement};
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Persistence of holders, accounts, merchants and push tokens.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_holder(&self, identification_number: &str) -> Result<Option<AccountHolder>>;
    /// Stores the account and links it to the holder, creating the holder on
    /// first use.
    async fn open_account(&self, holder: AccountHolder, account: Account) -> Result<()>;
    /// Removes the account, its holder links and push tokens. Fails with a
    /// conflict unless the balance is zero at the moment of removal.
    async fn close_account(&self, account_number: &str) -> Result<()>;
    async fn find_account(&self, account_number: &str) -> Result<Option<Account>>;
    /// Creates a holderless system account unless it already exists.
    async fn ensure_system_account(&self, account: Account) -> Result<()>;
    async fn accounts_for_holder(&self, identification_number: &str) -> Result<Vec<Account>>;
    async fn account_numbers_for_holder(&self, identification_number: &str)
    -> Result<Vec<String>>;
    async fn search_holders(&self, term: &str, limit: usize) -> Result<Vec<AccountHolder>>;
    async fn search_accounts(&self, prefix: &str, limit: usize) -> Result<Vec<Account>>;
    /// Stores the merchant together with its newly opened account.
    async fn create_merchant(&self, merchant: Merchant, account: Account) -> Result<()>;
    async fn find_merchant(&self, merchant_id: &str) -> Result<Option<Merchant>>;
    async fn search_merchants(&self, term: &str, limit: usize) -> Result<Vec<Merchant>>;
    async fn remove_merchant(&self, merchant_id: &str) -> Result<bool>;
    /// Inserts the token, replacing any token of the same account and platform.
    async fn upsert_push_token(&self, token: PushToken) -> Result<()>;
    async fn remove_push_token(&self, token: &PushToken) -> Result<bool>;
    async fn push_tokens_for_account(&self, account_number: &str) -> Result<Vec<PushToken>>;
}

/// Append-only ledger with atomic balance application.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Applies the whole movement or nothing: the debit is conditional on the
    /// account's available balance, every leg's account must exist, and the
    /// ledger entry is only appended when all balance changes succeed.
    async fn commit(&self, movement: Movement) -> Result<LedgerEntry>;
    async fn entries_for_account(
        &self,
        account_number: &str,
        query: &LedgerQuery,
    ) -> Result<Vec<LedgerEntry>>;
}

/// Opaque session tokens with sliding expiry.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, token: &str, principal: &str, ttl: Duration) -> Result<()>;
    /// Returns the principal bound to a live token and resets its expiry.
    async fn touch(&self, token: &str, ttl: Duration) -> Result<Option<String>>;
    async fn remove(&self, token: &str) -> Result<bool>;
    async fn remove_principal(&self, principal: &str) -> Result<usize>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn exists(&self, identification_number: &str) -> Result<bool>;
    async fn create(&self, identification_number: &str, password: &str) -> Result<()>;
    async fn verify(&self, identification_number: &str, password: &str) -> Result<bool>;
    async fn remove(&self, identification_number: &str) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub account_number: String,
    pub message: String,
    pub badge: u32,
    pub sound: String,
}

impl Notification {
    pub fn new(account_number: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            account_number: account_number.into(),
            message: message.into(),
            badge: 1,
            sound: "default".to_string(),
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, device: &PushToken, notification: &Notification) -> Result<()>;
}

pub type AccountRepositoryRef = Arc<dyn AccountRepository>;
pub type LedgerStoreRef = Arc<dyn LedgerStore>;
pub type SessionStoreRef = Arc<dyn SessionStore>;
pub type CredentialStoreRef = Arc<dyn CredentialStore>;
pub type NotificationSinkRef = Arc<dyn NotificationSink>;
