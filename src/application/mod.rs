//! Application layer containing the core business logic orchestration.
//!
//! Transports hand raw command vectors to the [`dispatcher::Dispatcher`], which
//! decodes them once, authorizes them through the [`auth::AuthorizationGate`]
//! and routes the typed command to the transaction engine or the account
//! service. Every collaborator is injected through a [`Context`].

pub mod accounts;
pub mod auth;
pub mod decoder;
pub mod dispatcher;
pub mod engine;
pub mod notifications;
#[cfg(test)]
pub(crate) mod test_support;

use crate::domain::money::{Balance, FeeRate};
use crate::domain::ports::{
    AccountRepositoryRef, CredentialStoreRef, LedgerStoreRef, SessionStoreRef,
};
use notifications::NotificationOutbox;
use rust_decimal_macros::dec;
use std::time::Duration;

/// Deployment-wide business rules.
#[derive(Debug, Clone)]
pub struct Policy {
    pub bank_number: String,
    pub fee_rate: FeeRate,
    /// Account number of the system account collecting transfer fees.
    pub fee_account: String,
    pub opening_balance: Balance,
    pub opening_overdraft: Balance,
    pub session_ttl: Duration,
    pub single_session_per_holder: bool,
    pub allow_unfunded_deposits: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            bank_number: "a0299975-b8e2-4358-8f1a-911ee12dbaac".to_string(),
            fee_rate: FeeRate::STANDARD,
            fee_account: "fees".to_string(),
            opening_balance: Balance::new(dec!(100)),
            opening_overdraft: Balance::ZERO,
            session_ttl: Duration::from_secs(3600),
            single_session_per_holder: false,
            allow_unfunded_deposits: true,
        }
    }
}

/// Everything a request handler may touch.
///
/// Built once at startup and shared; there is no global state.
#[derive(Clone)]
pub struct Context {
    pub accounts: AccountRepositoryRef,
    pub ledger: LedgerStoreRef,
    pub sessions: SessionStoreRef,
    pub credentials: CredentialStoreRef,
    pub outbox: NotificationOutbox,
    pub policy: Policy,
}
