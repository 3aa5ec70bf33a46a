//! Fixtures shared by the application layer's unit tests.

use super::notifications::NotificationOutbox;
use super::{Context, Policy};
use crate::domain::account::{Account, AccountHolder, AccountType};
use crate::domain::money::Balance;
use crate::domain::ports::{AccountRepository, SessionStoreRef};
use crate::infrastructure::credentials::InMemoryCredentialStore;
use crate::infrastructure::in_memory::InMemoryStore;
use crate::infrastructure::push::LogNotificationSink;
use crate::infrastructure::sessions::InMemorySessionStore;
use std::sync::Arc;

pub const BANK: &str = "a0299975-b8e2-4358-8f1a-911ee12dbaac";

pub fn holder(id: &str) -> AccountHolder {
    AccountHolder {
        identification_number: id.to_string(),
        given_name: "Jane".to_string(),
        family_name: "Doe".to_string(),
        date_of_birth: "19900101".to_string(),
        contact_number_1: String::new(),
        contact_number_2: String::new(),
        email_address: "jane@example.com".to_string(),
        address_line_1: String::new(),
        address_line_2: String::new(),
        address_line_3: String::new(),
        postal_code: String::new(),
    }
}

/// Opens `number` for holder `id` with the given balance and no overdraft.
pub async fn seed_account(store: &InMemoryStore, id: &str, number: &str, balance: Balance) {
    let account = Account::open(
        number,
        BANK,
        "Doe,Jane",
        AccountType::Cheque,
        balance,
        Balance::ZERO,
    );
    store.open_account(holder(id), account).await.unwrap();
}

pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub ctx: Context,
}

pub fn fixture_with(policy: Policy, sessions: SessionStoreRef) -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    let (outbox, _worker) =
        NotificationOutbox::start(store.clone(), Arc::new(LogNotificationSink));
    let ctx = Context {
        accounts: store.clone(),
        ledger: store.clone(),
        sessions,
        credentials: Arc::new(InMemoryCredentialStore::new("pepper")),
        outbox,
        policy,
    };
    Fixture { store, ctx }
}

pub fn fixture() -> Fixture {
    fixture_with(Policy::default(), Arc::new(InMemorySessionStore::new()))
}
