#![allow(dead_code)]

use async_trait::async_trait;
use bankcore::application::decoder::CommandVector;
use bankcore::application::dispatcher::{DispatchError, Dispatcher};
use bankcore::application::notifications::NotificationOutbox;
use bankcore::application::{Context, Policy};
use bankcore::domain::account::PushToken;
use bankcore::domain::ports::{Notification, NotificationSink};
use bankcore::error::Result;
use bankcore::infrastructure::credentials::InMemoryCredentialStore;
use bankcore::infrastructure::in_memory::InMemoryStore;
use bankcore::infrastructure::sessions::InMemorySessionStore;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PASSWORD: &str = "correct horse";

/// Sink that remembers every delivery.
#[derive(Default)]
pub struct RecordingSink {
    deliveries: Mutex<Vec<(PushToken, Notification)>>,
}

impl RecordingSink {
    pub fn messages_for(&self, device: &str) -> Vec<String> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .filter(|(token, _)| token.token == device)
            .map(|(_, notification)| notification.message.clone())
            .collect()
    }

    /// Polls until `device` has received `count` notifications.
    pub async fn wait_for(&self, device: &str, count: usize) -> Vec<String> {
        for _ in 0..100 {
            let messages = self.messages_for(device);
            if messages.len() >= count {
                return messages;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.messages_for(device)
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, device: &PushToken, notification: &Notification) -> Result<()> {
        self.deliveries
            .lock()
            .unwrap()
            .push((device.clone(), notification.clone()));
        Ok(())
    }
}

pub struct TestBank {
    pub dispatcher: Arc<Dispatcher>,
    pub sink: Arc<RecordingSink>,
}

pub async fn bank() -> TestBank {
    bank_with(Policy::default()).await
}

pub async fn bank_with(policy: Policy) -> TestBank {
    let store = Arc::new(InMemoryStore::new());
    let sink = Arc::new(RecordingSink::default());
    let (outbox, _worker) = NotificationOutbox::start(store.clone(), sink.clone());
    let ctx = Context {
        accounts: store.clone(),
        ledger: store,
        sessions: Arc::new(InMemorySessionStore::new()),
        credentials: Arc::new(InMemoryCredentialStore::new("test-pepper")),
        outbox,
        policy,
    };
    let dispatcher = Dispatcher::bootstrap(ctx).await.unwrap();
    TestBank {
        dispatcher: Arc::new(dispatcher),
        sink,
    }
}

/// Tilde line for a public account opening.
pub fn open_account_line(id: &str, given: &str, family: &str, account_type: &str) -> String {
    format!(
        "0~acmt~1~{given}~{family}~19900101~{id}~0821234567~~{given}@example.com~1 Main Road~~~8001~{account_type}"
    )
}

impl TestBank {
    pub async fn send(&self, line: &str) -> std::result::Result<Value, DispatchError> {
        self.dispatcher
            .dispatch(&CommandVector::parse_line(line))
            .await
    }

    pub async fn ok(&self, line: &str) -> Value {
        match self.send(line).await {
            Ok(value) => value,
            Err(e) => panic!("`{}` failed: {}", line, e),
        }
    }

    /// Opens a cheque account for a new holder, registers a password and
    /// logs in. Returns `(token, account_number)`.
    pub async fn register(&self, id: &str, given: &str) -> (String, String) {
        let account = self
            .ok(&open_account_line(id, given, "Tester", "cheque"))
            .await;
        self.ok(&format!("0~appauth~3~{}~{}", id, PASSWORD)).await;
        let token = self.login(id).await;
        let number = account["account_number"].as_str().unwrap().to_string();
        (token, number)
    }

    pub async fn login(&self, id: &str) -> String {
        let reply = self.ok(&format!("0~appauth~2~{}~{}", id, PASSWORD)).await;
        reply["token"].as_str().unwrap().to_string()
    }

    pub async fn balance(&self, token: &str, account_number: &str) -> Decimal {
        let accounts = self.ok(&format!("{}~acmt~1001", token)).await;
        let account = accounts
            .as_array()
            .unwrap()
            .iter()
            .find(|a| a["account_number"] == account_number)
            .unwrap_or_else(|| panic!("account {} not listed", account_number));
        decimal(&account["balance"])
    }
}

pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(raw) => Decimal::from_str(raw).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}
