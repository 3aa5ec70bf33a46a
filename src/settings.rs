//! Runtime settings.
//!
//! Built-in defaults are overridden by `bankcore.toml` (or the file given with
//! `--config`), which is in turn overridden by `BANKCORE__SECTION__KEY`
//! environment variables.

use crate::application::Policy;
use crate::domain::money::{Balance, FeeRate};
use crate::error::{BankError, Result};
use crate::interfaces::tcp::TcpConfig;
use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_FILE: &str = "bankcore";

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Bank {
    pub bank_number: String,
    pub fee_rate: String,
    pub fee_account: String,
    pub opening_balance: String,
    pub opening_overdraft: String,
    pub allow_unfunded_deposits: bool,
    pub password_pepper: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub ttl_secs: u64,
    pub single_session_per_holder: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Http {
    pub bind: String,
    pub port: u16,
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tcp {
    pub bind: String,
    pub port: u16,
    pub max_connections: usize,
    pub io_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub log: Log,
    pub bank: Bank,
    pub session: Session,
    pub http: Http,
    pub tcp: Tcp,
    #[serde(default)]
    pub storage: Storage,
}

impl Settings {
    /// Loads settings. An explicit `path` must exist; the default
    /// `bankcore.toml` is optional.
    pub fn load(path: Option<&Path>) -> std::result::Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_FILE).required(false),
        };

        let settings = Config::builder()
            .set_default("log.level", "info")?
            .set_default("bank.bank_number", "a0299975-b8e2-4358-8f1a-911ee12dbaac")?
            .set_default("bank.fee_rate", "0.0001")?
            .set_default("bank.fee_account", "fees")?
            .set_default("bank.opening_balance", "100")?
            .set_default("bank.opening_overdraft", "0")?
            .set_default("bank.allow_unfunded_deposits", true)?
            .set_default("bank.password_pepper", "")?
            .set_default("session.ttl_secs", 3600_i64)?
            .set_default("session.single_session_per_holder", false)?
            .set_default("http.bind", "127.0.0.1")?
            .set_default("http.port", 8080_i64)?
            .set_default("http.max_in_flight", 256_i64)?
            .set_default("tcp.bind", "127.0.0.1")?
            .set_default("tcp.port", 6600_i64)?
            .set_default("tcp.max_connections", 256_i64)?
            .set_default("tcp.io_timeout_secs", 10_i64)?
            .add_source(file)
            .add_source(
                Environment::with_prefix("BANKCORE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }

    pub fn policy(&self) -> Result<Policy> {
        let fee_rate = FeeRate::new(decimal("bank.fee_rate", &self.bank.fee_rate)?)?;
        Ok(Policy {
            bank_number: self.bank.bank_number.clone(),
            fee_rate,
            fee_account: self.bank.fee_account.clone(),
            opening_balance: Balance::new(decimal(
                "bank.opening_balance",
                &self.bank.opening_balance,
            )?),
            opening_overdraft: Balance::new(decimal(
                "bank.opening_overdraft",
                &self.bank.opening_overdraft,
            )?),
            session_ttl: Duration::from_secs(self.session.ttl_secs),
            single_session_per_holder: self.session.single_session_per_holder,
            allow_unfunded_deposits: self.bank.allow_unfunded_deposits,
        })
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http.bind, self.http.port)
    }

    pub fn tcp_addr(&self) -> String {
        format!("{}:{}", self.tcp.bind, self.tcp.port)
    }

    pub fn tcp_config(&self) -> TcpConfig {
        TcpConfig {
            max_connections: self.tcp.max_connections,
            io_timeout: Duration::from_secs(self.tcp.io_timeout_secs),
        }
    }
}

fn decimal(key: &str, raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw.trim())
        .map_err(|e| BankError::ValidationError(format!("{}: {} ({})", key, raw, e)))
}
