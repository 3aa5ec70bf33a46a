use super::account::{Account, AccountRef};
use super::money::{Amount, Balance};
use crate::error::{BankError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Payment initiation codes recorded on ledger entries.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    CreditTransfer,
    Deposit,
}

impl TransactionType {
    pub fn code(self) -> u32 {
        match self {
            Self::CreditTransfer => 1,
            Self::Deposit => 1000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Approved,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Parses a latitude/longitude pair. Two empty fields mean "no location".
    pub fn parse(lat: &str, lon: &str) -> Result<Option<Self>> {
        if lat.is_empty() && lon.is_empty() {
            return Ok(None);
        }
        let parse = |raw: &str| {
            raw.trim().parse::<f64>().map_err(|_| {
                BankError::ValidationError(format!(
                    "Could not parse coordinate '{}' into float",
                    raw
                ))
            })
        };
        Ok(Some(Self {
            lat: parse(lat)?,
            lon: parse(lon)?,
        }))
    }
}

/// Immutable record of one funds movement.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct LedgerEntry {
    pub id: u64,
    pub transaction_type: TransactionType,
    pub sender: AccountRef,
    pub receiver: AccountRef,
    pub amount: Amount,
    pub fee: Balance,
    pub geo: Option<GeoPoint>,
    pub description: String,
    pub status: EntryStatus,
    pub timestamp: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn involves(&self, account_number: &str) -> bool {
        self.sender.account_number == account_number
            || self.receiver.account_number == account_number
    }
}

/// A ledger entry that has been initiated but not yet committed.
#[derive(Debug, PartialEq, Clone)]
pub struct PendingEntry {
    pub transaction_type: TransactionType,
    pub sender: AccountRef,
    pub receiver: AccountRef,
    pub amount: Amount,
    pub fee: Balance,
    pub geo: Option<GeoPoint>,
    pub description: String,
}

impl PendingEntry {
    pub fn approve(self, id: u64, timestamp: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            id,
            transaction_type: self.transaction_type,
            sender: self.sender,
            receiver: self.receiver,
            amount: self.amount,
            fee: self.fee,
            geo: self.geo,
            description: self.description,
            status: EntryStatus::Approved,
            timestamp,
        }
    }
}

/// One side of a balance change within a [`Movement`].
#[derive(Debug, PartialEq, Clone)]
pub struct Leg {
    pub account_number: String,
    pub amount: Balance,
}

impl Leg {
    pub fn new(account_number: impl Into<String>, amount: Balance) -> Self {
        Self {
            account_number: account_number.into(),
            amount,
        }
    }
}

/// The unit of work committed by a `LedgerStore`: the ledger entry plus every
/// balance change it implies. Either all of it is applied or none of it.
#[derive(Debug, PartialEq, Clone)]
pub struct Movement {
    pub entry: PendingEntry,
    /// Conditional withdrawal; fails the whole movement if not covered.
    pub debit: Option<Leg>,
    pub credits: Vec<Leg>,
}

impl Movement {
    /// Applies every leg to copies of the accounts returned by `load` and
    /// returns the updated copies. Fails on the first unknown account or
    /// uncovered debit or out-of-range balance; nothing is written either way.
    pub fn stage<F>(&self, mut load: F) -> Result<HashMap<String, Account>>
    where
        F: FnMut(&str) -> Result<Option<Account>>,
    {
        let mut fetch = |number: &str| -> Result<Account> {
            load(number)?.ok_or_else(|| BankError::NotFoundError(format!("account {}", number)))
        };
        let mut staged = HashMap::new();
        if let Some(debit) = &self.debit {
            let mut account = fetch(&debit.account_number)?;
            account.debit(debit.amount)?;
            staged.insert(debit.account_number.clone(), account);
        }
        for credit in &self.credits {
            let mut account = match staged.remove(&credit.account_number) {
                Some(account) => account,
                None => fetch(&credit.account_number)?,
            };
            account.credit(credit.amount)?;
            staged.insert(credit.account_number.clone(), account);
        }
        Ok(staged)
    }
}

/// Paging window over an account's ledger, newest entries first.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct LedgerQuery {
    pub offset: usize,
    pub limit: usize,
    pub since: Option<DateTime<Utc>>,
}

impl LedgerQuery {
    /// Applies the window to entries already filtered to one account.
    pub fn page(&self, mut entries: Vec<LedgerEntry>) -> Vec<LedgerEntry> {
        if let Some(since) = self.since {
            entries.retain(|entry| entry.timestamp > since);
        }
        entries.sort_by(|a, b| b.id.cmp(&a.id));
        entries
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect()
    }
}
