use crate::domain::account::{Account, AccountHolder, Merchant, PushToken};
use crate::domain::ports::{AccountRepository, CredentialStore, LedgerStore};
use crate::domain::transaction::{LedgerEntry, LedgerQuery, Movement};
use crate::error::{BankError, Result};
use crate::infrastructure::credentials::CredentialRecord;
use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for account state, keyed by account number.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for account holders, keyed by identification number.
pub const CF_HOLDERS: &str = "holders";
/// Column Family mapping identification number to owned account numbers.
pub const CF_HOLDER_ACCOUNTS: &str = "holder_accounts";
pub const CF_MERCHANTS: &str = "merchants";
/// Column Family for push tokens, keyed by `account\0platform`.
pub const CF_PUSH_TOKENS: &str = "push_tokens";
/// Column Family for ledger entries, keyed by big-endian entry id.
pub const CF_LEDGER: &str = "ledger";
/// Index of ledger entry ids per account, keyed by `account\0id`.
pub const CF_ACCOUNT_LEDGER: &str = "account_ledger";
/// Column Family for password records, keyed by identification number.
pub const CF_CREDENTIALS: &str = "credentials";
pub const CF_META: &str = "meta";

const LEDGER_SEQ_KEY: &[u8] = b"ledger_seq";

const COLUMN_FAMILIES: [&str; 9] = [
    CF_ACCOUNTS,
    CF_HOLDERS,
    CF_HOLDER_ACCOUNTS,
    CF_MERCHANTS,
    CF_PUSH_TOKENS,
    CF_LEDGER,
    CF_ACCOUNT_LEDGER,
    CF_CREDENTIALS,
    CF_META,
];

fn prefixed(first: &str, rest: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(first.len() + 1 + rest.len());
    key.extend_from_slice(first.as_bytes());
    key.push(0);
    key.extend_from_slice(rest);
    key
}

/// A persistent store implementation using RocksDB.
///
/// Every read-modify-write goes through `write_lock` and lands as one
/// `WriteBatch`, so a ledger commit and its balance changes become visible
/// together or not at all.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
    pepper: Arc<str>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating any
    /// missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
            pepper: Arc::from(""),
        })
    }

    /// Sets the pepper mixed into every stored password digest. It must stay
    /// the same across restarts or existing credentials stop verifying.
    pub fn with_pepper(mut self, pepper: impl AsRef<str>) -> Self {
        self.pepper = Arc::from(pepper.as_ref());
        self
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| BankError::internal(format!("{} column family not found", name)))
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_pinned_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        batch.put_cf(self.cf(cf)?, key, serde_json::to_vec(value)?);
        Ok(())
    }

    /// Key/value pairs of `cf` whose key starts with `prefix`.
    fn scan(&self, cf: &str, prefix: &[u8]) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let iter = self
            .db
            .iterator_cf(self.cf(cf)?, IteratorMode::From(prefix, Direction::Forward));
        let mut items = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            items.push((key, value));
        }
        Ok(items)
    }

    fn scan_json<T: DeserializeOwned>(&self, cf: &str, prefix: &[u8]) -> Result<Vec<T>> {
        self.scan(cf, prefix)?
            .into_iter()
            .map(|(_, value)| Ok(serde_json::from_slice(&value)?))
            .collect()
    }

    fn holder_account_numbers(&self, identification_number: &str) -> Result<Vec<String>> {
        Ok(self
            .get_json(CF_HOLDER_ACCOUNTS, identification_number.as_bytes())?
            .unwrap_or_default())
    }

    fn link_account(
        &self,
        batch: &mut WriteBatch,
        identification_number: &str,
        account_number: &str,
    ) -> Result<()> {
        let mut numbers = self.holder_account_numbers(identification_number)?;
        numbers.push(account_number.to_string());
        self.put_json(
            batch,
            CF_HOLDER_ACCOUNTS,
            identification_number.as_bytes(),
            &numbers,
        )
    }

    fn ensure_new_account(&self, account_number: &str) -> Result<()> {
        if self
            .db
            .get_pinned_cf(self.cf(CF_ACCOUNTS)?, account_number.as_bytes())?
            .is_some()
        {
            return Err(BankError::ConflictError(format!(
                "account {} already exists",
                account_number
            )));
        }
        Ok(())
    }

    fn last_entry_id(&self) -> Result<u64> {
        match self.db.get_pinned_cf(self.cf(CF_META)?, LEDGER_SEQ_KEY)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| BankError::internal("corrupt ledger sequence"))?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }
}

#[async_trait]
impl AccountRepository for RocksDBStore {
    async fn find_holder(&self, identification_number: &str) -> Result<Option<AccountHolder>> {
        self.get_json(CF_HOLDERS, identification_number.as_bytes())
    }

    async fn open_account(&self, holder: AccountHolder, account: Account) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.ensure_new_account(&account.account_number)?;

        let id = holder.identification_number.clone();
        let known_holder = self.find_holder(&id).await?.is_some();
        let mut batch = WriteBatch::default();
        if !known_holder {
            self.put_json(&mut batch, CF_HOLDERS, id.as_bytes(), &holder)?;
        }
        self.link_account(&mut batch, &id, &account.account_number)?;
        self.put_json(
            &mut batch,
            CF_ACCOUNTS,
            account.account_number.as_bytes(),
            &account,
        )?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn close_account(&self, account_number: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.find_account(account_number)
            .await?
            .ok_or_else(|| BankError::NotFoundError(format!("account {}", account_number)))?
            .ensure_closable()?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(self.cf(CF_ACCOUNTS)?, account_number.as_bytes());
        for (key, value) in self.scan(CF_HOLDER_ACCOUNTS, b"")? {
            let mut numbers: Vec<String> = serde_json::from_slice(&value)?;
            let before = numbers.len();
            numbers.retain(|n| n != account_number);
            if numbers.len() != before {
                self.put_json(&mut batch, CF_HOLDER_ACCOUNTS, &key, &numbers)?;
            }
        }
        for (key, _) in self.scan(CF_PUSH_TOKENS, &prefixed(account_number, b""))? {
            batch.delete_cf(self.cf(CF_PUSH_TOKENS)?, key);
        }
        self.db.write(batch)?;
        Ok(())
    }

    async fn find_account(&self, account_number: &str) -> Result<Option<Account>> {
        self.get_json(CF_ACCOUNTS, account_number.as_bytes())
    }

    async fn ensure_system_account(&self, account: Account) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.find_account(&account.account_number).await?.is_some() {
            return Ok(());
        }
        let mut batch = WriteBatch::default();
        self.put_json(
            &mut batch,
            CF_ACCOUNTS,
            account.account_number.as_bytes(),
            &account,
        )?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn accounts_for_holder(&self, identification_number: &str) -> Result<Vec<Account>> {
        let mut accounts = Vec::new();
        for number in self.holder_account_numbers(identification_number)? {
            if let Some(account) = self.find_account(&number).await? {
                accounts.push(account);
            }
        }
        Ok(accounts)
    }

    async fn account_numbers_for_holder(
        &self,
        identification_number: &str,
    ) -> Result<Vec<String>> {
        self.holder_account_numbers(identification_number)
    }

    async fn search_holders(&self, term: &str, limit: usize) -> Result<Vec<AccountHolder>> {
        let holders: Vec<AccountHolder> = self.scan_json(CF_HOLDERS, b"")?;
        Ok(holders
            .into_iter()
            .filter(|h| h.matches_term(term))
            .take(limit)
            .collect())
    }

    async fn search_accounts(&self, prefix: &str, limit: usize) -> Result<Vec<Account>> {
        let lists: Vec<Vec<String>> = self.scan_json(CF_HOLDER_ACCOUNTS, b"")?;
        let mut numbers: Vec<String> = lists
            .into_iter()
            .flatten()
            .filter(|n| n.starts_with(prefix))
            .collect();
        numbers.sort();
        let mut accounts = Vec::new();
        for number in numbers.into_iter().take(limit) {
            if let Some(account) = self.find_account(&number).await? {
                accounts.push(account);
            }
        }
        Ok(accounts)
    }

    async fn create_merchant(&self, merchant: Merchant, account: Account) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.ensure_new_account(&account.account_number)?;
        if self.find_merchant(&merchant.merchant_id).await?.is_some() {
            return Err(BankError::ConflictError(format!(
                "merchant {} already exists",
                merchant.merchant_id
            )));
        }

        let mut batch = WriteBatch::default();
        self.link_account(
            &mut batch,
            &merchant.holder_identification_number,
            &account.account_number,
        )?;
        self.put_json(
            &mut batch,
            CF_ACCOUNTS,
            account.account_number.as_bytes(),
            &account,
        )?;
        self.put_json(
            &mut batch,
            CF_MERCHANTS,
            merchant.merchant_id.as_bytes(),
            &merchant,
        )?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn find_merchant(&self, merchant_id: &str) -> Result<Option<Merchant>> {
        self.get_json(CF_MERCHANTS, merchant_id.as_bytes())
    }

    async fn search_merchants(&self, term: &str, limit: usize) -> Result<Vec<Merchant>> {
        let mut merchants: Vec<Merchant> = self
            .scan_json::<Merchant>(CF_MERCHANTS, b"")?
            .into_iter()
            .filter(|m| m.matches_term(term))
            .collect();
        merchants.sort_by(|a, b| a.name.cmp(&b.name));
        merchants.truncate(limit);
        Ok(merchants)
    }

    async fn remove_merchant(&self, merchant_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        if self.find_merchant(merchant_id).await?.is_none() {
            return Ok(false);
        }
        self.db
            .delete_cf(self.cf(CF_MERCHANTS)?, merchant_id.as_bytes())?;
        Ok(true)
    }

    async fn upsert_push_token(&self, token: PushToken) -> Result<()> {
        let key = prefixed(&token.account_number, token.platform.to_string().as_bytes());
        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_PUSH_TOKENS, &key, &token)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn remove_push_token(&self, token: &PushToken) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let key = prefixed(&token.account_number, token.platform.to_string().as_bytes());
        match self.get_json::<PushToken>(CF_PUSH_TOKENS, &key)? {
            Some(stored) if stored == *token => {
                self.db.delete_cf(self.cf(CF_PUSH_TOKENS)?, &key)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn push_tokens_for_account(&self, account_number: &str) -> Result<Vec<PushToken>> {
        self.scan_json(CF_PUSH_TOKENS, &prefixed(account_number, b""))
    }
}

#[async_trait]
impl LedgerStore for RocksDBStore {
    async fn commit(&self, movement: Movement) -> Result<LedgerEntry> {
        let _guard = self.write_lock.lock().await;

        let staged = movement.stage(|number| self.get_json(CF_ACCOUNTS, number.as_bytes()))?;
        let id = self.last_entry_id()? + 1;
        let entry = movement.entry.approve(id, Utc::now());

        let mut batch = WriteBatch::default();
        for (number, account) in &staged {
            self.put_json(&mut batch, CF_ACCOUNTS, number.as_bytes(), account)?;
        }
        let id_key = id.to_be_bytes();
        self.put_json(&mut batch, CF_LEDGER, &id_key, &entry)?;
        let index = self.cf(CF_ACCOUNT_LEDGER)?;
        batch.put_cf(index, prefixed(&entry.sender.account_number, &id_key), b"");
        batch.put_cf(index, prefixed(&entry.receiver.account_number, &id_key), b"");
        batch.put_cf(self.cf(CF_META)?, LEDGER_SEQ_KEY, id_key);
        self.db.write(batch)?;

        Ok(entry)
    }

    async fn entries_for_account(
        &self,
        account_number: &str,
        query: &LedgerQuery,
    ) -> Result<Vec<LedgerEntry>> {
        let prefix = prefixed(account_number, b"");
        let mut entries = Vec::new();
        for (key, _) in self.scan(CF_ACCOUNT_LEDGER, &prefix)? {
            let id_key = &key[prefix.len()..];
            if let Some(entry) = self.get_json(CF_LEDGER, id_key)? {
                entries.push(entry);
            }
        }
        Ok(query.page(entries))
    }
}

#[async_trait]
impl CredentialStore for RocksDBStore {
    async fn exists(&self, identification_number: &str) -> Result<bool> {
        Ok(self
            .db
            .get_pinned_cf(self.cf(CF_CREDENTIALS)?, identification_number.as_bytes())?
            .is_some())
    }

    async fn create(&self, identification_number: &str, password: &str) -> Result<()> {
        let record = CredentialRecord::issue(password, &self.pepper);
        let _guard = self.write_lock.lock().await;
        if self.exists(identification_number).await? {
            return Err(BankError::ConflictError(format!(
                "credential for {} already exists",
                identification_number
            )));
        }
        let mut batch = WriteBatch::default();
        self.put_json(
            &mut batch,
            CF_CREDENTIALS,
            identification_number.as_bytes(),
            &record,
        )?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn verify(&self, identification_number: &str, password: &str) -> Result<bool> {
        let record: Option<CredentialRecord> =
            self.get_json(CF_CREDENTIALS, identification_number.as_bytes())?;
        Ok(record.is_some_and(|r| r.verify(password, &self.pepper)))
    }

    async fn remove(&self, identification_number: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        if !self.exists(identification_number).await? {
            return Ok(false);
        }
        self.db
            .delete_cf(self.cf(CF_CREDENTIALS)?, identification_number.as_bytes())?;
        Ok(true)
    }
}
