use crate::domain::account::{Account, AccountHolder, Merchant, PushToken};
use crate::domain::ports::{AccountRepository, LedgerStore};
use crate::domain::transaction::{LedgerEntry, LedgerQuery, Movement};
use crate::error::{BankError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct BankState {
    holders: HashMap<String, AccountHolder>,
    accounts: HashMap<String, Account>,
    holder_accounts: HashMap<String, Vec<String>>,
    merchants: HashMap<String, Merchant>,
    push_tokens: Vec<PushToken>,
    ledger: Vec<LedgerEntry>,
    last_entry_id: u64,
}

/// A thread-safe in-memory store for accounts and the ledger.
///
/// Everything lives behind one `RwLock`, so a [`Movement`] is validated and
/// applied under a single write guard: concurrent commits against the same
/// account serialize, and a failed check leaves no trace.
/// Ideal for testing or deployments where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<BankState>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountRepository for InMemoryStore {
    async fn find_holder(&self, identification_number: &str) -> Result<Option<AccountHolder>> {
        let state = self.state.read().await;
        Ok(state.holders.get(identification_number).cloned())
    }

    async fn open_account(&self, holder: AccountHolder, account: Account) -> Result<()> {
        let mut state = self.state.write().await;
        if state.accounts.contains_key(&account.account_number) {
            return Err(BankError::ConflictError(format!(
                "account {} already exists",
                account.account_number
            )));
        }
        let id = holder.identification_number.clone();
        state.holders.entry(id.clone()).or_insert(holder);
        state
            .holder_accounts
            .entry(id)
            .or_default()
            .push(account.account_number.clone());
        state.accounts.insert(account.account_number.clone(), account);
        Ok(())
    }

    async fn close_account(&self, account_number: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .accounts
            .get(account_number)
            .ok_or_else(|| BankError::NotFoundError(format!("account {}", account_number)))?
            .ensure_closable()?;
        state.accounts.remove(account_number);
        for numbers in state.holder_accounts.values_mut() {
            numbers.retain(|n| n != account_number);
        }
        state.push_tokens.retain(|t| t.account_number != account_number);
        Ok(())
    }

    async fn find_account(&self, account_number: &str) -> Result<Option<Account>> {
        let state = self.state.read().await;
        Ok(state.accounts.get(account_number).cloned())
    }

    async fn ensure_system_account(&self, account: Account) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .accounts
            .entry(account.account_number.clone())
            .or_insert(account);
        Ok(())
    }

    async fn accounts_for_holder(&self, identification_number: &str) -> Result<Vec<Account>> {
        let state = self.state.read().await;
        let numbers = state
            .holder_accounts
            .get(identification_number)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(numbers
            .iter()
            .filter_map(|n| state.accounts.get(n).cloned())
            .collect())
    }

    async fn account_numbers_for_holder(
        &self,
        identification_number: &str,
    ) -> Result<Vec<String>> {
        let state = self.state.read().await;
        Ok(state
            .holder_accounts
            .get(identification_number)
            .cloned()
            .unwrap_or_default())
    }

    async fn search_holders(&self, term: &str, limit: usize) -> Result<Vec<AccountHolder>> {
        let state = self.state.read().await;
        let mut found: Vec<AccountHolder> = state
            .holders
            .values()
            .filter(|h| h.matches_term(term))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.identification_number.cmp(&b.identification_number));
        found.truncate(limit);
        Ok(found)
    }

    async fn search_accounts(&self, prefix: &str, limit: usize) -> Result<Vec<Account>> {
        let state = self.state.read().await;
        let mut found: Vec<Account> = state
            .holder_accounts
            .values()
            .flatten()
            .filter(|n| n.starts_with(prefix))
            .filter_map(|n| state.accounts.get(n).cloned())
            .collect();
        found.sort_by(|a, b| a.account_number.cmp(&b.account_number));
        found.truncate(limit);
        Ok(found)
    }

    async fn create_merchant(&self, merchant: Merchant, account: Account) -> Result<()> {
        let mut state = self.state.write().await;
        if state.merchants.contains_key(&merchant.merchant_id) {
            return Err(BankError::ConflictError(format!(
                "merchant {} already exists",
                merchant.merchant_id
            )));
        }
        state
            .holder_accounts
            .entry(merchant.holder_identification_number.clone())
            .or_default()
            .push(account.account_number.clone());
        state.accounts.insert(account.account_number.clone(), account);
        state.merchants.insert(merchant.merchant_id.clone(), merchant);
        Ok(())
    }

    async fn find_merchant(&self, merchant_id: &str) -> Result<Option<Merchant>> {
        let state = self.state.read().await;
        Ok(state.merchants.get(merchant_id).cloned())
    }

    async fn search_merchants(&self, term: &str, limit: usize) -> Result<Vec<Merchant>> {
        let state = self.state.read().await;
        let mut found: Vec<Merchant> = state
            .merchants
            .values()
            .filter(|m| m.matches_term(term))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found.truncate(limit);
        Ok(found)
    }

    async fn remove_merchant(&self, merchant_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(state.merchants.remove(merchant_id).is_some())
    }

    async fn upsert_push_token(&self, token: PushToken) -> Result<()> {
        let mut state = self.state.write().await;
        state.push_tokens.retain(|t| {
            !(t.account_number == token.account_number && t.platform == token.platform)
        });
        state.push_tokens.push(token);
        Ok(())
    }

    async fn remove_push_token(&self, token: &PushToken) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.push_tokens.len();
        state.push_tokens.retain(|t| t != token);
        Ok(state.push_tokens.len() != before)
    }

    async fn push_tokens_for_account(&self, account_number: &str) -> Result<Vec<PushToken>> {
        let state = self.state.read().await;
        Ok(state
            .push_tokens
            .iter()
            .filter(|t| t.account_number == account_number)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn commit(&self, movement: Movement) -> Result<LedgerEntry> {
        let mut state = self.state.write().await;

        let staged = movement.stage(|number| Ok(state.accounts.get(number).cloned()))?;

        state.last_entry_id += 1;
        let entry = movement.entry.approve(state.last_entry_id, Utc::now());
        state.ledger.push(entry.clone());
        state.accounts.extend(staged);
        Ok(entry)
    }

    async fn entries_for_account(
        &self,
        account_number: &str,
        query: &LedgerQuery,
    ) -> Result<Vec<LedgerEntry>> {
        let state = self.state.read().await;
        let entries = state
            .ledger
            .iter()
            .filter(|e| e.involves(account_number))
            .cloned()
            .collect();
        Ok(query.page(entries))
    }
}
