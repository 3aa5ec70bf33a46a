use super::auth::AuthorizationGate;
use super::{Context, Policy};
use crate::domain::account::{Account, AccountHolder, AccountType, Merchant, Principal, PushToken};
use crate::domain::command::{
    HolderDetails, MerchantRequest, OpenAccountRequest, PushTokenRequest,
};
use crate::domain::ports::AccountRepositoryRef;
use crate::error::{BankError, Result};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub const MAX_SEARCH_RESULTS: usize = 10;
pub const MIN_HOLDER_TERM: usize = 3;
pub const MIN_ACCOUNT_PREFIX: usize = 4;
pub const MIN_MERCHANT_TERM: usize = 2;

/// What a holder search discloses about another holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HolderSummary {
    pub identification_number: String,
    pub given_name: String,
    pub family_name: String,
}

impl From<AccountHolder> for HolderSummary {
    fn from(holder: AccountHolder) -> Self {
        Self {
            identification_number: holder.identification_number,
            given_name: holder.given_name,
            family_name: holder.family_name,
        }
    }
}

/// What an account-number search discloses: enough to address a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayeeSummary {
    pub account_number: String,
    pub bank_number: String,
    pub holder_name: String,
}

impl From<Account> for PayeeSummary {
    fn from(account: Account) -> Self {
        Self {
            account_number: account.account_number,
            bank_number: account.bank_number,
            holder_name: account.holder_name,
        }
    }
}

fn search_term(term: &str, min: usize, what: &str) -> Result<String> {
    let term = term.trim();
    if term.chars().count() < min {
        return Err(BankError::ValidationError(format!(
            "{} search term must be at least {} characters",
            what, min
        )));
    }
    Ok(term.to_string())
}

pub struct AccountService {
    accounts: AccountRepositoryRef,
    gate: Arc<AuthorizationGate>,
    policy: Policy,
}

impl AccountService {
    pub fn new(ctx: &Context, gate: Arc<AuthorizationGate>) -> Self {
        Self {
            accounts: ctx.accounts.clone(),
            gate,
            policy: ctx.policy.clone(),
        }
    }

    fn new_account(&self, holder_name: String, account_type: AccountType) -> Account {
        Account::open(
            Uuid::new_v4().to_string(),
            self.policy.bank_number.clone(),
            holder_name,
            account_type,
            self.policy.opening_balance,
            self.policy.opening_overdraft,
        )
    }

    /// Opens an account, registering the holder on first use. A returning
    /// holder keeps the details recorded with their first account.
    pub async fn open_account(&self, request: OpenAccountRequest) -> Result<Account> {
        let holder = match self
            .accounts
            .find_holder(&request.identification_number)
            .await?
        {
            Some(existing) => existing,
            None => AccountHolder {
                identification_number: request.identification_number,
                given_name: request.given_name,
                family_name: request.family_name,
                date_of_birth: request.date_of_birth,
                contact_number_1: request.contact_number_1,
                contact_number_2: request.contact_number_2,
                email_address: request.email_address,
                address_line_1: request.address_line_1,
                address_line_2: request.address_line_2,
                address_line_3: request.address_line_3,
                postal_code: request.postal_code,
            },
        };
        let account = self.new_account(holder.display_name(), request.account_type);
        self.accounts.open_account(holder, account.clone()).await?;
        info!(
            account = %account.account_number,
            kind = ?account.account_type,
            "account opened"
        );
        Ok(account)
    }

    pub async fn close_account(&self, principal: &Principal, account_number: &str) -> Result<()> {
        self.gate.require_owner(principal, account_number).await?;
        self.accounts.close_account(account_number).await?;
        info!(account = %account_number, "account closed");
        Ok(())
    }

    pub async fn list_accounts(&self, principal: &Principal) -> Result<Vec<Account>> {
        self.accounts
            .accounts_for_holder(principal.identification_number())
            .await
    }

    pub async fn account_numbers_for_holder(
        &self,
        identification_number: &str,
    ) -> Result<Vec<String>> {
        self.accounts
            .account_numbers_for_holder(identification_number)
            .await
    }

    /// Accounts a push-token request applies to: the named one, or all of the
    /// principal's accounts.
    async fn push_targets(
        &self,
        principal: &Principal,
        request: &PushTokenRequest,
    ) -> Result<Vec<String>> {
        match &request.account_number {
            Some(number) => {
                self.gate.require_owner(principal, number).await?;
                Ok(vec![number.clone()])
            }
            None => {
                let numbers = self
                    .accounts
                    .account_numbers_for_holder(principal.identification_number())
                    .await?;
                if numbers.is_empty() {
                    return Err(BankError::NotFoundError(
                        "holder has no accounts".to_string(),
                    ));
                }
                Ok(numbers)
            }
        }
    }

    pub async fn add_push_token(
        &self,
        principal: &Principal,
        request: PushTokenRequest,
    ) -> Result<usize> {
        let targets = self.push_targets(principal, &request).await?;
        for account_number in &targets {
            self.accounts
                .upsert_push_token(PushToken {
                    account_number: account_number.clone(),
                    token: request.token.clone(),
                    platform: request.platform,
                })
                .await?;
        }
        info!(platform = %request.platform, accounts = targets.len(), "push token registered");
        Ok(targets.len())
    }

    pub async fn remove_push_token(
        &self,
        principal: &Principal,
        request: PushTokenRequest,
    ) -> Result<usize> {
        let mut removed = 0;
        for account_number in self.push_targets(principal, &request).await? {
            let token = PushToken {
                account_number,
                token: request.token.clone(),
                platform: request.platform,
            };
            if self.accounts.remove_push_token(&token).await? {
                removed += 1;
            }
        }
        if removed == 0 {
            return Err(BankError::NotFoundError("push token not found".to_string()));
        }
        Ok(removed)
    }

    pub async fn search_holders(&self, term: &str) -> Result<Vec<HolderSummary>> {
        let term = search_term(term, MIN_HOLDER_TERM, "holder")?;
        let holders = self
            .accounts
            .search_holders(&term, MAX_SEARCH_RESULTS)
            .await?;
        Ok(holders.into_iter().map(HolderSummary::from).collect())
    }

    pub async fn search_account_numbers(&self, prefix: &str) -> Result<Vec<PayeeSummary>> {
        let prefix = search_term(prefix, MIN_ACCOUNT_PREFIX, "account number")?;
        let accounts = self
            .accounts
            .search_accounts(&prefix, MAX_SEARCH_RESULTS)
            .await?;
        Ok(accounts.into_iter().map(PayeeSummary::from).collect())
    }

    /// Discloses a holder's account numbers only when all four identity fields
    /// match the record exactly.
    pub async fn retrieve_accounts(&self, details: HolderDetails) -> Result<Vec<String>> {
        let fields = [
            &details.identification_number,
            &details.given_name,
            &details.family_name,
            &details.email_address,
        ];
        if fields.iter().any(|f| f.is_empty()) {
            return Err(BankError::ValidationError(
                "identification number, given name, family name and email address are all required"
                    .to_string(),
            ));
        }
        let matched = self
            .accounts
            .find_holder(&details.identification_number)
            .await?
            .filter(|h| {
                h.given_name == details.given_name
                    && h.family_name == details.family_name
                    && h.email_address == details.email_address
            });
        if matched.is_none() {
            return Err(BankError::NotFoundError(
                "no holder matches the supplied details".to_string(),
            ));
        }
        self.accounts
            .account_numbers_for_holder(&details.identification_number)
            .await
    }

    /// Registers a business for the principal together with its trading
    /// account.
    pub async fn create_merchant(
        &self,
        principal: &Principal,
        request: MerchantRequest,
    ) -> Result<Merchant> {
        if !request.account_type.is_merchant_eligible() {
            return Err(BankError::ValidationError(format!(
                "account type {:?} cannot be used by a merchant",
                request.account_type
            )));
        }
        if self
            .accounts
            .find_holder(principal.identification_number())
            .await?
            .is_none()
        {
            return Err(BankError::NotFoundError(
                "authenticated holder is not registered".to_string(),
            ));
        }

        let account = self.new_account(request.name.clone(), request.account_type);
        let merchant = Merchant {
            merchant_id: Uuid::new_v4().to_string(),
            name: request.name,
            description: request.description,
            contact_number: request.contact_number,
            email_address: request.email_address,
            sector: request.sector,
            holder_identification_number: principal.identification_number().to_string(),
            account_number: account.account_number.clone(),
            created_at: Utc::now(),
        };
        self.accounts
            .create_merchant(merchant.clone(), account)
            .await?;
        info!(
            merchant = %merchant.merchant_id,
            account = %merchant.account_number,
            "merchant created"
        );
        Ok(merchant)
    }

    pub async fn view_merchant(&self, merchant_id: &str) -> Result<Merchant> {
        self.accounts
            .find_merchant(merchant_id)
            .await?
            .ok_or_else(|| BankError::NotFoundError(format!("merchant {}", merchant_id)))
    }

    pub async fn search_merchants(&self, term: &str) -> Result<Vec<Merchant>> {
        let term = search_term(term, MIN_MERCHANT_TERM, "merchant")?;
        self.accounts
            .search_merchants(&term, MAX_SEARCH_RESULTS)
            .await
    }

    pub async fn remove_merchant(&self, principal: &Principal, merchant_id: &str) -> Result<()> {
        let merchant = self.view_merchant(merchant_id).await?;
        if merchant.holder_identification_number != principal.identification_number() {
            return Err(BankError::AuthorizationError(
                "only the controlling holder may remove a merchant".to_string(),
            ));
        }
        self.accounts.remove_merchant(merchant_id).await?;
        info!(merchant = %merchant_id, "merchant removed");
        Ok(())
    }
}
