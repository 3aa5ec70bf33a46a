use super::money::Balance;
use crate::error::{BankError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies a payable endpoint as `accountNumber@bankNumber`.
///
/// An empty bank number refers to the local bank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountRef {
    pub account_number: String,
    pub bank_number: String,
}

impl AccountRef {
    /// The pseudo-account funding deposits.
    pub fn system() -> Self {
        Self {
            account_number: "0".to_string(),
            bank_number: "0".to_string(),
        }
    }

    pub fn local(account_number: impl Into<String>, bank_number: impl Into<String>) -> Self {
        Self {
            account_number: account_number.into(),
            bank_number: bank_number.into(),
        }
    }

    pub fn is_local_to(&self, bank_number: &str) -> bool {
        self.bank_number.is_empty() || self.bank_number == bank_number
    }
}

impl FromStr for AccountRef {
    type Err = BankError;

    fn from_str(raw: &str) -> Result<Self> {
        let Some((account_number, bank_number)) = raw.split_once('@') else {
            return Err(BankError::ValidationError(format!(
                "Account reference '{}' must have the form accountNumber@bankNumber",
                raw
            )));
        };
        if account_number.is_empty() {
            return Err(BankError::ValidationError(
                "Account reference is missing the account number".to_string(),
            ));
        }
        Ok(Self {
            account_number: account_number.to_string(),
            bank_number: bank_number.to_string(),
        })
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.account_number, self.bank_number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountType {
    Savings,
    Cheque,
    Merchant,
    MoneyMarket,
    Cd,
    Ira,
    Rcp,
    Credit,
    Mortgage,
    Loan,
}

impl AccountType {
    /// Types a merchant may trade through.
    pub fn is_merchant_eligible(self) -> bool {
        matches!(self, Self::Merchant | Self::Cheque)
    }
}

impl FromStr for AccountType {
    type Err = BankError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw {
            "savings" => Ok(Self::Savings),
            "cheque" => Ok(Self::Cheque),
            "merchant" => Ok(Self::Merchant),
            "money-market" => Ok(Self::MoneyMarket),
            "cd" => Ok(Self::Cd),
            "ira" => Ok(Self::Ira),
            "rcp" => Ok(Self::Rcp),
            "credit" => Ok(Self::Credit),
            "mortgage" => Ok(Self::Mortgage),
            "loan" => Ok(Self::Loan),
            other => Err(BankError::ValidationError(format!(
                "Account type '{}' is invalid",
                other
            ))),
        }
    }
}

/// Natural person owning one or more accounts, keyed by identification number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountHolder {
    pub identification_number: String,
    pub given_name: String,
    pub family_name: String,
    pub date_of_birth: String,
    pub contact_number_1: String,
    pub contact_number_2: String,
    pub email_address: String,
    pub address_line_1: String,
    pub address_line_2: String,
    pub address_line_3: String,
    pub postal_code: String,
}

impl AccountHolder {
    /// `Family,Given`, as shown on accounts.
    pub fn display_name(&self) -> String {
        format!("{},{}", self.family_name, self.given_name)
    }

    pub fn matches_term(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.identification_number.to_lowercase().starts_with(&term)
            || self.given_name.to_lowercase().contains(&term)
            || self.family_name.to_lowercase().contains(&term)
            || self.email_address.to_lowercase().contains(&term)
    }
}

/// Represents the state of a bank account.
///
/// `available` is kept equal to `balance + overdraft`; every mutation goes
/// through [`Account::debit`] or [`Account::credit`] so that the balance never
/// drops below `-overdraft`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_number: String,
    pub bank_number: String,
    pub holder_name: String,
    pub balance: Balance,
    pub overdraft: Balance,
    pub available: Balance,
    pub account_type: AccountType,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn open(
        account_number: impl Into<String>,
        bank_number: impl Into<String>,
        holder_name: impl Into<String>,
        account_type: AccountType,
        opening_balance: Balance,
        overdraft: Balance,
    ) -> Self {
        Self {
            account_number: account_number.into(),
            bank_number: bank_number.into(),
            holder_name: holder_name.into(),
            balance: opening_balance,
            overdraft,
            available: Balance(opening_balance.0.saturating_add(overdraft.0)),
            account_type,
            created_at: Utc::now(),
        }
    }

    pub fn reference(&self) -> AccountRef {
        AccountRef::local(self.account_number.clone(), self.bank_number.clone())
    }

    /// Withdraws funds if the available balance covers them.
    pub fn debit(&mut self, amount: Balance) -> Result<()> {
        if self.available < amount {
            return Err(BankError::InsufficientFundsError(format!(
                "account {} has {} available, {} required",
                self.account_number, self.available.0, amount.0
            )));
        }
        let balance = self.balance.checked_sub(amount)?;
        self.available = self.available.checked_sub(amount)?;
        self.balance = balance;
        Ok(())
    }

    /// Only accounts with a zero balance may be closed.
    pub fn ensure_closable(&self) -> Result<()> {
        if !self.balance.is_zero() {
            return Err(BankError::ConflictError(format!(
                "account {} still holds {}",
                self.account_number, self.balance.0
            )));
        }
        Ok(())
    }

    pub fn credit(&mut self, amount: Balance) -> Result<()> {
        let balance = self.balance.checked_add(amount)?;
        self.available = self.available.checked_add(amount)?;
        self.balance = balance;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Merchant {
    pub merchant_id: String,
    pub name: String,
    pub description: String,
    pub contact_number: String,
    pub email_address: String,
    pub sector: String,
    pub holder_identification_number: String,
    pub account_number: String,
    pub created_at: DateTime<Utc>,
}

impl Merchant {
    pub fn matches_term(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.name.to_lowercase().contains(&term)
            || self.description.to_lowercase().contains(&term)
            || self.sector.to_lowercase().contains(&term)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushPlatform {
    Ios,
    Windows,
    Android,
    Blackberry,
    Other,
}

impl FromStr for PushPlatform {
    type Err = BankError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw {
            "ios" => Ok(Self::Ios),
            "windows" => Ok(Self::Windows),
            "android" => Ok(Self::Android),
            "blackberry" => Ok(Self::Blackberry),
            "other" => Ok(Self::Other),
            other => Err(BankError::ValidationError(format!(
                "Platform '{}' is invalid",
                other
            ))),
        }
    }
}

impl fmt::Display for PushPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ios => "ios",
            Self::Windows => "windows",
            Self::Android => "android",
            Self::Blackberry => "blackberry",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// A device registered for push notifications on an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PushToken {
    pub account_number: String,
    pub token: String,
    pub platform: PushPlatform,
}

/// An authenticated account holder, identified by identification number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal(String);

impl Principal {
    pub fn new(identification_number: impl Into<String>) -> Self {
        Self(identification_number.into())
    }

    pub fn identification_number(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn account(balance: Balance, overdraft: Balance) -> Account {
        Account::open("acc-1", "bank", "Doe,Jane", AccountType::Cheque, balance, overdraft)
    }

    #[test]
    fn test_account_ref_parsing() {
        let parsed: AccountRef = "abc@bank".parse().unwrap();
        assert_eq!(parsed, AccountRef::local("abc", "bank"));
        assert_eq!(parsed.to_string(), "abc@bank");

        let local: AccountRef = "abc@".parse().unwrap();
        assert!(local.is_local_to("bank"));

        assert!(matches!(
            "abc".parse::<AccountRef>(),
            Err(BankError::ValidationError(_))
        ));
        assert!(matches!(
            "@bank".parse::<AccountRef>(),
            Err(BankError::ValidationError(_))
        ));
    }

    #[test]
    fn test_account_type_parsing() {
        assert_eq!("money-market".parse::<AccountType>().unwrap(), AccountType::MoneyMarket);
        assert!("checking".parse::<AccountType>().is_err());
        assert!(AccountType::Merchant.is_merchant_eligible());
        assert!(!AccountType::Savings.is_merchant_eligible());
    }

    #[test]
    fn test_account_open_sets_available() {
        let account = account(Balance::new(dec!(100)), Balance::new(dec!(50)));
        assert_eq!(account.available, Balance::new(dec!(150)));
    }

    #[test]
    fn test_account_debit_within_overdraft() {
        let mut account = account(Balance::new(dec!(100)), Balance::new(dec!(50)));
        account.debit(Balance::new(dec!(120))).unwrap();
        assert_eq!(account.balance, Balance::new(dec!(-20)));
        assert_eq!(account.available, Balance::new(dec!(30)));
    }

    #[test]
    fn test_account_debit_insufficient() {
        let mut account = account(Balance::new(dec!(100)), Balance::ZERO);
        let result = account.debit(Balance::new(dec!(150)));
        assert!(matches!(result, Err(BankError::InsufficientFundsError(_))));
        assert_eq!(account.balance, Balance::new(dec!(100)));
    }

    #[test]
    fn test_account_credit() {
        let mut account = account(Balance::new(dec!(100)), Balance::ZERO);
        account.credit(Balance::new(dec!(0.004))).unwrap();
        assert_eq!(account.balance, Balance::new(dec!(100.004)));
        assert_eq!(account.available, Balance::new(dec!(100.004)));
    }

    #[test]
    fn test_account_credit_overflow_leaves_balance() {
        let mut account = account(Balance::new(dec!(100)), Balance::ZERO);
        let result = account.credit(Balance::new(Decimal::MAX));
        assert!(matches!(result, Err(BankError::ValidationError(_))));
        assert_eq!(account.balance, Balance::new(dec!(100)));
        assert_eq!(account.available, Balance::new(dec!(100)));
    }

    #[test]
    fn test_only_empty_accounts_are_closable() {
        assert!(account(Balance::ZERO, Balance::new(dec!(50))).ensure_closable().is_ok());
        assert!(matches!(
            account(Balance::new(dec!(0.0001)), Balance::ZERO).ensure_closable(),
            Err(BankError::ConflictError(_))
        ));
    }

    #[test]
    fn test_platform_parsing() {
        assert_eq!("ios".parse::<PushPlatform>().unwrap(), PushPlatform::Ios);
        assert!("symbian".parse::<PushPlatform>().is_err());
    }
}
