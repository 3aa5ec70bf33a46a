//! Typed requests carried by the tilde-delimited command protocol.
//!
//! Transports produce command vectors; the decoder turns each one into a
//! [`Command`] exactly once, so handlers never index into raw field lists.

use super::account::{AccountRef, AccountType, PushPlatform};
use super::money::Amount;
use super::transaction::GeoPoint;
use crate::error::{BankError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    AppAuth,
    Acmt,
    Pain,
}

impl FromStr for Domain {
    type Err = BankError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw {
            "appauth" => Ok(Self::AppAuth),
            "acmt" => Ok(Self::Acmt),
            "pain" => Ok(Self::Pain),
            other => Err(BankError::InvalidCommandError(format!(
                "Unknown command domain '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AppAuth => "appauth",
            Self::Acmt => "acmt",
            Self::Pain => "pain",
        };
        f.write_str(name)
    }
}

/// Every operation the dispatcher can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    CheckToken,
    Login,
    CreateCredential,
    RemoveCredential,
    Logout,
    OpenAccount,
    CloseAccount,
    ListAccounts,
    AccountNumbersByHolder,
    AddPushToken,
    RemovePushToken,
    SearchHolders,
    RetrieveAccounts,
    SearchAccountNumbers,
    CreateMerchant,
    ViewMerchant,
    SearchMerchants,
    RemoveMerchant,
    CreditTransfer,
    Deposit,
    ListTransactions,
}

impl CommandKind {
    pub const ALL: [CommandKind; 21] = [
        Self::CheckToken,
        Self::Login,
        Self::CreateCredential,
        Self::RemoveCredential,
        Self::Logout,
        Self::OpenAccount,
        Self::CloseAccount,
        Self::ListAccounts,
        Self::AccountNumbersByHolder,
        Self::AddPushToken,
        Self::RemovePushToken,
        Self::SearchHolders,
        Self::RetrieveAccounts,
        Self::SearchAccountNumbers,
        Self::CreateMerchant,
        Self::ViewMerchant,
        Self::SearchMerchants,
        Self::RemoveMerchant,
        Self::CreditTransfer,
        Self::Deposit,
        Self::ListTransactions,
    ];

    /// Commands accepted without a session.
    pub fn is_public(self) -> bool {
        matches!(
            self,
            Self::OpenAccount | Self::Login | Self::CreateCredential
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Auth(AuthCommand),
    Account(AccountCommand),
    Payment(PaymentCommand),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthCommand {
    CheckToken,
    Login(Credentials),
    CreateCredential(Credentials),
    RemoveCredential(Credentials),
    Logout,
}

#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub identification_number: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identification_number", &self.identification_number)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccountCommand {
    Open(OpenAccountRequest),
    Close { account_number: String },
    List,
    NumbersByHolder { identification_number: String },
    AddPushToken(PushTokenRequest),
    RemovePushToken(PushTokenRequest),
    SearchHolders { term: String },
    Retrieve(HolderDetails),
    SearchNumbers { term: String },
    CreateMerchant(MerchantRequest),
    ViewMerchant { merchant_id: String },
    SearchMerchants { term: String },
    RemoveMerchant { merchant_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenAccountRequest {
    pub given_name: String,
    pub family_name: String,
    pub date_of_birth: String,
    pub identification_number: String,
    pub contact_number_1: String,
    pub contact_number_2: String,
    pub email_address: String,
    pub address_line_1: String,
    pub address_line_2: String,
    pub address_line_3: String,
    pub postal_code: String,
    pub account_type: AccountType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PushTokenRequest {
    pub token: String,
    pub platform: PushPlatform,
    pub account_number: Option<String>,
}

/// The four identity fields that must all match before accounts are disclosed.
#[derive(Debug, Clone, PartialEq)]
pub struct HolderDetails {
    pub identification_number: String,
    pub given_name: String,
    pub family_name: String,
    pub email_address: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MerchantRequest {
    pub name: String,
    pub description: String,
    pub contact_number: String,
    pub email_address: String,
    pub sector: String,
    pub account_type: AccountType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentCommand {
    Transfer(TransferRequest),
    Deposit(DepositRequest),
    ListTransactions(ListTransactionsRequest),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub sender: AccountRef,
    pub receiver: AccountRef,
    pub amount: Amount,
    pub geo: Option<GeoPoint>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepositRequest {
    pub receiver: AccountRef,
    pub amount: Amount,
    pub geo: Option<GeoPoint>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListTransactionsRequest {
    pub account_number: String,
    pub page: usize,
    pub per_page: usize,
    pub since: Option<DateTime<Utc>>,
}
