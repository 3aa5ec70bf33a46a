//! Turns tilde-delimited command vectors into typed [`Command`]s.
//!
//! A vector is `[token, domain, subtype, field...]`. The `(domain, subtype)`
//! pair is resolved through a [`CommandTable`] that is checked for duplicates
//! and completeness when it is built.

use crate::domain::account::{AccountRef, AccountType, PushPlatform};
use crate::domain::command::{
    AccountCommand, AuthCommand, Command, CommandKind, Credentials, DepositRequest, Domain,
    HolderDetails, ListTransactionsRequest, MerchantRequest, OpenAccountRequest, PaymentCommand,
    PushTokenRequest, TransferRequest,
};
use crate::domain::money::Amount;
use crate::domain::transaction::GeoPoint;
use crate::error::{BankError, Result};
use chrono::DateTime;
use std::collections::HashMap;
use tracing::debug;

/// Raw fields of one inbound command, padding already stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandVector {
    fields: Vec<String>,
}

impl CommandVector {
    /// Splits a wire line on `~`. Trailing line terminators and NUL padding
    /// are removed from the final field.
    pub fn parse_line(raw: &str) -> Self {
        Self::from_fields(raw.split('~'))
    }

    /// Builds a vector from fields that were never joined on the wire, such
    /// as HTTP form values; a `~` inside a field stays part of that field.
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if let Some(last) = fields.last_mut() {
            strip_padding(last);
        }
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The field at `index`, or `""` when the vector is shorter.
    pub fn field(&self, index: usize) -> &str {
        self.fields.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn token(&self) -> &str {
        self.field(0)
    }
}

fn strip_padding(field: &mut String) {
    let kept = field.trim_end_matches(['\n', '\r', '\0']).len();
    field.truncate(kept);
}

/// One row of the routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub domain: Domain,
    pub code: u32,
    pub kind: CommandKind,
    /// Minimum vector length, counting token, domain and subtype.
    pub min_fields: usize,
}

const fn reg(domain: Domain, code: u32, kind: CommandKind, min_fields: usize) -> Registration {
    Registration {
        domain,
        code,
        kind,
        min_fields,
    }
}

pub const REGISTRATIONS: &[Registration] = &[
    reg(Domain::AppAuth, 1, CommandKind::CheckToken, 3),
    reg(Domain::AppAuth, 2, CommandKind::Login, 5),
    reg(Domain::AppAuth, 3, CommandKind::CreateCredential, 5),
    reg(Domain::AppAuth, 4, CommandKind::RemoveCredential, 5),
    reg(Domain::AppAuth, 5, CommandKind::Logout, 3),
    reg(Domain::Acmt, 1, CommandKind::OpenAccount, 14),
    reg(Domain::Acmt, 7, CommandKind::OpenAccount, 14),
    reg(Domain::Acmt, 19, CommandKind::CloseAccount, 4),
    reg(Domain::Acmt, 1001, CommandKind::ListAccounts, 3),
    reg(Domain::Acmt, 1002, CommandKind::AccountNumbersByHolder, 4),
    reg(Domain::Acmt, 1003, CommandKind::AddPushToken, 5),
    reg(Domain::Acmt, 1004, CommandKind::RemovePushToken, 5),
    reg(Domain::Acmt, 1005, CommandKind::SearchHolders, 4),
    reg(Domain::Acmt, 1006, CommandKind::RetrieveAccounts, 7),
    reg(Domain::Acmt, 1007, CommandKind::SearchAccountNumbers, 4),
    reg(Domain::Acmt, 1010, CommandKind::CreateMerchant, 8),
    reg(Domain::Acmt, 1011, CommandKind::ViewMerchant, 4),
    reg(Domain::Acmt, 1012, CommandKind::SearchMerchants, 4),
    reg(Domain::Acmt, 1013, CommandKind::RemoveMerchant, 4),
    reg(Domain::Pain, 1, CommandKind::CreditTransfer, 9),
    reg(Domain::Pain, 1000, CommandKind::Deposit, 8),
    reg(Domain::Pain, 1001, CommandKind::ListTransactions, 6),
];

/// Validated `(domain, code) -> registration` lookup.
#[derive(Debug, Clone)]
pub struct CommandTable {
    entries: HashMap<(Domain, u32), Registration>,
}

impl CommandTable {
    /// Builds a table, rejecting duplicate pairs and unregistered kinds.
    pub fn new(registrations: &[Registration]) -> Result<Self> {
        let mut entries = HashMap::with_capacity(registrations.len());
        for registration in registrations {
            let key = (registration.domain, registration.code);
            if entries.insert(key, *registration).is_some() {
                return Err(BankError::internal(format!(
                    "command {}~{} registered twice",
                    registration.domain, registration.code
                )));
            }
        }
        for kind in CommandKind::ALL {
            if !entries.values().any(|r| r.kind == kind) {
                return Err(BankError::internal(format!(
                    "command kind {:?} has no registration",
                    kind
                )));
            }
        }
        Ok(Self { entries })
    }

    pub fn lookup(&self, domain: Domain, code: u32) -> Option<&Registration> {
        self.entries.get(&(domain, code))
    }
}

/// A decoded command together with the session token it arrived with.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub token: String,
    pub kind: CommandKind,
    pub command: Command,
}

#[derive(Debug, Clone)]
pub struct CommandDecoder {
    table: CommandTable,
}

impl CommandDecoder {
    pub fn new(table: CommandTable) -> Self {
        Self { table }
    }

    /// Decoder over the built-in [`REGISTRATIONS`].
    pub fn standard() -> Result<Self> {
        Ok(Self::new(CommandTable::new(REGISTRATIONS)?))
    }

    pub fn decode(&self, vector: &CommandVector) -> Result<Envelope> {
        if vector.len() < 3 {
            return Err(BankError::FormatError(
                "command must contain at least a token, a domain and a subtype".to_string(),
            ));
        }
        let domain: Domain = vector.field(1).parse()?;
        let code: u32 = vector.field(2).trim().parse().map_err(|_| {
            BankError::FormatError(format!("subtype '{}' is not a number", vector.field(2)))
        })?;
        let registration = self.table.lookup(domain, code).ok_or_else(|| {
            BankError::InvalidCommandError(format!("unknown command {}~{}", domain, code))
        })?;
        if vector.len() < registration.min_fields {
            return Err(BankError::FormatError(format!(
                "{}~{} needs {} fields, got {}",
                domain,
                code,
                registration.min_fields,
                vector.len()
            )));
        }

        let command = decode_fields(registration.kind, &Fields(vector))?;
        debug!(%domain, code, kind = ?registration.kind, "decoded command");
        Ok(Envelope {
            token: vector.token().to_string(),
            kind: registration.kind,
            command,
        })
    }
}

struct Fields<'a>(&'a CommandVector);

impl Fields<'_> {
    fn text(&self, index: usize) -> String {
        self.0.field(index).to_string()
    }

    fn required(&self, index: usize, name: &str) -> Result<String> {
        let value = self.0.field(index);
        if value.is_empty() {
            return Err(BankError::ValidationError(format!("{} is required", name)));
        }
        Ok(value.to_string())
    }

    fn optional(&self, index: usize) -> Option<String> {
        let value = self.0.field(index);
        (!value.is_empty()).then(|| value.to_string())
    }

    fn account_ref(&self, index: usize) -> Result<AccountRef> {
        self.0.field(index).parse()
    }

    fn amount(&self, index: usize) -> Result<Amount> {
        Amount::parse(self.0.field(index))
    }

    fn geo(&self, lat: usize, lon: usize) -> Result<Option<GeoPoint>> {
        GeoPoint::parse(self.0.field(lat), self.0.field(lon))
    }

    fn number(&self, index: usize, name: &str) -> Result<usize> {
        let raw = self.0.field(index);
        raw.trim().parse().map_err(|_| {
            BankError::ValidationError(format!("{} '{}' is not a whole number", name, raw))
        })
    }

    fn account_type(&self, index: usize) -> Result<AccountType> {
        match self.optional(index) {
            Some(raw) => raw.parse(),
            None => Ok(AccountType::Cheque),
        }
    }

    fn credentials(&self) -> Result<Credentials> {
        Ok(Credentials {
            identification_number: self.required(3, "identification number")?,
            password: self.required(4, "password")?,
        })
    }

    fn push_token(&self) -> Result<PushTokenRequest> {
        let platform: PushPlatform = self.0.field(4).parse()?;
        Ok(PushTokenRequest {
            token: self.required(3, "push token")?,
            platform,
            account_number: self.optional(5),
        })
    }
}

fn decode_fields(kind: CommandKind, f: &Fields<'_>) -> Result<Command> {
    let command = match kind {
        CommandKind::CheckToken => Command::Auth(AuthCommand::CheckToken),
        CommandKind::Login => Command::Auth(AuthCommand::Login(f.credentials()?)),
        CommandKind::CreateCredential => {
            Command::Auth(AuthCommand::CreateCredential(f.credentials()?))
        }
        CommandKind::RemoveCredential => {
            Command::Auth(AuthCommand::RemoveCredential(f.credentials()?))
        }
        CommandKind::Logout => Command::Auth(AuthCommand::Logout),

        CommandKind::OpenAccount => Command::Account(AccountCommand::Open(OpenAccountRequest {
            given_name: f.required(3, "given name")?,
            family_name: f.required(4, "family name")?,
            date_of_birth: f.text(5),
            identification_number: f.required(6, "identification number")?,
            contact_number_1: f.text(7),
            contact_number_2: f.text(8),
            email_address: f.text(9),
            address_line_1: f.text(10),
            address_line_2: f.text(11),
            address_line_3: f.text(12),
            postal_code: f.text(13),
            account_type: f.account_type(14)?,
        })),
        CommandKind::CloseAccount => Command::Account(AccountCommand::Close {
            account_number: f.required(3, "account number")?,
        }),
        CommandKind::ListAccounts => Command::Account(AccountCommand::List),
        CommandKind::AccountNumbersByHolder => {
            Command::Account(AccountCommand::NumbersByHolder {
                identification_number: f.required(3, "identification number")?,
            })
        }
        CommandKind::AddPushToken => {
            Command::Account(AccountCommand::AddPushToken(f.push_token()?))
        }
        CommandKind::RemovePushToken => {
            Command::Account(AccountCommand::RemovePushToken(f.push_token()?))
        }
        CommandKind::SearchHolders => Command::Account(AccountCommand::SearchHolders {
            term: f.text(3),
        }),
        CommandKind::RetrieveAccounts => {
            Command::Account(AccountCommand::Retrieve(HolderDetails {
                identification_number: f.text(3),
                given_name: f.text(4),
                family_name: f.text(5),
                email_address: f.text(6),
            }))
        }
        CommandKind::SearchAccountNumbers => Command::Account(AccountCommand::SearchNumbers {
            term: f.text(3),
        }),
        CommandKind::CreateMerchant => {
            Command::Account(AccountCommand::CreateMerchant(MerchantRequest {
                name: f.required(3, "merchant name")?,
                description: f.text(4),
                contact_number: f.text(5),
                email_address: f.text(6),
                sector: f.text(7),
                account_type: f.account_type(8)?,
            }))
        }
        CommandKind::ViewMerchant => Command::Account(AccountCommand::ViewMerchant {
            merchant_id: f.required(3, "merchant id")?,
        }),
        CommandKind::SearchMerchants => Command::Account(AccountCommand::SearchMerchants {
            term: f.text(3),
        }),
        CommandKind::RemoveMerchant => Command::Account(AccountCommand::RemoveMerchant {
            merchant_id: f.required(3, "merchant id")?,
        }),

        CommandKind::CreditTransfer => {
            Command::Payment(PaymentCommand::Transfer(TransferRequest {
                sender: f.account_ref(3)?,
                receiver: f.account_ref(4)?,
                amount: f.amount(5)?,
                geo: f.geo(6, 7)?,
                description: f.text(8),
            }))
        }
        CommandKind::Deposit => Command::Payment(PaymentCommand::Deposit(DepositRequest {
            receiver: f.account_ref(3)?,
            amount: f.amount(4)?,
            geo: f.geo(5, 6)?,
            description: f.text(7),
        })),
        CommandKind::ListTransactions => {
            let since = match f.optional(6) {
                Some(raw) => {
                    let seconds: i64 = raw.trim().parse().map_err(|_| {
                        BankError::ValidationError(format!("timestamp '{}' is invalid", raw))
                    })?;
                    let since = DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
                        BankError::ValidationError(format!("timestamp {} is out of range", seconds))
                    })?;
                    Some(since)
                }
                None => None,
            };
            Command::Payment(PaymentCommand::ListTransactions(ListTransactionsRequest {
                account_number: f.required(3, "account number")?,
                page: f.number(4, "page")?,
                per_page: f.number(5, "perPage")?,
                since,
            }))
        }
    };
    Ok(command)
}
