use super::Context;
use super::accounts::AccountService;
use super::auth::AuthorizationGate;
use super::decoder::{CommandDecoder, CommandVector, Envelope};
use super::engine::TransactionEngine;
use crate::domain::account::Principal;
use crate::domain::command::{AccountCommand, AuthCommand, Command, PaymentCommand};
use crate::error::{BankError, ErrorKind, Result};
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// The part of the system a failure originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Decoder,
    Auth,
    Transactions,
    Accounts,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Decoder => "decoder",
            Self::Auth => "auth",
            Self::Transactions => "transactions",
            Self::Accounts => "accounts",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{component}: {error}")]
pub struct DispatchError {
    pub component: Component,
    pub error: BankError,
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    /// Client-facing `{"kind", "component", "message"}` object. Internal
    /// failures are reported without their details.
    pub fn body(&self) -> Value {
        let message = match self.kind() {
            ErrorKind::Internal => "internal error".to_string(),
            _ => self.error.to_string(),
        };
        json!({
            "kind": self.kind(),
            "component": self.component,
            "message": message,
        })
    }
}

trait InComponent<T> {
    fn within(self, component: Component) -> std::result::Result<T, DispatchError>;
}

impl<T> InComponent<T> for Result<T> {
    fn within(self, component: Component) -> std::result::Result<T, DispatchError> {
        self.map_err(|error| {
            if error.kind() == ErrorKind::Internal {
                error!(%component, error = %error, "internal error while handling command");
            }
            DispatchError { component, error }
        })
    }
}

fn authenticated(principal: Option<&Principal>) -> Result<&Principal> {
    principal.ok_or_else(|| BankError::AuthenticationError("session required".to_string()))
}

/// Single entry point shared by every transport.
pub struct Dispatcher {
    decoder: CommandDecoder,
    gate: Arc<AuthorizationGate>,
    engine: TransactionEngine,
    accounts: AccountService,
}

impl Dispatcher {
    /// Validates the command table and seeds the fee account.
    pub async fn bootstrap(ctx: Context) -> Result<Self> {
        let decoder = CommandDecoder::standard()?;
        let gate = Arc::new(AuthorizationGate::new(&ctx));
        let engine = TransactionEngine::new(&ctx, gate.clone());
        engine.ensure_fee_account().await?;
        let accounts = AccountService::new(&ctx, gate.clone());
        Ok(Self {
            decoder,
            gate,
            engine,
            accounts,
        })
    }

    pub async fn dispatch(
        &self,
        vector: &CommandVector,
    ) -> std::result::Result<Value, DispatchError> {
        let Envelope {
            token,
            kind,
            command,
        } = self.decoder.decode(vector).within(Component::Decoder)?;

        let principal = if kind.is_public() {
            None
        } else {
            Some(
                self.gate
                    .validate_and_extend(&token)
                    .await
                    .within(Component::Auth)?,
            )
        };
        debug!(?kind, "dispatching command");

        let principal = principal.as_ref();
        match command {
            Command::Auth(command) => self
                .handle_auth(&token, principal, command)
                .await
                .within(Component::Auth),
            Command::Account(command) => self
                .handle_account(principal, command)
                .await
                .within(Component::Accounts),
            Command::Payment(command) => self
                .handle_payment(principal, command)
                .await
                .within(Component::Transactions),
        }
    }

    async fn handle_auth(
        &self,
        token: &str,
        principal: Option<&Principal>,
        command: AuthCommand,
    ) -> Result<Value> {
        match command {
            AuthCommand::CheckToken => {
                let principal = authenticated(principal)?;
                Ok(json!({
                    "token": token,
                    "identification_number": principal.identification_number(),
                }))
            }
            AuthCommand::Login(credentials) => {
                let token = self.gate.issue_session(&credentials).await?;
                Ok(json!({ "token": token }))
            }
            AuthCommand::CreateCredential(credentials) => {
                self.gate.create_credential(&credentials).await?;
                Ok(json!("credential created"))
            }
            AuthCommand::RemoveCredential(credentials) => {
                let principal = authenticated(principal)?;
                self.gate.remove_credential(principal, &credentials).await?;
                Ok(json!("credential removed"))
            }
            AuthCommand::Logout => {
                self.gate.revoke_session(token).await?;
                Ok(json!("session revoked"))
            }
        }
    }

    async fn handle_account(
        &self,
        principal: Option<&Principal>,
        command: AccountCommand,
    ) -> Result<Value> {
        let value = match command {
            AccountCommand::Open(request) => {
                serde_json::to_value(self.accounts.open_account(request).await?)?
            }
            AccountCommand::Close { account_number } => {
                self.accounts
                    .close_account(authenticated(principal)?, &account_number)
                    .await?;
                json!("account closed")
            }
            AccountCommand::List => {
                serde_json::to_value(self.accounts.list_accounts(authenticated(principal)?).await?)?
            }
            AccountCommand::NumbersByHolder {
                identification_number,
            } => serde_json::to_value(
                self.accounts
                    .account_numbers_for_holder(&identification_number)
                    .await?,
            )?,
            AccountCommand::AddPushToken(request) => {
                let accounts = self
                    .accounts
                    .add_push_token(authenticated(principal)?, request)
                    .await?;
                json!({ "accounts": accounts })
            }
            AccountCommand::RemovePushToken(request) => {
                let accounts = self
                    .accounts
                    .remove_push_token(authenticated(principal)?, request)
                    .await?;
                json!({ "accounts": accounts })
            }
            AccountCommand::SearchHolders { term } => {
                serde_json::to_value(self.accounts.search_holders(&term).await?)?
            }
            AccountCommand::Retrieve(details) => {
                serde_json::to_value(self.accounts.retrieve_accounts(details).await?)?
            }
            AccountCommand::SearchNumbers { term } => {
                serde_json::to_value(self.accounts.search_account_numbers(&term).await?)?
            }
            AccountCommand::CreateMerchant(request) => serde_json::to_value(
                self.accounts
                    .create_merchant(authenticated(principal)?, request)
                    .await?,
            )?,
            AccountCommand::ViewMerchant { merchant_id } => {
                serde_json::to_value(self.accounts.view_merchant(&merchant_id).await?)?
            }
            AccountCommand::SearchMerchants { term } => {
                serde_json::to_value(self.accounts.search_merchants(&term).await?)?
            }
            AccountCommand::RemoveMerchant { merchant_id } => {
                self.accounts
                    .remove_merchant(authenticated(principal)?, &merchant_id)
                    .await?;
                json!("merchant removed")
            }
        };
        Ok(value)
    }

    async fn handle_payment(
        &self,
        principal: Option<&Principal>,
        command: PaymentCommand,
    ) -> Result<Value> {
        let principal = authenticated(principal)?;
        let value = match command {
            PaymentCommand::Transfer(request) => {
                let entry = self.engine.initiate_transfer(principal, request).await?;
                json!({ "id": entry.id, "status": entry.status, "fee": entry.fee })
            }
            PaymentCommand::Deposit(request) => {
                let entry = self.engine.initiate_deposit(principal, request).await?;
                json!({ "id": entry.id, "status": entry.status })
            }
            PaymentCommand::ListTransactions(request) => {
                serde_json::to_value(self.engine.list_transactions(principal, request).await?)?
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{fixture, seed_account};
    use crate::domain::money::Balance;
    use crate::domain::ports::AccountRepository;
    use rust_decimal_macros::dec;

    const ID: &str = "8001015009087";

    fn line(raw: &str) -> CommandVector {
        CommandVector::parse_line(raw)
    }

    async fn login(dispatcher: &Dispatcher) -> String {
        dispatcher
            .dispatch(&line(&format!("0~appauth~3~{}~password1", ID)))
            .await
            .unwrap();
        let reply = dispatcher
            .dispatch(&line(&format!("0~appauth~2~{}~password1", ID)))
            .await
            .unwrap();
        reply["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_bootstrap_seeds_fee_account() {
        let fixture = fixture();
        Dispatcher::bootstrap(fixture.ctx.clone()).await.unwrap();
        assert!(fixture.store.find_account("fees").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_token_is_rejected_before_handler() {
        let fixture = fixture();
        let dispatcher = Dispatcher::bootstrap(fixture.ctx.clone()).await.unwrap();

        let err = dispatcher.dispatch(&line("abc~acmt~1001")).await.unwrap_err();
        assert_eq!(err.component, Component::Auth);
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(err.body()["kind"], "authentication");
    }

    #[tokio::test]
    async fn test_decoder_errors_are_tagged() {
        let fixture = fixture();
        let dispatcher = Dispatcher::bootstrap(fixture.ctx.clone()).await.unwrap();

        let err = dispatcher.dispatch(&line("abc~acmt")).await.unwrap_err();
        assert_eq!(err.component, Component::Decoder);
        assert_eq!(err.body()["component"], "decoder");
    }

    #[tokio::test]
    async fn test_transfer_through_dispatcher() {
        let fixture = fixture();
        let dispatcher = Dispatcher::bootstrap(fixture.ctx.clone()).await.unwrap();
        seed_account(&fixture.store, ID, "alice", Balance::new(dec!(100))).await;
        seed_account(&fixture.store, "other", "bob", Balance::ZERO).await;
        let token = login(&dispatcher).await;

        let reply = dispatcher
            .dispatch(&line(&format!("{}~pain~1~alice@~bob@~40.00~~~lunch", token)))
            .await
            .unwrap();
        assert_eq!(reply["id"], 1);

        let history = dispatcher
            .dispatch(&line(&format!("{}~pain~1001~alice~0~10", token)))
            .await
            .unwrap();
        assert_eq!(history.as_array().unwrap().len(), 1);

        let err = dispatcher
            .dispatch(&line(&format!("{}~pain~1~alice@~bob@~150.00~~~lunch", token)))
            .await
            .unwrap_err();
        assert_eq!(err.component, Component::Transactions);
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    }

    #[tokio::test]
    async fn test_logout_ends_session() {
        let fixture = fixture();
        let dispatcher = Dispatcher::bootstrap(fixture.ctx.clone()).await.unwrap();
        seed_account(&fixture.store, ID, "alice", Balance::ZERO).await;
        let token = login(&dispatcher).await;

        let check = dispatcher
            .dispatch(&line(&format!("{}~appauth~1", token)))
            .await
            .unwrap();
        assert_eq!(check["identification_number"], ID);

        dispatcher
            .dispatch(&line(&format!("{}~appauth~5", token)))
            .await
            .unwrap();
        let err = dispatcher
            .dispatch(&line(&format!("{}~appauth~1", token)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[test]
    fn test_internal_errors_are_generic() {
        let err = DispatchError {
            component: Component::Accounts,
            error: BankError::internal("disk on fire at /var/lib/bank"),
        };
        assert_eq!(err.body()["message"], "internal error");
        assert_eq!(err.body()["kind"], "internal");
    }
}
