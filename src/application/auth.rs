use super::Context;
use crate::domain::account::Principal;
use crate::domain::command::Credentials;
use crate::domain::ports::{AccountRepositoryRef, CredentialStoreRef, SessionStoreRef};
use crate::error::{BankError, Result};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Resolves session tokens to principals and owns the credential lifecycle.
pub struct AuthorizationGate {
    sessions: SessionStoreRef,
    credentials: CredentialStoreRef,
    accounts: AccountRepositoryRef,
    ttl: Duration,
    single_session_per_holder: bool,
}

impl AuthorizationGate {
    pub fn new(ctx: &Context) -> Self {
        Self {
            sessions: ctx.sessions.clone(),
            credentials: ctx.credentials.clone(),
            accounts: ctx.accounts.clone(),
            ttl: ctx.policy.session_ttl,
            single_session_per_holder: ctx.policy.single_session_per_holder,
        }
    }

    /// Returns the principal bound to `token` and restarts its expiry window.
    pub async fn validate_and_extend(&self, token: &str) -> Result<Principal> {
        if token.is_empty() {
            return Err(BankError::AuthenticationError(
                "session token is missing".to_string(),
            ));
        }
        let found = match self.sessions.touch(token, self.ttl).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "session lookup failed, retrying once");
                self.sessions.touch(token, self.ttl).await.map_err(|e| {
                    error!(error = %e, "session store unavailable");
                    BankError::AuthenticationError("session store unavailable".to_string())
                })?
            }
        };
        found
            .map(Principal::new)
            .ok_or_else(|| BankError::AuthenticationError("session token not found".to_string()))
    }

    /// Verifies the credential and binds a fresh token to its holder.
    pub async fn issue_session(&self, credentials: &Credentials) -> Result<String> {
        let id = &credentials.identification_number;
        if !self.credentials.verify(id, &credentials.password).await? {
            return Err(BankError::AuthenticationError(
                "authentication credentials invalid".to_string(),
            ));
        }
        if self.single_session_per_holder {
            let revoked = self.sessions.remove_principal(id).await?;
            if revoked > 0 {
                info!(revoked, "revoked earlier sessions");
            }
        }
        let token = Uuid::new_v4().to_string();
        self.sessions.insert(&token, id, self.ttl).await?;
        info!("session issued");
        Ok(token)
    }

    pub async fn revoke_session(&self, token: &str) -> Result<()> {
        if !self.sessions.remove(token).await? {
            return Err(BankError::NotFoundError("session token not found".to_string()));
        }
        Ok(())
    }

    pub async fn create_credential(&self, credentials: &Credentials) -> Result<()> {
        let id = &credentials.identification_number;
        if self.accounts.find_holder(id).await?.is_none() {
            return Err(BankError::NotFoundError(
                "identification number is not linked to an account holder".to_string(),
            ));
        }
        if self.credentials.exists(id).await? {
            return Err(BankError::ConflictError(
                "credential already exists".to_string(),
            ));
        }
        if credentials.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(BankError::ValidationError(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        self.credentials.create(id, &credentials.password).await?;
        info!("credential created");
        Ok(())
    }

    /// Removes the principal's own credential and ends all of its sessions.
    pub async fn remove_credential(
        &self,
        principal: &Principal,
        credentials: &Credentials,
    ) -> Result<()> {
        let id = &credentials.identification_number;
        if principal.identification_number() != id {
            return Err(BankError::AuthorizationError(
                "a credential can only be removed by its holder".to_string(),
            ));
        }
        if !self.credentials.verify(id, &credentials.password).await? {
            return Err(BankError::AuthenticationError(
                "authentication credentials invalid".to_string(),
            ));
        }
        if !self.credentials.remove(id).await? {
            return Err(BankError::NotFoundError("credential not found".to_string()));
        }
        self.sessions.remove_principal(id).await?;
        info!("credential removed");
        Ok(())
    }

    /// Fails with `AuthorizationError` unless the principal holds the account.
    pub async fn require_owner(&self, principal: &Principal, account_number: &str) -> Result<()> {
        let owned = self
            .accounts
            .account_numbers_for_holder(principal.identification_number())
            .await?;
        if !owned.iter().any(|n| n == account_number) {
            return Err(BankError::AuthorizationError(format!(
                "account {} does not belong to the authenticated holder",
                account_number
            )));
        }
        Ok(())
    }
}
