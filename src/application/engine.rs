use super::auth::AuthorizationGate;
use super::notifications::NotificationOutbox;
use super::{Context, Policy};
use crate::domain::account::{Account, AccountRef, AccountType, Principal};
use crate::domain::command::{DepositRequest, ListTransactionsRequest, TransferRequest};
use crate::domain::money::Balance;
use crate::domain::ports::{AccountRepositoryRef, LedgerStoreRef, Notification};
use crate::domain::transaction::{
    LedgerEntry, LedgerQuery, Leg, Movement, PendingEntry, TransactionType,
};
use crate::error::{BankError, Result};
use std::sync::Arc;
use tracing::info;

pub const MAX_PER_PAGE: usize = 100;

/// Moves funds between accounts and reads the ledger back.
///
/// Every movement is handed to the `LedgerStore` as one [`Movement`], which
/// the store applies atomically: the sender's debit is conditional on its
/// available balance at commit time, so concurrent transfers from the same
/// account can never overdraw it.
pub struct TransactionEngine {
    accounts: AccountRepositoryRef,
    ledger: LedgerStoreRef,
    outbox: NotificationOutbox,
    gate: Arc<AuthorizationGate>,
    policy: Policy,
}

impl TransactionEngine {
    pub fn new(ctx: &Context, gate: Arc<AuthorizationGate>) -> Self {
        Self {
            accounts: ctx.accounts.clone(),
            ledger: ctx.ledger.clone(),
            outbox: ctx.outbox.clone(),
            gate,
            policy: ctx.policy.clone(),
        }
    }

    /// Creates the account collecting transfer fees unless it exists.
    pub async fn ensure_fee_account(&self) -> Result<()> {
        let account = Account::open(
            self.policy.fee_account.clone(),
            self.policy.bank_number.clone(),
            "Bank,Fees",
            AccountType::Cheque,
            Balance::ZERO,
            Balance::ZERO,
        );
        self.accounts.ensure_system_account(account).await
    }

    fn local_ref(&self, reference: &AccountRef, role: &str) -> Result<AccountRef> {
        if !reference.is_local_to(&self.policy.bank_number) {
            return Err(BankError::ValidationError(format!(
                "{} bank {} is not this bank; only local payments are supported",
                role, reference.bank_number
            )));
        }
        Ok(AccountRef::local(
            reference.account_number.clone(),
            self.policy.bank_number.clone(),
        ))
    }

    pub async fn initiate_transfer(
        &self,
        principal: &Principal,
        request: TransferRequest,
    ) -> Result<LedgerEntry> {
        let sender = self.local_ref(&request.sender, "sender")?;
        let receiver = self.local_ref(&request.receiver, "receiver")?;
        if sender.account_number == receiver.account_number {
            return Err(BankError::ValidationError(
                "sender and receiver must be different accounts".to_string(),
            ));
        }
        self.gate
            .require_owner(principal, &sender.account_number)
            .await?;

        let amount = Balance::from(request.amount);
        let fee = self.policy.fee_rate.fee_for(request.amount)?;
        let mut credits = vec![Leg::new(receiver.account_number.clone(), amount)];
        if !fee.is_zero() {
            credits.push(Leg::new(self.policy.fee_account.clone(), fee));
        }
        let movement = Movement {
            debit: Some(Leg::new(sender.account_number.clone(), amount.checked_add(fee)?)),
            credits,
            entry: PendingEntry {
                transaction_type: TransactionType::CreditTransfer,
                sender,
                receiver,
                amount: request.amount,
                fee,
                geo: request.geo,
                description: request.description,
            },
        };

        let entry = self.ledger.commit(movement).await?;
        info!(
            id = entry.id,
            sender = %entry.sender,
            receiver = %entry.receiver,
            amount = %entry.amount.value(),
            fee = %entry.fee.0,
            "credit transfer approved"
        );
        self.outbox.enqueue(Notification::new(
            entry.sender.account_number.clone(),
            "Payment sent",
        ));
        self.outbox.enqueue(Notification::new(
            entry.receiver.account_number.clone(),
            "Payment received",
        ));
        Ok(entry)
    }

    pub async fn initiate_deposit(
        &self,
        principal: &Principal,
        request: DepositRequest,
    ) -> Result<LedgerEntry> {
        if !self.policy.allow_unfunded_deposits {
            return Err(BankError::AuthorizationError(
                "deposits require an external funding authorization".to_string(),
            ));
        }
        let receiver = self.local_ref(&request.receiver, "receiver")?;
        self.gate
            .require_owner(principal, &receiver.account_number)
            .await?;

        let movement = Movement {
            debit: None,
            credits: vec![Leg::new(
                receiver.account_number.clone(),
                Balance::from(request.amount),
            )],
            entry: PendingEntry {
                transaction_type: TransactionType::Deposit,
                sender: AccountRef::system(),
                receiver,
                amount: request.amount,
                fee: Balance::ZERO,
                geo: request.geo,
                description: request.description,
            },
        };

        let entry = self.ledger.commit(movement).await?;
        info!(
            id = entry.id,
            receiver = %entry.receiver,
            amount = %entry.amount.value(),
            "deposit approved"
        );
        self.outbox.enqueue(Notification::new(
            entry.receiver.account_number.clone(),
            "Deposit received",
        ));
        Ok(entry)
    }

    pub async fn list_transactions(
        &self,
        principal: &Principal,
        request: ListTransactionsRequest,
    ) -> Result<Vec<LedgerEntry>> {
        if request.per_page == 0 || request.per_page > MAX_PER_PAGE {
            return Err(BankError::ValidationError(format!(
                "perPage must be between 1 and {}",
                MAX_PER_PAGE
            )));
        }
        let offset = request.page.checked_mul(request.per_page).ok_or_else(|| {
            BankError::ValidationError(format!("page {} is out of range", request.page))
        })?;
        self.gate
            .require_owner(principal, &request.account_number)
            .await?;

        let query = LedgerQuery {
            offset,
            limit: request.per_page,
            since: request.since,
        };
        self.ledger
            .entries_for_account(&request.account_number, &query)
            .await
    }
}
