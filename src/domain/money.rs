use crate::error::{BankError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::ops::Neg;
use std::str::FromStr;

/// Number of decimal places carried by every monetary value.
pub const MONEY_SCALE: u32 = 4;

/// Represents a monetary value with 4 decimal places precision.
///
/// This is a wrapper around `rust_decimal::Decimal` to enforce domain-specific rules
/// and provide type safety for financial calculations. Balances may be negative
/// down to the account's overdraft limit.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

/// Represents a non-negative monetary amount moved by a transaction.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(BankError::ValidationError(
                "Amount must not be negative".to_string(),
            ));
        }
        if value.normalize().scale() > MONEY_SCALE {
            return Err(BankError::ValidationError(format!(
                "Amount supports at most {} decimal places",
                MONEY_SCALE
            )));
        }
        Ok(Self(value))
    }

    /// Parses an amount field, ignoring surrounding whitespace and null padding.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim_matches(|c: char| c == '\0' || c.is_whitespace());
        let value = Decimal::from_str(trimmed).map_err(|e| {
            BankError::ValidationError(format!(
                "Could not convert transaction amount '{}' to decimal: {}",
                trimmed, e
            ))
        })?;
        Self::new(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = BankError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self> {
        self.0.checked_add(rhs.0).map(Self).ok_or_else(|| out_of_range(self, rhs))
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self> {
        self.0.checked_sub(rhs.0).map(Self).ok_or_else(|| out_of_range(self, rhs))
    }
}

fn out_of_range(lhs: Balance, rhs: Balance) -> BankError {
    BankError::ValidationError(format!(
        "Amount {} is out of range for balance {}",
        rhs.0, lhs.0
    ))
}

impl Neg for Balance {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

/// Proportional fee charged on outgoing transfers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeRate(Decimal);

impl FeeRate {
    /// One basis point.
    pub const STANDARD: Self = Self(Decimal::from_parts(1, 0, 0, false, 4));

    pub fn new(rate: Decimal) -> Result<Self> {
        if rate.is_sign_negative() && !rate.is_zero() {
            return Err(BankError::ValidationError(
                "Fee rate must not be negative".to_string(),
            ));
        }
        Ok(Self(rate))
    }

    pub fn rate(&self) -> Decimal {
        self.0
    }

    /// Fee owed on `amount`, rounded half-up to the money scale.
    pub fn fee_for(&self, amount: Amount) -> Result<Balance> {
        let raw = amount.value().checked_mul(self.0).ok_or_else(|| {
            BankError::ValidationError(format!(
                "Fee on amount {} is out of range",
                amount.value()
            ))
        })?;
        Ok(Balance(raw.round_dp_with_strategy(
            MONEY_SCALE,
            RoundingStrategy::MidpointAwayFromZero,
        )))
    }
}
