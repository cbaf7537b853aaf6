//! Wallet credit instructions
//!
//! Every money movement out of an escrow is a credit to one wallet account,
//! keyed by `escrow_id:leg` so that the wallet applies it at most once.

use crate::{AccountId, CurrencyCode, EscrowId, EscrowTransaction, MinorUnits, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which side of the settlement a credit pays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditLeg {
    /// `seller_amount` to the seller
    Seller,
    /// `commission_amount` to the platform
    Commission,
    /// `total_amount` back to the customer
    Refund,
}

impl CreditLeg {
    pub const ALL: [CreditLeg; 3] = [Self::Seller, Self::Commission, Self::Refund];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seller => "seller",
            Self::Commission => "commission",
            Self::Refund => "refund",
        }
    }
}

impl fmt::Display for CreditLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CreditLeg {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|leg| leg.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownVariant {
                kind: "credit leg",
                value: s.to_string(),
            })
    }
}

/// Idempotency key sent to the wallet service
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(pub String);

impl IdempotencyKey {
    pub fn new(escrow_id: &EscrowId, leg: CreditLeg) -> Self {
        Self(format!("{}:{}", escrow_id.0, leg))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single credit owed by a settled escrow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditInstruction {
    pub key: IdempotencyKey,
    pub escrow_id: EscrowId,
    pub leg: CreditLeg,
    pub account: AccountId,
    pub amount: MinorUnits,
    pub currency: CurrencyCode,
}

impl CreditInstruction {
    fn new(tx: &EscrowTransaction, leg: CreditLeg, account: AccountId, amount: MinorUnits) -> Self {
        Self {
            key: IdempotencyKey::new(&tx.id, leg),
            escrow_id: tx.id,
            leg,
            account,
            amount,
            currency: tx.currency.clone(),
        }
    }

    /// Credits for a release: seller and commission legs. Zero legs are
    /// omitted.
    pub fn for_release(tx: &EscrowTransaction, platform: &AccountId) -> Vec<Self> {
        [
            Self::new(
                tx,
                CreditLeg::Seller,
                AccountId::for_user(&tx.seller_id),
                tx.seller_amount,
            ),
            Self::new(tx, CreditLeg::Commission, platform.clone(), tx.commission_amount),
        ]
        .into_iter()
        .filter(|credit| credit.amount.is_positive())
        .collect()
    }

    /// Credit for a refund: the whole total back to the customer, no
    /// commission.
    pub fn for_refund(tx: &EscrowTransaction) -> Vec<Self> {
        Some(Self::new(
            tx,
            CreditLeg::Refund,
            AccountId::for_user(&tx.customer_id),
            tx.total_amount,
        ))
        .into_iter()
        .filter(|credit| credit.amount.is_positive())
        .collect()
    }
}

/// Delivery state of a queued credit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditStatus {
    Pending,
    Delivered,
    /// Refused by the wallet; waits for manual reconciliation
    Rejected,
}

impl CreditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for CreditStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "delivered" => Ok(Self::Delivered),
            "rejected" => Ok(Self::Rejected),
            other => Err(ValidationError::UnknownVariant {
                kind: "credit status",
                value: other.to_string(),
            }),
        }
    }
}

/// Outbox row: an instruction plus its delivery bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedCredit {
    pub instruction: CreditInstruction,
    pub status: CreditStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl QueuedCredit {
    pub fn pending(instruction: CreditInstruction, now: DateTime<Utc>) -> Self {
        Self {
            instruction,
            status: CreditStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            delivered_at: None,
        }
    }
}
