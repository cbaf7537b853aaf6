//! Database models - mapped from PostgreSQL tables

use chrono::{DateTime, Utc};
use marche_types::{
    AccountId, Actor, AuditAction, AuditEntry, AuditEntryId, AuditOutcome, CommissionRate,
    CreditInstruction, CurrencyCode, EscrowId, EscrowStatus, EscrowTransaction, IdempotencyKey,
    MinorUnits, OrderId, QueuedCredit, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{DbError, DbResult};

fn version_to_db(version: u64) -> DbResult<i64> {
    i64::try_from(version).map_err(|_| DbError::Corrupt(format!("version {} overflows BIGINT", version)))
}

fn version_from_db(version: i64) -> DbResult<u64> {
    u64::try_from(version).map_err(|_| DbError::Corrupt(format!("negative version {}", version)))
}

fn parse_status(value: Option<&str>) -> DbResult<Option<EscrowStatus>> {
    value.map(str::parse).transpose().map_err(DbError::from)
}

// ============================================================================
// Escrow Models
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbEscrow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub seller_id: Uuid,
    pub total_amount: i64,
    pub seller_amount: i64,
    pub commission_amount: i64,
    pub commission_rate: Decimal,
    pub currency: String,
    pub status: String,
    pub dispute_reason: Option<String>,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivery_confirmed_at: Option<DateTime<Utc>>,
    pub disputed_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl TryFrom<&EscrowTransaction> for DbEscrow {
    type Error = DbError;

    fn try_from(tx: &EscrowTransaction) -> DbResult<Self> {
        Ok(Self {
            id: tx.id.0,
            order_id: tx.order_id.0,
            customer_id: tx.customer_id.0,
            seller_id: tx.seller_id.0,
            total_amount: tx.total_amount.0,
            seller_amount: tx.seller_amount.0,
            commission_amount: tx.commission_amount.0,
            commission_rate: tx.commission_rate.as_decimal(),
            currency: tx.currency.to_string(),
            status: tx.status.as_str().to_string(),
            dispute_reason: tx.dispute_reason.clone(),
            resolution: tx.resolution.clone(),
            created_at: tx.created_at,
            delivery_confirmed_at: tx.delivery_confirmed_at,
            disputed_at: tx.disputed_at,
            released_at: tx.released_at,
            refunded_at: tx.refunded_at,
            updated_at: tx.updated_at,
            version: version_to_db(tx.version)?,
        })
    }
}

impl TryFrom<DbEscrow> for EscrowTransaction {
    type Error = DbError;

    fn try_from(row: DbEscrow) -> DbResult<Self> {
        let tx = Self {
            id: EscrowId::from_uuid(row.id),
            order_id: OrderId::from_uuid(row.order_id),
            customer_id: UserId::from_uuid(row.customer_id),
            seller_id: UserId::from_uuid(row.seller_id),
            total_amount: MinorUnits(row.total_amount),
            seller_amount: MinorUnits(row.seller_amount),
            commission_amount: MinorUnits(row.commission_amount),
            commission_rate: CommissionRate::new(row.commission_rate)?,
            currency: CurrencyCode::new(&row.currency)?,
            status: row.status.parse()?,
            dispute_reason: row.dispute_reason,
            resolution: row.resolution,
            created_at: row.created_at,
            delivery_confirmed_at: row.delivery_confirmed_at,
            disputed_at: row.disputed_at,
            released_at: row.released_at,
            refunded_at: row.refunded_at,
            updated_at: row.updated_at,
            version: version_from_db(row.version)?,
        };
        tx.check_balanced()?;
        Ok(tx)
    }
}

// ============================================================================
// Audit Models
// ============================================================================

/// Audit row. `seq` is assigned by the database and ignored on insert.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbAuditEntry {
    pub seq: i64,
    pub id: Uuid,
    pub escrow_id: Uuid,
    pub actor_id: Uuid,
    pub actor_role: String,
    pub action: String,
    pub from_status: Option<String>,
    pub to_status: Option<String>,
    pub outcome: String,
    pub reason: Option<String>,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl From<&AuditEntry> for DbAuditEntry {
    fn from(entry: &AuditEntry) -> Self {
        let (outcome, reason) = match &entry.outcome {
            AuditOutcome::Applied => ("applied", None),
            AuditOutcome::Rejected { reason } => ("rejected", Some(reason.clone())),
        };
        Self {
            seq: 0,
            id: entry.id.0,
            escrow_id: entry.escrow_id.0,
            actor_id: entry.actor.user_id.0,
            actor_role: entry.actor.role.as_str().to_string(),
            action: entry.action.as_str().to_string(),
            from_status: entry.from_status.map(|s| s.as_str().to_string()),
            to_status: entry.to_status.map(|s| s.as_str().to_string()),
            outcome: outcome.to_string(),
            reason,
            note: entry.note.clone(),
            recorded_at: entry.recorded_at,
        }
    }
}

impl TryFrom<DbAuditEntry> for AuditEntry {
    type Error = DbError;

    fn try_from(row: DbAuditEntry) -> DbResult<Self> {
        let outcome = match (row.outcome.as_str(), row.reason) {
            ("applied", _) => AuditOutcome::Applied,
            ("rejected", reason) => AuditOutcome::Rejected {
                reason: reason.unwrap_or_default(),
            },
            (other, _) => return Err(DbError::Corrupt(format!("unknown audit outcome {}", other))),
        };
        Ok(Self {
            id: AuditEntryId::from_uuid(row.id),
            escrow_id: EscrowId::from_uuid(row.escrow_id),
            actor: Actor::new(UserId::from_uuid(row.actor_id), row.actor_role.parse()?),
            action: row.action.parse::<AuditAction>()?,
            from_status: parse_status(row.from_status.as_deref())?,
            to_status: parse_status(row.to_status.as_deref())?,
            outcome,
            note: row.note,
            recorded_at: row.recorded_at,
        })
    }
}

// ============================================================================
// Wallet Credit Models
// ============================================================================

/// Outbox row. `seq` is assigned by the database and ignored on insert.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbCredit {
    pub seq: i64,
    pub idempotency_key: String,
    pub escrow_id: Uuid,
    pub leg: String,
    pub account_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl DbCredit {
    /// Fresh pending row for an instruction
    pub fn pending(instruction: &CreditInstruction, now: DateTime<Utc>) -> Self {
        Self {
            seq: 0,
            idempotency_key: instruction.key.to_string(),
            escrow_id: instruction.escrow_id.0,
            leg: instruction.leg.as_str().to_string(),
            account_id: instruction.account.to_string(),
            amount: instruction.amount.0,
            currency: instruction.currency.to_string(),
            status: "pending".to_string(),
            attempts: 0,
            last_error: None,
            created_at: now,
            delivered_at: None,
        }
    }
}

impl TryFrom<DbCredit> for QueuedCredit {
    type Error = DbError;

    fn try_from(row: DbCredit) -> DbResult<Self> {
        let instruction = CreditInstruction {
            key: IdempotencyKey(row.idempotency_key),
            escrow_id: EscrowId::from_uuid(row.escrow_id),
            leg: row.leg.parse()?,
            account: AccountId(row.account_id),
            amount: MinorUnits(row.amount),
            currency: CurrencyCode::new(&row.currency)?,
        };
        Ok(Self {
            instruction,
            status: row.status.parse()?,
            attempts: u32::try_from(row.attempts).unwrap_or_default(),
            last_error: row.last_error,
            created_at: row.created_at,
            delivered_at: row.delivered_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marche_types::{EscrowOperation, PaymentCaptured};
    use rust_decimal_macros::dec;

    fn escrow() -> EscrowTransaction {
        let event = PaymentCaptured {
            order_id: OrderId::new(),
            customer_id: UserId::new(),
            seller_id: UserId::new(),
            total_amount: MinorUnits(100_000),
            currency: CurrencyCode::new("XOF").unwrap(),
            commission_rate: CommissionRate::new(dec!(0.15)).unwrap(),
        };
        EscrowTransaction::open(&event, MinorUnits(85_000), MinorUnits(15_000), Utc::now()).unwrap()
    }

    #[test]
    fn test_escrow_row_conversion() {
        let mut tx = escrow();
        tx.version = 7;
        let row = DbEscrow::try_from(&tx).unwrap();
        assert_eq!(row.status, "pending");
        assert_eq!(row.version, 7);
        assert_eq!(EscrowTransaction::try_from(row).unwrap(), tx);
    }

    #[test]
    fn test_unbalanced_row_is_corrupt() {
        let mut row = DbEscrow::try_from(&escrow()).unwrap();
        row.commission_amount += 1;
        let err = EscrowTransaction::try_from(row).unwrap_err();
        assert!(matches!(err, DbError::Corrupt(_)));
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        let mut row = DbEscrow::try_from(&escrow()).unwrap();
        row.status = "shipped".to_string();
        assert!(matches!(
            EscrowTransaction::try_from(row),
            Err(DbError::Corrupt(_))
        ));
    }

    #[test]
    fn test_rejected_audit_row() {
        let tx = escrow();
        let entry = AuditEntry::rejected(
            tx.id,
            Actor::seller(tx.seller_id),
            AuditAction::Transition(EscrowOperation::Release),
            Some(EscrowStatus::Pending),
            "illegal transition",
            None,
        );
        let row = DbAuditEntry::from(&entry);
        assert_eq!(row.outcome, "rejected");
        assert_eq!(row.action, "release");
        assert_eq!(row.actor_role, "seller");
        assert_eq!(AuditEntry::try_from(row).unwrap(), entry);
    }

    #[test]
    fn test_credit_row() {
        let tx = escrow();
        let instruction = CreditInstruction::for_refund(&tx).remove(0);
        let row = DbCredit::pending(&instruction, Utc::now());
        assert_eq!(row.leg, "refund");
        assert_eq!(row.amount, 100_000);
        let queued = QueuedCredit::try_from(row).unwrap();
        assert_eq!(queued.instruction, instruction);
        assert_eq!(queued.attempts, 0);
    }
}
