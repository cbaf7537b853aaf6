//! Escrow DTOs

use marche_settlement::SettlementError;
use marche_types::{
    CommissionRate, CurrencyCode, DisputeAction, EscrowFilter, EscrowStatus, MinorUnits, OrderId,
    PaymentCaptured, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;

/// Payment captured for an order; opens an escrow
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateEscrowRequest {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub seller_id: Uuid,
    /// Total in minor currency units
    pub total_amount: i64,
    #[validate(length(equal = 3, message = "currency must be a 3-letter ISO 4217 code"))]
    pub currency: String,
    pub commission_rate: Decimal,
}

impl TryFrom<CreateEscrowRequest> for PaymentCaptured {
    type Error = ApiError;

    fn try_from(req: CreateEscrowRequest) -> Result<Self, Self::Error> {
        let currency = CurrencyCode::new(&req.currency)
            .map_err(|e| ApiError::ValidationError(e.to_string()))?;
        let commission_rate = CommissionRate::new(req.commission_rate)
            .map_err(|e| SettlementError::InvalidRate(e.to_string()))?;
        Ok(PaymentCaptured {
            order_id: OrderId::from_uuid(req.order_id),
            customer_id: UserId::from_uuid(req.customer_id),
            seller_id: UserId::from_uuid(req.seller_id),
            total_amount: MinorUnits(req.total_amount),
            currency,
            commission_rate,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OpenDisputeRequest {
    #[serde(default)]
    #[validate(length(max = 2000, message = "reason is too long"))]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ResolveDisputeRequest {
    pub action: DisputeAction,
    #[serde(default)]
    #[validate(length(max = 2000, message = "resolution note is too long"))]
    pub resolution_note: String,
}

/// Status groups accepted by the listing endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusScope {
    Active,
    Disputed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListEscrowsQuery {
    pub customer_id: Option<Uuid>,
    pub seller_id: Option<Uuid>,
    pub status: Option<StatusScope>,
    pub limit: Option<usize>,
}

impl From<ListEscrowsQuery> for EscrowFilter {
    fn from(query: ListEscrowsQuery) -> Self {
        let statuses = match query.status {
            Some(StatusScope::Active) => EscrowStatus::ACTIVE.to_vec(),
            Some(StatusScope::Disputed) => vec![EscrowStatus::Disputed],
            None => Vec::new(),
        };
        EscrowFilter {
            customer_id: query.customer_id.map(UserId::from_uuid),
            seller_id: query.seller_id.map(UserId::from_uuid),
            statuses,
            limit: query.limit,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> CreateEscrowRequest {
        CreateEscrowRequest {
            order_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            total_amount: 100_000,
            currency: "XOF".to_string(),
            commission_rate: dec!(0.15),
        }
    }

    #[test]
    fn test_capture_conversion() {
        let req = request();
        let order_id = req.order_id;
        let captured = PaymentCaptured::try_from(req).unwrap();
        assert_eq!(captured.order_id, OrderId::from_uuid(order_id));
        assert_eq!(captured.currency.as_str(), "XOF");
    }

    #[test]
    fn test_rate_out_of_range_is_invalid_rate() {
        let req = CreateEscrowRequest {
            commission_rate: dec!(1.5),
            ..request()
        };
        let err = PaymentCaptured::try_from(req).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_RATE");
    }

    #[test]
    fn test_currency_length_validated() {
        let req = CreateEscrowRequest {
            currency: "FRANCS".to_string(),
            ..request()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_status_scope_filter() {
        let query: ListEscrowsQuery = serde_json::from_str(r#"{"status":"disputed"}"#).unwrap();
        let filter = EscrowFilter::from(query);
        assert_eq!(filter.statuses, vec![EscrowStatus::Disputed]);
        assert!(filter.customer_id.is_none());
    }
}
