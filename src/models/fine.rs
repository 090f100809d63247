//! Fines for late returns

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::AppError;

text_enum! {
    pub enum FineStatus {
        Pending => "PENDING",
        Paid => "PAID",
        Waived => "WAIVED",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Fine {
    pub id: i64,
    pub borrow_record_id: i64,
    pub user_id: i64,
    pub amount: Decimal,
    pub status: FineStatus,
    pub paid_date: Option<DateTime<Utc>>,
    pub paid_amount: Option<Decimal>,
    pub waived_by: Option<i64>,
    pub waiver_reason: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PayFine {
    /// Amount received; defaults to the full fine
    pub amount: Option<Decimal>,
}

impl PayFine {
    /// An empty body pays the full fine; anything else must be valid JSON
    pub fn from_body(body: &[u8]) -> Result<Self, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid payment body: {}", e)))
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct WaiveFine {
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payment_body_pays_in_full() {
        assert!(PayFine::from_body(b"").unwrap().amount.is_none());
        assert!(PayFine::from_body(b" \n").unwrap().amount.is_none());
        assert!(PayFine::from_body(b"{}").unwrap().amount.is_none());
    }

    #[test]
    fn payment_amount_is_read() {
        let payment = PayFine::from_body(br#"{"amount": "2.50"}"#).unwrap();
        assert_eq!(payment.amount, Some(Decimal::new(250, 2)));
    }

    #[test]
    fn malformed_payment_is_rejected() {
        let err = PayFine::from_body(br#"{"amount": "lots"}"#).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(PayFine::from_body(b"amount=2").is_err());
    }
}
