//! Reservations (holds) on books

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

text_enum! {
    pub enum ReservationStatus {
        Pending => "PENDING",
        /// A copy is held for the member until `expiry_date`
        Ready => "READY",
        Fulfilled => "FULFILLED",
        Cancelled => "CANCELLED",
        Expired => "EXPIRED",
    }
}

impl ReservationStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Ready)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Reservation {
    pub id: i64,
    pub user_id: i64,
    pub book_id: i64,
    pub status: ReservationStatus,
    pub reserved_date: DateTime<Utc>,
    pub notified_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub queue_position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Expiry of a hold that becomes ready at `notified`
pub fn hold_expiry(notified: DateTime<Utc>, hold_days: i64) -> DateTime<Utc> {
    notified + Duration::days(hold_days)
}

/// Reservation joined with its book title
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ReservationDetails {
    pub id: i64,
    pub book_id: i64,
    pub book_title: String,
    pub status: ReservationStatus,
    pub reserved_date: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub queue_position: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReservationReceipt {
    pub reservation: Reservation,
    pub book_title: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_statuses() {
        assert!(ReservationStatus::Pending.is_active());
        assert!(ReservationStatus::Ready.is_active());
        assert!(!ReservationStatus::Cancelled.is_active());
        assert!(!ReservationStatus::Fulfilled.is_active());
        assert!(!ReservationStatus::Expired.is_active());
    }

    #[test]
    fn hold_lasts_configured_days() {
        let now = Utc::now();
        assert_eq!(hold_expiry(now, 3) - now, Duration::days(3));
    }
}
