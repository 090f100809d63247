//! Borrow records (loans) and the member's shelf view

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::{fine::Fine, reservation::ReservationDetails};

text_enum! {
    /// Lifecycle of a borrow record
    pub enum BorrowStatus {
        Active => "ACTIVE",
        Returned => "RETURNED",
        Overdue => "OVERDUE",
        Lost => "LOST",
    }
}

impl BorrowStatus {
    /// Record still holds a copy of the book
    pub fn is_open(&self) -> bool {
        matches!(self, BorrowStatus::Active | BorrowStatus::Overdue)
    }
}

/// Borrow record from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowRecord {
    pub id: i64,
    pub user_id: i64,
    pub book_id: i64,
    pub borrowed_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_date: Option<DateTime<Utc>>,
    pub status: BorrowStatus,
    pub notes: String,
    pub issued_by: Option<i64>,
    pub returned_to: Option<i64>,
}

/// Default due date for a loan starting at `borrowed`
pub fn due_date_for(borrowed: DateTime<Utc>, period_days: i64) -> DateTime<Utc> {
    borrowed + Duration::days(period_days)
}

/// Whole days a loan is past due, or `None` when it is returned or not yet due
fn lateness(status: BorrowStatus, due_date: DateTime<Utc>, now: DateTime<Utc>) -> Option<i64> {
    (status != BorrowStatus::Returned && now > due_date).then(|| (now - due_date).num_days())
}

impl BorrowRecord {
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        lateness(self.status, self.due_date, now).is_some()
    }

    /// Whole days past the due date
    pub fn days_overdue_at(&self, now: DateTime<Utc>) -> i64 {
        lateness(self.status, self.due_date, now).unwrap_or(0)
    }

    pub fn fine_at(&self, now: DateTime<Utc>, fine_per_day: Decimal) -> Decimal {
        Decimal::from(self.days_overdue_at(now)) * fine_per_day
    }
}

/// Borrow record joined with its book, for member views
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowDetails {
    pub id: i64,
    pub book_id: i64,
    pub book_title: String,
    pub book_author: String,
    pub user_id: i64,
    pub borrowed_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_date: Option<DateTime<Utc>>,
    pub status: BorrowStatus,
    #[sqlx(skip)]
    pub is_overdue: bool,
    #[sqlx(skip)]
    pub days_overdue: i64,
    #[sqlx(skip)]
    pub calculated_fine: Decimal,
}

impl BorrowDetails {
    /// Fill the computed overdue fields
    pub fn with_overdue(mut self, now: DateTime<Utc>, fine_per_day: Decimal) -> Self {
        let late = lateness(self.status, self.due_date, now);
        self.is_overdue = late.is_some();
        self.days_overdue = late.unwrap_or(0);
        self.calculated_fine = Decimal::from(self.days_overdue) * fine_per_day;
        self
    }
}

/// Outcome of a borrow request
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BorrowReceipt {
    pub record: BorrowRecord,
    pub book_title: String,
    pub message: String,
}

/// Outcome of a return
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReturnReceipt {
    pub record: BorrowRecord,
    pub book_title: String,
    /// Fine raised for a late return
    pub fine: Option<Fine>,
    pub message: String,
}

/// The member's shelf
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MyBooks {
    pub active_records: Vec<BorrowDetails>,
    /// Last ten returned records
    pub returned_records: Vec<BorrowDetails>,
    pub reservations: Vec<ReservationDetails>,
    pub pending_fines: Vec<Fine>,
}
