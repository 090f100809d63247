//! Circulation service: borrowing, returns, reservations and the overdue sweep

use std::time::Duration;

use chrono::Utc;

use crate::{
    config::LibraryConfig,
    error::AppResult,
    models::{
        audit::{AuditAction, AuditEntry, ClientInfo},
        borrow::{BorrowReceipt, MyBooks, ReturnReceipt},
        reservation::{Reservation, ReservationReceipt},
        user::SessionClaims,
    },
    repository::{
        borrows::{LendingRules, ReturnRules},
        Repository,
    },
    services::audit::AuditService,
};

/// Returned records shown on the member's shelf
const RECENT_RETURNS: i64 = 10;

/// What one sweep changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub marked_overdue: u64,
    pub expired_holds: usize,
    pub promoted: usize,
}

#[derive(Clone)]
pub struct CirculationService {
    repository: Repository,
    audit: AuditService,
    config: LibraryConfig,
}

impl CirculationService {
    pub fn new(repository: Repository, audit: AuditService, config: LibraryConfig) -> Self {
        Self {
            repository,
            audit,
            config,
        }
    }

    fn lending_rules(&self) -> LendingRules {
        LendingRules {
            max_books_per_user: self.config.max_books_per_user,
            borrow_period_days: self.config.borrow_period_days,
        }
    }

    fn return_rules(&self) -> ReturnRules {
        ReturnRules {
            fine_per_day: self.config.fine_per_day,
            hold_days: self.config.reservation_hold_days,
        }
    }

    /// Lend a copy of a book to the caller
    pub async fn borrow(&self, claims: &SessionClaims, book_id: i64, client: &ClientInfo) -> AppResult<BorrowReceipt> {
        let (record, book) = self
            .repository
            .borrows
            .borrow(claims.user_id, book_id, self.lending_rules(), Utc::now())
            .await?;

        self.audit
            .record(
                AuditEntry::new(Some(claims.user_id), AuditAction::Borrow, client)
                    .object("Book", book.id, book.repr())
                    .details(format!("Borrowed book: {}", book.title)),
            )
            .await?;

        let message = format!(
            "You have successfully borrowed \"{}\". Due date: {}",
            book.title,
            record.due_date.format("%Y-%m-%d")
        );

        Ok(BorrowReceipt {
            record,
            book_title: book.title,
            message,
        })
    }

    /// Return a borrowed copy. Staff may return records of any member.
    pub async fn return_book(&self, claims: &SessionClaims, record_id: i64, client: &ClientInfo) -> AppResult<ReturnReceipt> {
        let staff_id = claims.role.can_manage_books().then_some(claims.user_id);

        let outcome = self
            .repository
            .borrows
            .return_record(record_id, claims.user_id, staff_id, self.return_rules(), Utc::now())
            .await?;

        self.audit
            .record(
                AuditEntry::new(Some(claims.user_id), AuditAction::Return, client)
                    .object("Book", outcome.book.id, outcome.book.repr())
                    .details(format!("Returned book: {}", outcome.book.title)),
            )
            .await?;

        if let Some(ref promoted) = outcome.promoted {
            log_hold_ready(promoted);
        }

        let message = match outcome.fine {
            Some(ref fine) => format!(
                "You have returned \"{}\". A fine of ${} has been applied for late return.",
                outcome.book.title, fine.amount
            ),
            None => format!("You have successfully returned \"{}\".", outcome.book.title),
        };

        Ok(ReturnReceipt {
            record: outcome.record,
            book_title: outcome.book.title,
            fine: outcome.fine,
            message,
        })
    }

    /// The caller's loans, reservations and unpaid fines
    pub async fn my_books(&self, claims: &SessionClaims) -> AppResult<MyBooks> {
        let now = Utc::now();
        let fine_per_day = self.config.fine_per_day;

        let active_records = self
            .repository
            .borrows
            .list_open_for_user(claims.user_id)
            .await?
            .into_iter()
            .map(|r| r.with_overdue(now, fine_per_day))
            .collect();

        let returned_records = self
            .repository
            .borrows
            .list_returned_for_user(claims.user_id, RECENT_RETURNS)
            .await?
            .into_iter()
            .map(|r| r.with_overdue(now, fine_per_day))
            .collect();

        Ok(MyBooks {
            active_records,
            returned_records,
            reservations: self.repository.reservations.list_active_for_user(claims.user_id).await?,
            pending_fines: self.repository.fines.list_pending_for_user(claims.user_id).await?,
        })
    }

    /// Join the reservation queue for a book
    pub async fn reserve(&self, claims: &SessionClaims, book_id: i64, client: &ClientInfo) -> AppResult<ReservationReceipt> {
        let (reservation, book) = self.repository.reservations.create(claims.user_id, book_id).await?;

        self.audit
            .record(
                AuditEntry::new(Some(claims.user_id), AuditAction::Create, client)
                    .object("Reservation", reservation.id, book.repr())
                    .details(format!("Reserved book: {}", book.title)),
            )
            .await?;

        let message = format!(
            "You have reserved \"{}\". Your position in queue: {}",
            book.title, reservation.queue_position
        );

        Ok(ReservationReceipt {
            reservation,
            book_title: book.title,
            message,
        })
    }

    /// Cancel one of the caller's reservations
    pub async fn cancel_reservation(
        &self,
        claims: &SessionClaims,
        reservation_id: i64,
        client: &ClientInfo,
    ) -> AppResult<Reservation> {
        let (cancelled, promoted) = self
            .repository
            .reservations
            .cancel(reservation_id, claims.user_id, Utc::now(), self.config.reservation_hold_days)
            .await?;

        self.audit
            .record(
                AuditEntry::new(Some(claims.user_id), AuditAction::Update, client)
                    .object("Reservation", cancelled.id, format!("Reservation {}", cancelled.id))
                    .details("Reservation cancelled"),
            )
            .await?;

        if let Some(ref promoted) = promoted {
            log_hold_ready(promoted);
        }

        Ok(cancelled)
    }

    /// Flag overdue loans and expire lapsed holds
    pub async fn sweep(&self) -> AppResult<SweepReport> {
        let now = Utc::now();

        let marked_overdue = self.repository.borrows.mark_overdue(now).await?;
        let expired = self
            .repository
            .reservations
            .expire_holds(now, self.config.reservation_hold_days)
            .await?;

        let mut report = SweepReport {
            marked_overdue,
            expired_holds: expired.len(),
            promoted: 0,
        };

        for hold in &expired {
            tracing::info!(
                "Reservation {} for book {} expired",
                hold.expired.id,
                hold.expired.book_id
            );
            if let Some(ref promoted) = hold.promoted {
                log_hold_ready(promoted);
                report.promoted += 1;
            }
        }

        Ok(report)
    }

    /// Run [`sweep`](Self::sweep) forever on the configured interval
    pub async fn run_sweeper(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.sweep_interval_secs.max(1)));

        loop {
            interval.tick().await;
            match self.sweep().await {
                Ok(report) if report != SweepReport::default() => tracing::info!(
                    "Circulation sweep: {} overdue, {} holds expired, {} promoted",
                    report.marked_overdue,
                    report.expired_holds,
                    report.promoted
                ),
                Ok(_) => tracing::debug!("Circulation sweep: nothing to do"),
                Err(e) => tracing::error!("Circulation sweep failed: {}", e),
            }
        }
    }
}

fn log_hold_ready(reservation: &Reservation) {
    tracing::info!(
        "Reservation {} is ready for user {} (book {})",
        reservation.id,
        reservation.user_id,
        reservation.book_id
    );
}
