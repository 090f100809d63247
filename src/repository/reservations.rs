//! Reservations repository: the per-book hold queue

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::Book,
        reservation::{hold_expiry, Reservation, ReservationDetails, ReservationStatus},
    },
};

#[derive(Clone)]
pub struct ReservationsRepository {
    pool: Pool<Postgres>,
}

/// A hold that lapsed, and the reservation that inherited it
#[derive(Debug, Clone)]
pub struct ExpiredHold {
    pub expired: Reservation,
    pub promoted: Option<Reservation>,
}

impl ReservationsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Whether the member has a PENDING or READY reservation on the book
    pub async fn has_active(&self, user_id: i64, book_id: i64) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM reservations
                WHERE user_id = $1 AND book_id = $2 AND status IN ('PENDING', 'READY')
            )
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Active reservations of a member
    pub async fn list_active_for_user(&self, user_id: i64) -> AppResult<Vec<ReservationDetails>> {
        let reservations = sqlx::query_as::<_, ReservationDetails>(
            r#"
            SELECT r.id, r.book_id, b.title AS book_title, r.status, r.reserved_date,
                   r.expiry_date, r.queue_position
            FROM reservations r
            JOIN books b ON r.book_id = b.id
            WHERE r.user_id = $1 AND r.status IN ('PENDING', 'READY')
            ORDER BY r.reserved_date DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(reservations)
    }

    /// Join the queue for a book
    pub async fn create(&self, user_id: i64, book_id: i64) -> AppResult<(Reservation, Book)> {
        let mut tx = self.pool.begin().await?;

        // Lock the book so concurrent reservations get distinct positions
        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(book_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

        let already: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM reservations
                WHERE user_id = $1 AND book_id = $2 AND status IN ('PENDING', 'READY')
            )
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&mut *tx)
        .await?;

        if already {
            return Err(AppError::Conflict("You have already reserved this book.".to_string()));
        }

        let pending: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations WHERE book_id = $1 AND status = 'PENDING'",
        )
        .bind(book_id)
        .fetch_one(&mut *tx)
        .await?;

        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            INSERT INTO reservations (user_id, book_id, status, queue_position)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(ReservationStatus::Pending)
        .bind((pending + 1) as i32)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((reservation, book))
    }

    /// Cancel the member's own PENDING or READY reservation
    pub async fn cancel(
        &self,
        id: i64,
        user_id: i64,
        now: DateTime<Utc>,
        hold_days: i64,
    ) -> AppResult<(Reservation, Option<Reservation>)> {
        let mut tx = self.pool.begin().await?;

        let reservation = sqlx::query_as::<_, Reservation>(
            "SELECT * FROM reservations WHERE id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))?;

        if !reservation.status.is_active() {
            return Err(AppError::BusinessRule(
                "Only pending or ready reservations can be cancelled.".to_string(),
            ));
        }

        let cancelled = set_status(&mut *tx, reservation.id, ReservationStatus::Cancelled).await?;

        let promoted = match reservation.status {
            ReservationStatus::Pending => {
                close_gap(&mut *tx, reservation.book_id, reservation.queue_position).await?;
                None
            }
            _ => promote_next(&mut *tx, reservation.book_id, now, hold_days).await?,
        };

        tx.commit().await?;

        Ok((cancelled, promoted))
    }

    /// Expire READY holds whose pickup window has passed
    pub async fn expire_holds(&self, now: DateTime<Utc>, hold_days: i64) -> AppResult<Vec<ExpiredHold>> {
        let mut tx = self.pool.begin().await?;

        let lapsed = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT * FROM reservations
            WHERE status = 'READY' AND expiry_date < $1
            ORDER BY expiry_date
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        let mut result = Vec::with_capacity(lapsed.len());
        for reservation in lapsed {
            let expired = set_status(&mut *tx, reservation.id, ReservationStatus::Expired).await?;
            let promoted = promote_next(&mut *tx, reservation.book_id, now, hold_days).await?;
            result.push(ExpiredHold { expired, promoted });
        }

        tx.commit().await?;

        Ok(result)
    }
}

async fn set_status(conn: &mut PgConnection, id: i64, status: ReservationStatus) -> AppResult<Reservation> {
    let updated = sqlx::query_as::<_, Reservation>(
        "UPDATE reservations SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(status)
    .fetch_one(&mut *conn)
    .await?;
    Ok(updated)
}

/// Move every PENDING reservation behind `position` one place forward
async fn close_gap(conn: &mut PgConnection, book_id: i64, position: i32) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE reservations SET queue_position = queue_position - 1, updated_at = NOW()
        WHERE book_id = $1 AND status = 'PENDING' AND queue_position > $2
        "#,
    )
    .bind(book_id)
    .bind(position)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Give the hold on `book_id` to the head of its PENDING queue
pub(crate) async fn promote_next(
    conn: &mut PgConnection,
    book_id: i64,
    now: DateTime<Utc>,
    hold_days: i64,
) -> AppResult<Option<Reservation>> {
    let next = sqlx::query_as::<_, Reservation>(
        r#"
        SELECT * FROM reservations
        WHERE book_id = $1 AND status = 'PENDING'
        ORDER BY queue_position, reserved_date
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(book_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(next) = next else {
        return Ok(None);
    };

    let promoted = sqlx::query_as::<_, Reservation>(
        r#"
        UPDATE reservations
        SET status = $2, notified_date = $3, expiry_date = $4, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(next.id)
    .bind(ReservationStatus::Ready)
    .bind(now)
    .bind(hold_expiry(now, hold_days))
    .fetch_one(&mut *conn)
    .await?;

    close_gap(conn, book_id, next.queue_position).await?;

    Ok(Some(promoted))
}

/// Mark the member's own active reservation on a book as fulfilled
pub(crate) async fn fulfill_own(conn: &mut PgConnection, user_id: i64, book_id: i64) -> AppResult<Option<Reservation>> {
    let own = sqlx::query_as::<_, Reservation>(
        r#"
        SELECT * FROM reservations
        WHERE user_id = $1 AND book_id = $2 AND status IN ('PENDING', 'READY')
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .bind(book_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(own) = own else {
        return Ok(None);
    };

    let fulfilled = set_status(conn, own.id, ReservationStatus::Fulfilled).await?;
    if own.status == ReservationStatus::Pending {
        close_gap(conn, book_id, own.queue_position).await?;
    }

    Ok(Some(fulfilled))
}

/// Copies of a book held by READY reservations of other members
pub(crate) async fn holds_for_others(conn: &mut PgConnection, book_id: i64, user_id: i64) -> AppResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM reservations WHERE book_id = $1 AND status = 'READY' AND user_id != $2",
    )
    .bind(book_id)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}
