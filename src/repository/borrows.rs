//! Borrow records repository: lending and returning copies

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::Book,
        borrow::{due_date_for, BorrowDetails, BorrowRecord, BorrowStatus},
        fine::{Fine, FineStatus},
        reservation::Reservation,
    },
    repository::reservations,
};

/// Circulation limits applied when lending
#[derive(Debug, Clone, Copy)]
pub struct LendingRules {
    pub max_books_per_user: i64,
    pub borrow_period_days: i64,
}

/// Limits applied when a copy comes back
#[derive(Debug, Clone, Copy)]
pub struct ReturnRules {
    pub fine_per_day: Decimal,
    pub hold_days: i64,
}

/// Everything a return changed
#[derive(Debug, Clone)]
pub struct ReturnOutcome {
    pub record: BorrowRecord,
    pub book: Book,
    pub fine: Option<Fine>,
    pub promoted: Option<Reservation>,
}

#[derive(Clone)]
pub struct BorrowsRepository {
    pool: Pool<Postgres>,
}

impl BorrowsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Whether the member currently holds a copy of the book
    pub async fn has_open(&self, user_id: i64, book_id: i64) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM borrow_records
                WHERE user_id = $1 AND book_id = $2 AND status IN ('ACTIVE', 'OVERDUE')
            )
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Open (ACTIVE or OVERDUE) records of a member, soonest due first
    pub async fn list_open_for_user(&self, user_id: i64) -> AppResult<Vec<BorrowDetails>> {
        let records = sqlx::query_as::<_, BorrowDetails>(
            r#"
            SELECT r.id, r.book_id, b.title AS book_title, b.author AS book_author, r.user_id,
                   r.borrowed_date, r.due_date, r.returned_date, r.status
            FROM borrow_records r
            JOIN books b ON r.book_id = b.id
            WHERE r.user_id = $1 AND r.status IN ('ACTIVE', 'OVERDUE')
            ORDER BY r.due_date
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Most recently returned records of a member
    pub async fn list_returned_for_user(&self, user_id: i64, limit: i64) -> AppResult<Vec<BorrowDetails>> {
        let records = sqlx::query_as::<_, BorrowDetails>(
            r#"
            SELECT r.id, r.book_id, b.title AS book_title, b.author AS book_author, r.user_id,
                   r.borrowed_date, r.due_date, r.returned_date, r.status
            FROM borrow_records r
            JOIN books b ON r.book_id = b.id
            WHERE r.user_id = $1 AND r.status = 'RETURNED'
            ORDER BY r.returned_date DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Lend one copy of a book to a member
    pub async fn borrow(
        &self,
        user_id: i64,
        book_id: i64,
        rules: LendingRules,
        now: DateTime<Utc>,
    ) -> AppResult<(BorrowRecord, Book)> {
        let mut tx = self.pool.begin().await?;

        // Serializes one member's borrows so the open count below stays true
        sqlx::query("SELECT 1 FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))?;

        let mut book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(book_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

        let open: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrow_records WHERE user_id = $1 AND status IN ('ACTIVE', 'OVERDUE')",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        if open >= rules.max_books_per_user {
            return Err(AppError::BusinessRule(format!(
                "You cannot borrow more than {} books at a time.",
                rules.max_books_per_user
            )));
        }

        let held = reservations::holds_for_others(&mut *tx, book_id, user_id).await?;
        if book.lendable_copies(held) <= 0 {
            return Err(AppError::NotAvailable(
                "This book is not available for borrowing.".to_string(),
            ));
        }

        let already: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM borrow_records
                WHERE user_id = $1 AND book_id = $2 AND status IN ('ACTIVE', 'OVERDUE')
            )
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&mut *tx)
        .await?;

        if already {
            return Err(AppError::Conflict("You have already borrowed this book.".to_string()));
        }

        if !book.borrow() {
            return Err(AppError::NotAvailable(
                "This book is not available for borrowing.".to_string(),
            ));
        }

        let record = sqlx::query_as::<_, BorrowRecord>(
            r#"
            INSERT INTO borrow_records (user_id, book_id, borrowed_date, due_date, status, issued_by)
            VALUES ($1, $2, $3, $4, $5, $1)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(now)
        .bind(due_date_for(now, rules.borrow_period_days))
        .bind(BorrowStatus::Active)
        .fetch_one(&mut *tx)
        .await?;

        let book = update_copies(&mut tx, &book).await?;
        reservations::fulfill_own(&mut *tx, user_id, book_id).await?;

        tx.commit().await?;

        Ok((record, book))
    }

    /// Take back a copy. `staff_id` is set when a librarian processes the return.
    pub async fn return_record(
        &self,
        record_id: i64,
        caller_id: i64,
        staff_id: Option<i64>,
        rules: ReturnRules,
        now: DateTime<Utc>,
    ) -> AppResult<ReturnOutcome> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, BorrowRecord>(
            r#"
            SELECT * FROM borrow_records
            WHERE id = $1 AND status IN ('ACTIVE', 'OVERDUE') AND ($2::BIGINT IS NOT NULL OR user_id = $3)
            FOR UPDATE
            "#,
        )
        .bind(record_id)
        .bind(staff_id)
        .bind(caller_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Borrow record with id {} not found", record_id)))?;

        let mut book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(record.book_id)
            .fetch_one(&mut *tx)
            .await?;

        let amount = record.fine_at(now, rules.fine_per_day);

        let returned = sqlx::query_as::<_, BorrowRecord>(
            r#"
            UPDATE borrow_records SET status = $2, returned_date = $3, returned_to = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(record.id)
        .bind(BorrowStatus::Returned)
        .bind(now)
        .bind(staff_id)
        .fetch_one(&mut *tx)
        .await?;

        book.return_copy();
        let book = update_copies(&mut tx, &book).await?;

        let fine = if amount > Decimal::ZERO {
            let fine = sqlx::query_as::<_, Fine>(
                r#"
                INSERT INTO fines (borrow_record_id, user_id, amount, status)
                VALUES ($1, $2, $3, $4)
                RETURNING *
                "#,
            )
            .bind(record.id)
            .bind(record.user_id)
            .bind(amount)
            .bind(FineStatus::Pending)
            .fetch_one(&mut *tx)
            .await?;
            Some(fine)
        } else {
            None
        };

        let promoted = reservations::promote_next(&mut *tx, book.id, now, rules.hold_days).await?;

        tx.commit().await?;

        Ok(ReturnOutcome {
            record: returned,
            book,
            fine,
            promoted,
        })
    }

    /// Flag ACTIVE records past their due date as OVERDUE
    pub async fn mark_overdue(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE borrow_records SET status = 'OVERDUE' WHERE status = 'ACTIVE' AND due_date < $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

async fn update_copies(tx: &mut sqlx::Transaction<'_, Postgres>, book: &Book) -> AppResult<Book> {
    let updated = sqlx::query_as::<_, Book>(
        r#"
        UPDATE books SET available_copies = $2, status = $3, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(book.id)
    .bind(book.available_copies)
    .bind(book.status)
    .fetch_one(&mut **tx)
    .await?;
    Ok(updated)
}
