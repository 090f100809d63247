//! Fines repository

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::fine::{Fine, FineStatus},
};

#[derive(Clone)]
pub struct FinesRepository {
    pool: Pool<Postgres>,
}

impl FinesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// All fines of a member, newest first
    pub async fn list_for_user(&self, user_id: i64) -> AppResult<Vec<Fine>> {
        let fines = sqlx::query_as::<_, Fine>(
            "SELECT * FROM fines WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(fines)
    }

    pub async fn list_pending_for_user(&self, user_id: i64) -> AppResult<Vec<Fine>> {
        let fines = sqlx::query_as::<_, Fine>(
            "SELECT * FROM fines WHERE user_id = $1 AND status = 'PENDING' ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(fines)
    }

    /// Settle a pending fine; the paid amount defaults to the full fine
    pub async fn pay(&self, id: i64, amount: Option<Decimal>, now: DateTime<Utc>) -> AppResult<Fine> {
        let mut tx = self.pool.begin().await?;

        let fine = lock_pending(&mut tx, id).await?;
        let paid_amount = amount.unwrap_or(fine.amount);

        let paid = sqlx::query_as::<_, Fine>(
            r#"
            UPDATE fines SET status = $2, paid_date = $3, paid_amount = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(FineStatus::Paid)
        .bind(now)
        .bind(paid_amount)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(paid)
    }

    pub async fn waive(&self, id: i64, waived_by: i64, reason: &str) -> AppResult<Fine> {
        let mut tx = self.pool.begin().await?;

        lock_pending(&mut tx, id).await?;

        let waived = sqlx::query_as::<_, Fine>(
            r#"
            UPDATE fines SET status = $2, waived_by = $3, waiver_reason = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(FineStatus::Waived)
        .bind(waived_by)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(waived)
    }
}

async fn lock_pending(tx: &mut sqlx::Transaction<'_, Postgres>, id: i64) -> AppResult<Fine> {
    let fine = sqlx::query_as::<_, Fine>("SELECT * FROM fines WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Fine with id {} not found", id)))?;

    if fine.status != FineStatus::Pending {
        return Err(AppError::BusinessRule(format!(
            "Fine is already {}.",
            fine.status.as_str().to_lowercase()
        )));
    }

    Ok(fine)
}
