//! Audit log repository (insert and browse only)

use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::audit::{AuditEntry, AuditLog, AuditQuery},
};

use super::page_offset;

#[derive(Clone)]
pub struct AuditLogsRepository {
    pool: Pool<Postgres>,
}

impl AuditLogsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, entry: &AuditEntry) -> AppResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO audit_logs (
                user_id, action, model_name, object_id, object_repr, details, ip_address, user_agent
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.action)
        .bind(&entry.model_name)
        .bind(entry.object_id)
        .bind(&entry.object_repr)
        .bind(&entry.details)
        .bind(&entry.client.ip_address)
        .bind(&entry.client.user_agent)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Browse entries, newest first
    pub async fn search(&self, query: &AuditQuery, per_page: i64) -> AppResult<(Vec<AuditLog>, i64)> {
        let offset = page_offset(query.page, per_page)?;

        let action = query.action.map(|a| a.as_str().to_string());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM audit_logs
            WHERE ($1::TEXT IS NULL OR action = $1) AND ($2::BIGINT IS NULL OR user_id = $2)
            "#,
        )
        .bind(&action)
        .bind(query.user_id)
        .fetch_one(&self.pool)
        .await?;

        let entries = sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT a.id, a.user_id, u.email AS user_email, a.action, a.model_name, a.object_id,
                   a.object_repr, a.details, a.ip_address, a.user_agent, a.timestamp
            FROM audit_logs a
            LEFT JOIN users u ON a.user_id = u.id
            WHERE ($1::TEXT IS NULL OR a.action = $1) AND ($2::BIGINT IS NULL OR a.user_id = $2)
            ORDER BY a.timestamp DESC, a.id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(&action)
        .bind(query.user_id)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((entries, total))
    }
}
