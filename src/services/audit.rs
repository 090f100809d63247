//! Audit trail service

use crate::{
    error::AppResult,
    logging::SECURITY_TARGET,
    models::audit::{AuditAction, AuditEntry, AuditLog, AuditQuery},
    repository::Repository,
};

#[derive(Clone)]
pub struct AuditService {
    repository: Repository,
    per_page: i64,
}

impl AuditService {
    pub fn new(repository: Repository, per_page: i64) -> Self {
        Self { repository, per_page }
    }

    pub fn per_page(&self) -> i64 {
        self.per_page
    }

    /// Persist an entry; security-relevant actions are also traced
    pub async fn record(&self, entry: AuditEntry) -> AppResult<()> {
        if entry.action == AuditAction::FailedLogin {
            tracing::warn!(
                target: SECURITY_TARGET,
                ip = entry.client.ip_address.as_deref().unwrap_or("-"),
                "{}",
                entry.details
            );
        } else {
            tracing::info!(
                target: SECURITY_TARGET,
                user_id = entry.user_id,
                action = %entry.action,
                object = %entry.object_repr,
                "{}",
                entry.details
            );
        }

        self.repository.audit_logs.insert(&entry).await?;
        Ok(())
    }

    pub async fn search(&self, query: &AuditQuery) -> AppResult<(Vec<AuditLog>, i64)> {
        self.repository.audit_logs.search(query, self.per_page).await
    }
}
