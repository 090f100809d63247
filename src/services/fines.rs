//! Fines service

use chrono::Utc;
use rust_decimal::Decimal;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        audit::{AuditAction, AuditEntry, ClientInfo},
        fine::{Fine, PayFine, WaiveFine},
        user::SessionClaims,
    },
    repository::Repository,
    services::audit::AuditService,
};

#[derive(Clone)]
pub struct FinesService {
    repository: Repository,
    audit: AuditService,
}

impl FinesService {
    pub fn new(repository: Repository, audit: AuditService) -> Self {
        Self { repository, audit }
    }

    pub async fn list_for_user(&self, user_id: i64) -> AppResult<Vec<Fine>> {
        self.repository.fines.list_for_user(user_id).await
    }

    /// Record payment of a pending fine
    pub async fn pay(&self, claims: &SessionClaims, id: i64, payment: PayFine, client: &ClientInfo) -> AppResult<Fine> {
        if let Some(amount) = payment.amount {
            if amount <= Decimal::ZERO {
                return Err(AppError::Validation("Payment amount must be positive.".to_string()));
            }
        }

        let fine = self.repository.fines.pay(id, payment.amount, Utc::now()).await?;

        self.audit
            .record(
                AuditEntry::new(Some(claims.user_id), AuditAction::Update, client)
                    .object("Fine", fine.id, format!("Fine {} ({})", fine.id, fine.amount))
                    .details(format!(
                        "Fine paid: {}",
                        fine.paid_amount.unwrap_or(fine.amount)
                    )),
            )
            .await?;

        Ok(fine)
    }

    /// Waive a pending fine
    pub async fn waive(&self, claims: &SessionClaims, id: i64, waiver: WaiveFine, client: &ClientInfo) -> AppResult<Fine> {
        waiver.validate()?;

        let reason = waiver.reason.unwrap_or_default();
        let fine = self.repository.fines.waive(id, claims.user_id, reason.trim()).await?;

        self.audit
            .record(
                AuditEntry::new(Some(claims.user_id), AuditAction::Update, client)
                    .object("Fine", fine.id, format!("Fine {} ({})", fine.id, fine.amount))
                    .details(format!("Fine waived: {}", reason.trim())),
            )
            .await?;

        Ok(fine)
    }
}
