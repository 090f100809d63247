//! Append-only audit trail of security-relevant events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

/// Longest user agent kept on an entry
pub const USER_AGENT_MAX: usize = 500;

text_enum! {
    pub enum AuditAction {
        Create => "CREATE",
        Update => "UPDATE",
        Delete => "DELETE",
        Login => "LOGIN",
        Logout => "LOGOUT",
        Borrow => "BORROW",
        Return => "RETURN",
        FailedLogin => "FAILED_LOGIN",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AuditLog {
    pub id: i64,
    pub user_id: Option<i64>,
    /// Email of the acting user, when still present
    pub user_email: Option<String>,
    pub action: AuditAction,
    pub model_name: String,
    pub object_id: Option<i64>,
    pub object_repr: String,
    pub details: String,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
}

/// Where a request came from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn new(ip_address: Option<String>, user_agent: &str) -> Self {
        Self {
            ip_address,
            user_agent: user_agent.chars().take(USER_AGENT_MAX).collect(),
        }
    }
}

/// A new audit entry
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub user_id: Option<i64>,
    pub action: AuditAction,
    pub model_name: String,
    pub object_id: Option<i64>,
    pub object_repr: String,
    pub details: String,
    pub client: ClientInfo,
}

impl AuditEntry {
    pub fn new(user_id: Option<i64>, action: AuditAction, client: &ClientInfo) -> Self {
        Self {
            user_id,
            action,
            model_name: String::new(),
            object_id: None,
            object_repr: String::new(),
            details: String::new(),
            client: client.clone(),
        }
    }

    /// Attach the affected object
    pub fn object(mut self, model_name: &str, object_id: i64, object_repr: impl Into<String>) -> Self {
        self.model_name = model_name.to_string();
        self.object_id = Some(object_id);
        self.object_repr = truncate(object_repr.into(), 200);
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }
}

fn truncate(value: String, max: usize) -> String {
    if value.chars().count() <= max {
        value
    } else {
        value.chars().take(max).collect()
    }
}

/// Audit log query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct AuditQuery {
    pub action: Option<AuditAction>,
    pub user_id: Option<i64>,
    pub page: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_is_truncated() {
        let long = "x".repeat(800);
        let client = ClientInfo::new(None, &long);
        assert_eq!(client.user_agent.len(), USER_AGENT_MAX);
    }

    #[test]
    fn entry_builder() {
        let client = ClientInfo::new(Some("10.0.0.1".into()), "curl/8");
        let entry = AuditEntry::new(Some(3), AuditAction::Borrow, &client)
            .object("Book", 9, "Dune by Frank Herbert")
            .details("Borrowed book: Dune");
        assert_eq!(entry.model_name, "Book");
        assert_eq!(entry.object_id, Some(9));
        assert_eq!(entry.details, "Borrowed book: Dune");
        assert_eq!(entry.client.ip_address.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn action_wire_names() {
        assert_eq!(AuditAction::FailedLogin.as_str(), "FAILED_LOGIN");
        assert_eq!("failed_login".parse::<AuditAction>().unwrap(), AuditAction::FailedLogin);
    }
}
