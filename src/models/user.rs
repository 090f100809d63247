//! User model, roles and session claims

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{error::AppError, validation};

text_enum! {
    /// Account role used for access control
    pub enum Role {
        Admin => "ADMIN",
        Librarian => "LIBRARIAN",
        Student => "STUDENT",
    }
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::Admin => "Administrator",
            Role::Librarian => "Librarian",
            Role::Student => "Student",
        }
    }

    /// Create, edit and delete books and categories; process returns and fines
    pub fn can_manage_books(&self) -> bool {
        matches!(self, Role::Admin | Role::Librarian)
    }

    /// Change roles and activation of other accounts
    pub fn can_manage_users(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn can_view_audit_log(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Student
    }
}

/// Full user model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i64,
    pub email: String,
    /// Hashed password (argon2)
    #[serde(skip_serializing)]
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_active: bool,
    pub is_email_verified: bool,
    pub phone_number: String,
    pub address: String,
    pub student_id: String,
    pub profile_picture: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Display form used in audit entries
    pub fn repr(&self) -> String {
        format!("{} ({})", self.full_name(), self.email)
    }
}

/// Short user representation for lists
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserSummary {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_active: bool,
    pub student_id: String,
    pub created_at: DateTime<Utc>,
    /// Currently borrowed books
    pub active_borrows: i64,
}

/// User query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct UserQuery {
    /// Matches email, first/last name or student id
    pub search: Option<String>,
    pub role: Option<Role>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Registration form
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterUser {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(min = 1, max = 50, message = "First name is required (max 50 characters)."))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50, message = "Last name is required (max 50 characters)."))]
    pub last_name: String,
    #[validate(length(max = 20, message = "Student ID must be at most 20 characters."))]
    pub student_id: Option<String>,
    #[validate(custom(function = "validation::validate_password_strength"))]
    pub password1: String,
    pub password2: String,
}

impl RegisterUser {
    /// Field rules plus the cross-field password checks
    pub fn validate_form(&self) -> Result<(), AppError> {
        let mut errors = match self.validate() {
            Ok(()) => validator::ValidationErrors::new(),
            Err(errors) => errors,
        };

        if self.password1 != self.password2 {
            let mut err = validator::ValidationError::new("password_mismatch");
            err.message = Some("The two password fields didn't match.".into());
            errors.add("password2", err);
        }

        let local_part = self.email.split('@').next().unwrap_or_default();
        if let Err(err) = validation::validate_password_similarity(
            &self.password1,
            &[local_part, &self.first_name, &self.last_name],
        ) {
            errors.add("password1", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Fields(errors))
        }
    }
}

/// Internal create command (registration or bootstrap)
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub student_id: String,
    pub role: Role,
}

/// Login form
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

/// Update own profile request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfile {
    #[validate(length(min = 1, max = 50, message = "First name must be 1-50 characters."))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 50, message = "Last name must be 1-50 characters."))]
    pub last_name: Option<String>,
    #[validate(
        length(max = 15, message = "Phone number must be at most 15 characters."),
        custom(function = "validation::validate_phone")
    )]
    pub phone_number: Option<String>,
    #[validate(length(max = 500, message = "Address must be at most 500 characters."))]
    pub address: Option<String>,
    #[validate(length(max = 20, message = "Student ID must be at most 20 characters."))]
    pub student_id: Option<String>,
}

/// Role change request (admin only)
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRole {
    pub role: Role,
}

/// Activation change request (admin only)
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateActive {
    pub is_active: bool,
}

/// JWT claims carried by the session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub user_id: i64,
    pub email: String,
    pub role: Role,
    /// Token id, used for revocation on logout
    pub jti: String,
    /// Double-submit CSRF token for cookie sessions
    pub csrf: String,
    pub exp: i64,
    pub iat: i64,
}

impl SessionClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn require_manage_books(&self) -> Result<(), AppError> {
        if self.role.can_manage_books() {
            Ok(())
        } else {
            Err(AppError::Authorization("Librarian privileges required".to_string()))
        }
    }

    pub fn require_manage_users(&self) -> Result<(), AppError> {
        if self.role.can_manage_users() {
            Ok(())
        } else {
            Err(AppError::Authorization("Administrator privileges required".to_string()))
        }
    }

    /// Seconds until the token expires (never negative)
    pub fn remaining_seconds(&self, now: i64) -> u64 {
        (self.exp - now).max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role) -> SessionClaims {
        let now = Utc::now().timestamp();
        SessionClaims {
            sub: "7".to_string(),
            user_id: 7,
            email: "reader@library.test".to_string(),
            role,
            jti: "jti-1".to_string(),
            csrf: "csrf-1".to_string(),
            exp: now + 3600,
            iat: now,
        }
    }

    #[test]
    fn role_permissions() {
        assert!(Role::Admin.can_manage_books());
        assert!(Role::Librarian.can_manage_books());
        assert!(!Role::Student.can_manage_books());
        assert!(Role::Admin.can_manage_users());
        assert!(!Role::Librarian.can_manage_users());
        assert!(Role::Admin.can_view_audit_log());
        assert!(!Role::Librarian.can_view_audit_log());
        assert_eq!(Role::default(), Role::Student);
    }

    #[test]
    fn role_text_roundtrip() {
        assert_eq!("librarian".parse::<Role>().unwrap(), Role::Librarian);
        assert_eq!(Role::Admin.to_string(), "ADMIN");
        assert!("janitor".parse::<Role>().is_err());
        assert_eq!(serde_json::to_string(&Role::Student).unwrap(), "\"STUDENT\"");
    }

    #[test]
    fn token_roundtrip() {
        let original = claims(Role::Librarian);
        let token = original.create_token("secret").unwrap();
        let parsed = SessionClaims::from_token(&token, "secret").unwrap();
        assert_eq!(parsed.user_id, 7);
        assert_eq!(parsed.role, Role::Librarian);
        assert_eq!(parsed.csrf, "csrf-1");
        assert!(SessionClaims::from_token(&token, "other-secret").is_err());
    }

    #[test]
    fn expired_token_rejected() {
        let mut expired = claims(Role::Student);
        expired.exp = Utc::now().timestamp() - 3600;
        let token = expired.create_token("secret").unwrap();
        assert!(SessionClaims::from_token(&token, "secret").is_err());
    }

    #[test]
    fn role_checks() {
        assert!(claims(Role::Student).require_manage_books().is_err());
        assert!(claims(Role::Librarian).require_manage_books().is_ok());
        assert!(claims(Role::Librarian).require_manage_users().is_err());
    }

    #[test]
    fn registration_cross_field_checks() {
        let form = RegisterUser {
            email: "maria@uni.test".to_string(),
            first_name: "Maria".to_string(),
            last_name: "Lopez".to_string(),
            student_id: None,
            password1: "quiet-Harbor-77".to_string(),
            password2: "quiet-Harbor-78".to_string(),
        };
        let err = form.validate_form().unwrap_err();
        match err {
            AppError::Fields(errors) => {
                assert!(errors.field_errors().contains_key("password2"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let similar = RegisterUser {
            password1: "maria-2024!".to_string(),
            password2: "maria-2024!".to_string(),
            ..form
        };
        assert!(similar.validate_form().is_err());
    }
}
