//! Accounts: registration, sessions, profiles and role administration

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    logging::SECURITY_TARGET,
    models::{
        audit::{AuditAction, AuditEntry, ClientInfo},
        user::{
            LoginRequest, NewUser, RegisterUser, Role, SessionClaims, UpdateProfile, User, UserQuery,
            UserSummary,
        },
    },
    repository::Repository,
    services::{audit::AuditService, redis::RedisService, uploads, uploads::UploadService},
    validation,
};

/// A freshly issued session
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub claims: SessionClaims,
    pub user: User,
}

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
    redis: RedisService,
    audit: AuditService,
    uploads: UploadService,
}

impl UsersService {
    pub fn new(
        repository: Repository,
        config: AuthConfig,
        redis: RedisService,
        audit: AuditService,
        uploads: UploadService,
    ) -> Self {
        Self {
            repository,
            config,
            redis,
            audit,
            uploads,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Register a new student account
    pub async fn register(&self, form: RegisterUser, client: &ClientInfo) -> AppResult<User> {
        form.validate_form()?;

        let email = validation::normalize_email(&form.email);
        if self.repository.users.email_exists(&email).await? {
            return Err(AppError::Conflict("A user with that email already exists.".to_string()));
        }

        let user = self
            .repository
            .users
            .create(&NewUser {
                email,
                password_hash: hash_password(&form.password1)?,
                first_name: form.first_name.trim().to_string(),
                last_name: form.last_name.trim().to_string(),
                student_id: form.student_id.unwrap_or_default().trim().to_string(),
                role: Role::Student,
            })
            .await?;

        self.audit
            .record(
                AuditEntry::new(Some(user.id), AuditAction::Create, client)
                    .object("User", user.id, user.repr())
                    .details("New user registered"),
            )
            .await?;

        Ok(user)
    }

    /// Check credentials and open a session
    pub async fn login(&self, request: &LoginRequest, client: &ClientInfo) -> AppResult<Session> {
        if let Err(errors) = request.validate() {
            let attempted: String = request.email.chars().take(254).collect();
            let entry = AuditEntry::new(None, AuditAction::FailedLogin, client)
                .details(format!("Failed login attempt with an invalid form for email: {}", attempted));
            // The caller gets the form errors even when the trail is unavailable
            if let Err(e) = self.audit.record(entry).await {
                tracing::error!("Failed to record failed login: {}", e);
            }
            return Err(errors.into());
        }

        let email = validation::normalize_email(&request.email);

        let failures = self.redis.failed_logins(&email).await?;
        if failures >= self.config.max_failed_logins {
            tracing::warn!(
                target: SECURITY_TARGET,
                ip = client.ip_address.as_deref().unwrap_or("-"),
                "Login blocked for {} after {} failed attempts",
                email,
                failures
            );
            return Err(AppError::TooManyRequests(format!(
                "Too many failed login attempts. Please try again in {} minutes.",
                self.config.lockout_minutes
            )));
        }

        let user = match self.repository.users.get_by_email(&email).await? {
            Some(user) if user.is_active && verify_password(&user.password, &request.password)? => user,
            _ => {
                self.redis
                    .record_failed_login(&email, self.config.lockout_minutes * 60)
                    .await?;
                self.audit
                    .record(
                        AuditEntry::new(None, AuditAction::FailedLogin, client)
                            .details(format!("Failed login attempt for email: {}", email)),
                    )
                    .await?;
                return Err(AppError::Authentication("Invalid email or password.".to_string()));
            }
        };

        self.redis.clear_failed_logins(&email).await?;
        self.repository.users.touch_last_login(user.id).await?;

        self.audit
            .record(
                AuditEntry::new(Some(user.id), AuditAction::Login, client)
                    .object("User", user.id, user.repr())
                    .details("User logged in successfully"),
            )
            .await?;

        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: user.id.to_string(),
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
            jti: Uuid::new_v4().simple().to_string(),
            csrf: csrf_token(),
            exp: now + self.config.session_seconds,
            iat: now,
        };

        let token = claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))?;

        Ok(Session { token, claims, user })
    }

    /// Close a session; its token stays refused until it expires
    pub async fn logout(&self, claims: &SessionClaims, client: &ClientInfo) -> AppResult<()> {
        self.audit
            .record(
                AuditEntry::new(Some(claims.user_id), AuditAction::Logout, client)
                    .details("User logged out"),
            )
            .await?;

        self.redis
            .revoke_token(&claims.jti, claims.remaining_seconds(Utc::now().timestamp()))
            .await
    }

    /// Validate a session token and check it was not revoked
    pub async fn verify_session(&self, token: &str) -> AppResult<SessionClaims> {
        let claims = SessionClaims::from_token(token, &self.config.jwt_secret)
            .map_err(|_| AppError::Authentication("Invalid or expired session".to_string()))?;

        if self.redis.is_token_revoked(&claims.jti).await? {
            return Err(AppError::Authentication("Session has been revoked".to_string()));
        }

        Ok(claims)
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i64) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    pub async fn update_profile(&self, user_id: i64, profile: UpdateProfile, client: &ClientInfo) -> AppResult<User> {
        let user = self.repository.users.update_profile(user_id, &profile).await?;

        self.audit
            .record(
                AuditEntry::new(Some(user.id), AuditAction::Update, client)
                    .object("User", user.id, user.repr())
                    .details("Profile updated"),
            )
            .await?;

        Ok(user)
    }

    /// Replace the member's profile picture
    pub async fn set_profile_picture(
        &self,
        user_id: i64,
        file_name: &str,
        data: &[u8],
        client: &ClientInfo,
    ) -> AppResult<User> {
        let stored = self
            .uploads
            .store_image(uploads::PROFILE_PICTURES, file_name, data)
            .await?;

        let previous = match self.repository.users.set_profile_picture(user_id, &stored).await {
            Ok(previous) => previous,
            Err(e) => {
                self.uploads.remove(&stored).await;
                return Err(e);
            }
        };
        if let Some(previous) = previous {
            self.uploads.remove(&previous).await;
        }

        let user = self.repository.users.get_by_id(user_id).await?;
        self.audit
            .record(
                AuditEntry::new(Some(user.id), AuditAction::Update, client)
                    .object("User", user.id, user.repr())
                    .details("Profile picture updated"),
            )
            .await?;

        Ok(user)
    }

    /// Search users
    pub async fn search_users(&self, query: &UserQuery) -> AppResult<(Vec<UserSummary>, i64)> {
        self.repository.users.search(query).await
    }

    /// Change another account's role
    pub async fn change_role(&self, admin: &SessionClaims, user_id: i64, role: Role, client: &ClientInfo) -> AppResult<User> {
        if admin.user_id == user_id {
            return Err(AppError::BusinessRule("You cannot change your own role.".to_string()));
        }

        let before = self.repository.users.get_by_id(user_id).await?;
        let user = self.repository.users.set_role(user_id, role).await?;

        self.audit
            .record(
                AuditEntry::new(Some(admin.user_id), AuditAction::Update, client)
                    .object("User", user.id, user.repr())
                    .details(format!(
                        "Role changed from {} to {}",
                        before.role.label(),
                        user.role.label()
                    )),
            )
            .await?;

        Ok(user)
    }

    /// Activate or deactivate another account
    pub async fn set_active(&self, admin: &SessionClaims, user_id: i64, is_active: bool, client: &ClientInfo) -> AppResult<User> {
        if admin.user_id == user_id && !is_active {
            return Err(AppError::BusinessRule("You cannot deactivate your own account.".to_string()));
        }

        let user = self.repository.users.set_active(user_id, is_active).await?;

        self.audit
            .record(
                AuditEntry::new(Some(admin.user_id), AuditAction::Update, client)
                    .object("User", user.id, user.repr())
                    .details(if is_active { "Account activated" } else { "Account deactivated" }),
            )
            .await?;

        Ok(user)
    }

    /// Create the configured administrator account if it does not exist yet
    pub async fn ensure_bootstrap_admin(&self) -> AppResult<()> {
        let (Some(email), Some(password)) = (
            self.config.bootstrap_admin_email.as_deref(),
            self.config.bootstrap_admin_password.as_deref(),
        ) else {
            return Ok(());
        };

        let email = validation::normalize_email(email);
        if self.repository.users.email_exists(&email).await? {
            return Ok(());
        }

        let admin = self
            .repository
            .users
            .create(&NewUser {
                email,
                password_hash: hash_password(password)?,
                first_name: "Library".to_string(),
                last_name: "Administrator".to_string(),
                student_id: String::new(),
                role: Role::Admin,
            })
            .await?;

        tracing::info!("Created bootstrap administrator {}", admin.email);
        Ok(())
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

pub fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn csrf_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("quiet-Harbor-77").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "quiet-Harbor-77").unwrap());
        assert!(!verify_password(&hash, "quiet-harbor-77").unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("plaintext", "plaintext").is_err());
    }

    #[test]
    fn csrf_tokens_are_unique() {
        let a = csrf_token();
        assert_eq!(a.len(), 32);
        assert_ne!(a, csrf_token());
    }
}
