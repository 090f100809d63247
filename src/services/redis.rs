//! Redis service for revoked sessions and login throttling

use redis::{AsyncCommands, Client};

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct RedisService {
    client: Client,
}

impl RedisService {
    /// Create a new Redis service. No connection is made until first use.
    pub fn new(url: &str) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;

        Ok(Self { client })
    }

    /// Round-trip a PING
    pub async fn ping(&self) -> AppResult<()> {
        let mut conn = self.get_connection().await?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection test failed: {}", e)))?;

        Ok(())
    }

    /// Refuse a session token id until it would have expired anyway
    pub async fn revoke_token(&self, jti: &str, ttl_seconds: u64) -> AppResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }

        let mut conn = self.get_connection().await?;

        let key = format!("session:revoked:{}", jti);
        conn.set_ex::<_, _, ()>(&key, "1", ttl_seconds)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to revoke session in Redis: {}", e)))?;

        Ok(())
    }

    pub async fn is_token_revoked(&self, jti: &str) -> AppResult<bool> {
        let mut conn = self.get_connection().await?;

        let key = format!("session:revoked:{}", jti);
        let exists: bool = conn
            .exists(&key)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to check session in Redis: {}", e)))?;

        Ok(exists)
    }

    /// Failed login attempts recorded for an email in the current window
    pub async fn failed_logins(&self, email: &str) -> AppResult<u32> {
        let mut conn = self.get_connection().await?;

        let count: Option<u32> = conn
            .get(failed_login_key(email))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read login attempts from Redis: {}", e)))?;

        Ok(count.unwrap_or(0))
    }

    /// Count a failed login; the window starts at the first failure
    pub async fn record_failed_login(&self, email: &str, window_seconds: u64) -> AppResult<u32> {
        let mut conn = self.get_connection().await?;

        let key = failed_login_key(email);
        let count: u32 = conn
            .incr(&key, 1)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to count login attempt in Redis: {}", e)))?;

        if count == 1 {
            conn.expire::<_, ()>(&key, window_seconds as i64)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to set lockout window in Redis: {}", e)))?;
        }

        Ok(count)
    }

    pub async fn clear_failed_logins(&self, email: &str) -> AppResult<()> {
        let mut conn = self.get_connection().await?;

        conn.del::<_, ()>(failed_login_key(email))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to reset login attempts in Redis: {}", e)))?;

        Ok(())
    }

    /// Get a Redis connection (for advanced operations)
    pub async fn get_connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get Redis connection: {}", e)))
    }
}

fn failed_login_key(email: &str) -> String {
    format!("login:failures:{}", email.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_key_ignores_case() {
        assert_eq!(failed_login_key("Reader@Library.TEST"), "login:failures:reader@library.test");
    }

    #[test]
    fn client_creation_does_not_connect() {
        assert!(RedisService::new("redis://127.0.0.1:1/").is_ok());
        assert!(RedisService::new("not a url").is_err());
    }
}
