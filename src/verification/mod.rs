/// Signup verification codes
///
/// A six-digit code is bound to an email address together with the pending
/// signup (name and password hash). The code is valid for a fixed window and
/// can be exchanged for the signup exactly once.

pub mod cache;

pub use cache::{CodeCache, MemoryCodeCache, RedisCodeCache};

use crate::{metrics, store::keys::normalize_email};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Default code lifetime
pub const DEFAULT_CODE_TTL_SECS: u64 = 10 * 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("No pending verification for this email")]
    NotFound,

    #[error("Verification code expired")]
    Expired,

    #[error("Verification code does not match")]
    Mismatch,

    #[error("Verification cache error: {0}")]
    Cache(String),
}

impl VerificationError {
    fn label(&self) -> &'static str {
        match self {
            VerificationError::NotFound => "not_found",
            VerificationError::Expired => "expired",
            VerificationError::Mismatch => "mismatch",
            VerificationError::Cache(_) => "cache_error",
        }
    }
}

/// Cached entry for one email
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingVerification {
    pub code: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl PendingVerification {
    /// Expired strictly after `expires_at`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Signup payload handed back on successful redemption
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSignup {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

/// Uniform code in 100000..=999999
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

pub struct VerificationStore {
    cache: Arc<dyn CodeCache>,
    ttl: chrono::Duration,
}

impl VerificationStore {
    pub fn new(cache: Arc<dyn CodeCache>, ttl_secs: u64) -> Self {
        Self {
            cache,
            ttl: chrono::Duration::seconds(ttl_secs as i64),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.cache.backend_name()
    }

    /// Issue a code for `email`, replacing any pending one
    pub async fn issue(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
    ) -> Result<String, VerificationError> {
        self.issue_at(email, name, password_hash, Utc::now()).await
    }

    pub async fn issue_at(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<String, VerificationError> {
        let email = normalize_email(email);
        let code = generate_code();

        let entry = PendingVerification {
            code: code.clone(),
            email: email.clone(),
            name: name.to_string(),
            password_hash: password_hash.to_string(),
            expires_at: now + self.ttl,
        };

        let ttl = self.ttl.to_std().unwrap_or_default();
        self.cache.put(&email, &entry, ttl).await?;

        metrics::record_verification("issued");
        debug!("Issued verification code for {}", email);
        Ok(code)
    }

    /// Exchange a code for the pending signup
    pub async fn redeem(&self, email: &str, code: &str) -> Result<PendingSignup, VerificationError> {
        self.redeem_at(email, code, Utc::now()).await
    }

    pub async fn redeem_at(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<PendingSignup, VerificationError> {
        let result = self.try_redeem(&normalize_email(email), code.trim(), now).await;
        match &result {
            Ok(_) => metrics::record_verification("redeemed"),
            Err(e) => metrics::record_verification(e.label()),
        }
        result
    }

    async fn try_redeem(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<PendingSignup, VerificationError> {
        let entry = self
            .cache
            .get(email)
            .await?
            .ok_or(VerificationError::NotFound)?;

        if entry.is_expired(now) {
            self.cache.remove(email, &entry.code).await?;
            return Err(VerificationError::Expired);
        }

        if entry.code != code {
            return Err(VerificationError::Mismatch);
        }

        // A concurrent redemption may have taken it first
        if !self.cache.remove(email, code).await? {
            return Err(VerificationError::NotFound);
        }

        Ok(PendingSignup {
            email: entry.email,
            name: entry.name,
            password_hash: entry.password_hash,
        })
    }

    /// Remove expired entries
    pub async fn sweep(&self) -> Result<usize, VerificationError> {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize, VerificationError> {
        let removed = self.cache.sweep(now).await?;
        if removed > 0 {
            info!("Swept {} expired verification code(s)", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> VerificationStore {
        VerificationStore::new(Arc::new(MemoryCodeCache::new()), DEFAULT_CODE_TTL_SECS)
    }

    #[test]
    fn test_generate_code_range() {
        for _ in 0..1000 {
            let code: u32 = generate_code().parse().unwrap();
            assert!((100_000..=999_999).contains(&code));
        }
    }

    #[tokio::test]
    async fn test_mismatch_keeps_entry() {
        let store = store();
        let code = store.issue("a@example.com", "Ann", "hash").await.unwrap();
        let wrong = if code == "123456" { "654321" } else { "123456" };

        assert_eq!(
            store.redeem("a@example.com", wrong).await.unwrap_err(),
            VerificationError::Mismatch
        );
        assert!(store.redeem("a@example.com", &code).await.is_ok());
    }

    #[tokio::test]
    async fn test_email_is_normalized() {
        let store = store();
        let code = store.issue(" Ann@Example.com", "Ann", "hash").await.unwrap();
        let signup = store.redeem("ann@example.com", &code).await.unwrap();
        assert_eq!(signup.email, "ann@example.com");
        assert_eq!(signup.password_hash, "hash");
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let cache = Arc::new(MemoryCodeCache::new());
        let store = VerificationStore::new(cache.clone(), DEFAULT_CODE_TTL_SECS);
        let now = Utc::now();

        store.issue_at("old@example.com", "Old", "h", now).await.unwrap();
        store
            .issue_at("new@example.com", "New", "h", now + chrono::Duration::minutes(8))
            .await
            .unwrap();

        let removed = store
            .sweep_at(now + chrono::Duration::minutes(11))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(cache.len().await, 1);
    }
}
