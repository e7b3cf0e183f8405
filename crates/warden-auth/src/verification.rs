//! One-time code verification flow.
//!
//! Pairs the stateless [`OtpGenerator`] with an [`OtpStore`] so that each
//! issued code can be confirmed once, and with the verification rate limit
//! bucket to bound guessing.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::otp::OtpGenerator;
use crate::rate_limit::{RateLimitCategory, RateLimiter};
use crate::storage::{OtpRecord, OtpStore};

/// Sends a code to the owner of `key` (SMS, e-mail, ...).
#[async_trait]
pub trait OtpDelivery: Send + Sync {
    /// Deliver `code` to `key`.
    async fn deliver(&self, key: &str, code: &str) -> AuthResult<()>;
}

/// Issues and confirms one-time codes.
pub struct OtpVerificationService {
    generator: OtpGenerator,
    salt: String,
    store: Arc<dyn OtpStore>,
    delivery: Arc<dyn OtpDelivery>,
    limiter: Arc<RateLimiter>,
}

impl OtpVerificationService {
    #[must_use]
    pub fn new(
        generator: OtpGenerator,
        salt: impl Into<String>,
        store: Arc<dyn OtpStore>,
        delivery: Arc<dyn OtpDelivery>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            generator,
            salt: salt.into(),
            store,
            delivery,
            limiter,
        }
    }

    /// Generates a code for `key`, records it as pending and delivers it.
    ///
    /// Returns the verification reference of the new record.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::RateLimited` when the verification bucket for
    /// `key` is exhausted, or the store/delivery error.
    pub async fn request_code(&self, key: &str) -> AuthResult<String> {
        self.limiter.consume(RateLimitCategory::Verification, key)?;
        self.issue_code(key).await
    }

    /// [`Self::request_code`] for callers that already took the
    /// verification point for `key`.
    pub(crate) async fn issue_code(&self, key: &str) -> AuthResult<String> {
        let now = OffsetDateTime::now_utc();
        let code = self.generator.generate_at(key, &self.salt, now.unix_timestamp());
        let record = OtpRecord {
            id: Uuid::new_v4(),
            key: key.to_string(),
            code: None,
            reference: Uuid::new_v4().to_string(),
            expires_at: now + self.generator.time_step() * 2,
            verified: false,
            created_at: now,
        };

        self.store.save(&record).await?;
        self.delivery.deliver(key, &code).await?;

        tracing::info!(record_id = %record.id, "Verification code issued");
        Ok(record.reference)
    }

    /// Confirms `code` against the latest pending record for `key`.
    ///
    /// Returns `false` if there is no pending record, the code does not
    /// match, or the record was confirmed by a concurrent call.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::RateLimited` when the verification bucket for
    /// `key` is exhausted, or the store error.
    pub async fn confirm_code(&self, key: &str, code: &str) -> AuthResult<bool> {
        self.limiter.consume(RateLimitCategory::Verification, key)?;
        self.confirm_pending(key, code).await
    }

    /// [`Self::confirm_code`] without taking a verification point.
    pub(crate) async fn confirm_pending(&self, key: &str, code: &str) -> AuthResult<bool> {
        let now = OffsetDateTime::now_utc();
        let Some(record) = self.store.find_pending(key, now).await? else {
            tracing::debug!("No pending verification record");
            return Ok(false);
        };

        if !self
            .generator
            .verify_at(key, &self.salt, code, now.unix_timestamp())
        {
            tracing::warn!(record_id = %record.id, "Verification code mismatch");
            return Ok(false);
        }

        let confirmed = self.store.mark_verified(record.id).await?;
        if confirmed {
            tracing::debug!(record_id = %record.id, "Verification code confirmed");
        }
        Ok(confirmed)
    }

    /// Deletes records that can no longer be confirmed.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn purge_settled(&self) -> AuthResult<u64> {
        self.store.purge_settled(OffsetDateTime::now_utc()).await
    }
}
