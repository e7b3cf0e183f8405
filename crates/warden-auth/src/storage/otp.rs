//! One-time password record storage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;

/// A pending or confirmed verification request.
///
/// The code itself is recomputed from the key and the time window, so
/// `code` stays `None` for generator-backed records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpRecord {
    /// Record identifier.
    pub id: Uuid,

    /// Mobile number or email the code was sent to.
    pub key: String,

    /// Stored code, for schemes that do not recompute it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Opaque reference handed back to the client.
    pub reference: String,

    /// After this instant the record can no longer be confirmed.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Set once the code has been confirmed.
    pub verified: bool,

    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl OtpRecord {
    /// Returns `true` if the record can still be confirmed at `now`.
    #[must_use]
    pub fn is_pending_at(&self, now: OffsetDateTime) -> bool {
        !self.verified && now < self.expires_at
    }
}

/// Storage trait for OTP records.
#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Persists a new record.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn save(&self, record: &OtpRecord) -> AuthResult<()>;

    /// Finds the pending record for `key` with the latest expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_pending(&self, key: &str, now: OffsetDateTime) -> AuthResult<Option<OtpRecord>>;

    /// Marks a record verified.
    ///
    /// # Returns
    ///
    /// Returns `true` only for the call that flipped the flag. Concurrent
    /// confirmations of the same record must see exactly one `true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn mark_verified(&self, id: Uuid) -> AuthResult<bool>;

    /// Deletes records that are verified or past expiry at `now`.
    ///
    /// Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn purge_settled(&self, now: OffsetDateTime) -> AuthResult<u64>;
}
