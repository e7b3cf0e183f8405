//! Session storage trait.
//!
//! This module defines the persistence interface for [`Session`] records.
//!
//! # Implementation Notes
//!
//! Implementations should:
//!
//! - Never physically delete sessions; revocation is a state transition
//! - Make [`SessionStore::advance_version`] a compare-and-swap on
//!   `token_version`
//! - Make every revocation idempotent so sweeps can overlap with requests

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::session::Session;

/// Storage trait for sessions.
///
/// # Implementations
///
/// Implementations are provided for:
/// - In-memory (in `warden-auth-memory` crate)
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists a new session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be stored (e.g., duplicate id,
    /// storage unavailable).
    async fn create(&self, session: &Session) -> AuthResult<()>;

    /// Finds a session by its ID, regardless of its revocation status.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Session>>;

    /// Lists the sessions of a user that are not revoked and not expired at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_active_for_user(
        &self,
        user_id: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Vec<Session>>;

    /// Revokes a single session.
    ///
    /// # Returns
    ///
    /// Returns `true` if the session transitioned to revoked, `false` if it
    /// does not exist or was already revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke(&self, id: Uuid, reason: &str, at: OffsetDateTime) -> AuthResult<bool>;

    /// Revokes every non-revoked session of a user.
    ///
    /// # Returns
    ///
    /// Returns the number of sessions that transitioned.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_all_for_user(
        &self,
        user_id: &str,
        reason: &str,
        at: OffsetDateTime,
    ) -> AuthResult<u64>;

    /// Records activity on a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn touch(&self, id: Uuid, at: OffsetDateTime) -> AuthResult<()>;

    /// Applies a successful refresh if the stored version still equals
    /// `expected_version` and the session is not revoked.
    ///
    /// On success `token_version` and `refresh_count` are incremented,
    /// `last_refresh_at` is set to `refreshed_at` and `expires_at` to
    /// `expires_at`.
    ///
    /// # Returns
    ///
    /// Returns the updated session, or `None` if the condition did not hold
    /// (another refresh won the race, or the session was revoked meanwhile).
    ///
    /// # Atomicity
    ///
    /// The check and the write must be a single atomic step. A SQL backend
    /// would use:
    ///
    /// ```sql
    /// UPDATE sessions
    /// SET token_version = token_version + 1,
    ///     refresh_count = refresh_count + 1,
    ///     last_refresh_at = $3,
    ///     expires_at = $4
    /// WHERE id = $1 AND token_version = $2 AND NOT is_revoked
    /// RETURNING *
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn advance_version(
        &self,
        id: Uuid,
        expected_version: u32,
        refreshed_at: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> AuthResult<Option<Session>>;

    /// Revokes every non-revoked session whose `expires_at` is before `now`.
    ///
    /// # Returns
    ///
    /// Returns the number of sessions that transitioned.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_idle_expired(&self, now: OffsetDateTime, reason: &str) -> AuthResult<u64>;

    /// Revokes every non-revoked session whose `absolute_expires_at` is before `now`.
    ///
    /// # Returns
    ///
    /// Returns the number of sessions that transitioned.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_lifetime_exceeded(
        &self,
        now: OffsetDateTime,
        reason: &str,
    ) -> AuthResult<u64>;
}
