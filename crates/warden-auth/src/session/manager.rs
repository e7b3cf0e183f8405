//! Session lifecycle manager.
//!
//! Owns every state transition of a [`Session`]: creation, activity checks,
//! rotation bookkeeping, revocation and the periodic expiry sweep.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::AuthResult;
use crate::config::SessionSettings;
use crate::rate_limit::RateLimiter;
use crate::storage::SessionStore;
use crate::verification::OtpVerificationService;

use super::model::{
    CleanupReport, META_CHANNEL, META_LAST_TOKEN_REFRESH, META_LOGIN_METHOD, META_USER_AGENT,
    NewSession, RevocationReason, Session,
};

/// Creates, validates, rotates and revokes sessions.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    settings: SessionSettings,
}

impl SessionManager {
    /// Creates a manager over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, settings: SessionSettings) -> Self {
        Self { store, settings }
    }

    /// Lifetime settings in effect.
    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Opens a new session at version 1.
    ///
    /// `expires_at` is `now + idle_lifetime` and `absolute_expires_at` is
    /// `now + absolute_lifetime`. Missing id or family are generated.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be stored.
    pub async fn create_session(&self, request: NewSession) -> AuthResult<Session> {
        let now = OffsetDateTime::now_utc();
        let id = request.id.unwrap_or_else(Uuid::new_v4);
        let device_info = request.device_info();

        let mut metadata = request.metadata;
        metadata.insert(META_CHANNEL.to_string(), request.channel.clone().into());
        metadata.insert(
            META_LOGIN_METHOD.to_string(),
            request.login_method.as_str().into(),
        );
        if let Some(agent) = request.user_agent {
            metadata.insert(META_USER_AGENT.to_string(), agent.into());
        }
        if let Ok(stamp) = now.format(&time::format_description::well_known::Rfc3339) {
            metadata.insert(META_LAST_TOKEN_REFRESH.to_string(), stamp.into());
        }

        let session = Session {
            id,
            user_id: request.user_id,
            device_info,
            expires_at: now + self.settings.idle_lifetime,
            absolute_expires_at: now + self.settings.absolute_lifetime,
            is_revoked: false,
            revoked_at: None,
            revoked_reason: None,
            refresh_token_family: request
                .refresh_token_family
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            token_version: 1,
            refresh_count: 0,
            last_active: now,
            last_refresh_at: None,
            created_at: now,
            metadata,
        };

        self.store.create(&session).await?;

        tracing::debug!(
            user_id = %session.user_id,
            session_id = %session.id,
            channel = %request.channel,
            "Session created"
        );

        Ok(session)
    }

    /// Loads a session regardless of its state.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn find(&self, id: Uuid) -> AuthResult<Option<Session>> {
        self.store.find_by_id(id).await
    }

    /// Revokes one session. Revoking an already revoked or unknown session is
    /// not an error.
    ///
    /// Returns `true` if this call performed the transition.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn invalidate(&self, id: Uuid, reason: RevocationReason) -> AuthResult<bool> {
        let revoked = self
            .store
            .revoke(id, reason.as_str(), OffsetDateTime::now_utc())
            .await?;

        tracing::debug!(session_id = %id, reason = %reason, revoked, "Session invalidated");
        Ok(revoked)
    }

    /// Revokes every non-revoked session of a user.
    ///
    /// Returns the number of sessions revoked by this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn invalidate_all_for_user(
        &self,
        user_id: &str,
        reason: RevocationReason,
    ) -> AuthResult<u64> {
        let revoked = self
            .store
            .revoke_all_for_user(user_id, reason.as_str(), OffsetDateTime::now_utc())
            .await?;

        tracing::info!(user_id, reason = %reason, revoked, "All user sessions invalidated");
        Ok(revoked)
    }

    /// Returns `true` if the session exists, is not revoked and neither
    /// expiry has passed. A `true` result records activity on the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn is_valid(&self, id: Uuid) -> AuthResult<bool> {
        let now = OffsetDateTime::now_utc();
        let Some(session) = self.store.find_by_id(id).await? else {
            return Ok(false);
        };

        if !session.is_active_at(now) {
            return Ok(false);
        }

        self.store.touch(id, now).await?;
        Ok(true)
    }

    /// Records a successful refresh on `snapshot`, the session state the
    /// caller validated the token against.
    ///
    /// The write only happens if the stored version still equals
    /// `snapshot.token_version`. The new sliding expiry is
    /// `min(now + idle_lifetime, absolute_expires_at)`.
    ///
    /// Returns the updated session, or `None` if another refresh got there
    /// first or the session was revoked in between.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn update_after_refresh(&self, snapshot: &Session) -> AuthResult<Option<Session>> {
        let now = OffsetDateTime::now_utc();
        let expires_at = (now + self.settings.idle_lifetime).min(snapshot.absolute_expires_at);

        let updated = self
            .store
            .advance_version(snapshot.id, snapshot.token_version, now, expires_at)
            .await?;

        match &updated {
            Some(session) => tracing::debug!(
                session_id = %session.id,
                token_version = session.token_version,
                "Session updated after token refresh"
            ),
            None => tracing::debug!(
                session_id = %snapshot.id,
                expected_version = snapshot.token_version,
                "Session version changed before refresh could be recorded"
            ),
        }

        Ok(updated)
    }

    /// Lists the usable sessions of a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn list_active_sessions(&self, user_id: &str) -> AuthResult<Vec<Session>> {
        self.store
            .list_active_for_user(user_id, OffsetDateTime::now_utc())
            .await
    }

    /// Revokes sessions whose sliding or absolute expiry has passed.
    ///
    /// Safe to run repeatedly and concurrently with requests: already
    /// revoked sessions are left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn cleanup_expired(&self) -> AuthResult<CleanupReport> {
        let now = OffsetDateTime::now_utc();

        let idle_expired = self
            .store
            .revoke_idle_expired(now, RevocationReason::IdleExpired.as_str())
            .await?;
        let lifetime_exceeded = self
            .store
            .revoke_lifetime_exceeded(now, RevocationReason::LifetimeExceeded.as_str())
            .await?;

        Ok(CleanupReport {
            idle_expired,
            lifetime_exceeded,
        })
    }

    /// Spawns the periodic expiry sweep.
    ///
    /// Stale rate limit buckets and settled one-time code records are purged
    /// on the same schedule when their owners are given. The task runs until
    /// the handle is aborted.
    pub fn start_cleanup_task(
        self: Arc<Self>,
        limiter: Option<Arc<RateLimiter>>,
        verification: Option<Arc<OtpVerificationService>>,
    ) -> JoinHandle<()> {
        let interval_duration = self.settings.cleanup_interval.max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval_duration);

            loop {
                interval.tick().await;

                match self.cleanup_expired().await {
                    Ok(report) if report.total() > 0 => {
                        tracing::info!(
                            idle_expired = report.idle_expired,
                            lifetime_exceeded = report.lifetime_exceeded,
                            "Session cleanup completed"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Session cleanup failed");
                    }
                    _ => {}
                }

                if let Some(limiter) = &limiter {
                    limiter.purge_stale();
                }

                if let Some(verification) = &verification {
                    match verification.purge_settled().await {
                        Ok(0) => {}
                        Ok(purged) => tracing::debug!(purged, "Settled OTP records purged"),
                        Err(e) => tracing::warn!(error = %e, "OTP record purge failed"),
                    }
                }
            }
        })
    }
}
