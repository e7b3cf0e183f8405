use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;
use warden_auth::{AuthResult, Session, SessionStore};

/// In-memory session store.
///
/// Every mutation runs under the shard lock of the session's entry, which
/// makes the version check in [`SessionStore::advance_version`] atomic with
/// the write.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<Uuid, Session>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, revoked ones included.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn revoke_matching(
        &self,
        reason: &str,
        at: OffsetDateTime,
        predicate: impl Fn(&Session) -> bool,
    ) -> u64 {
        let mut revoked = 0;
        for mut entry in self.sessions.iter_mut() {
            let session = entry.value_mut();
            if predicate(session) && session.revoke(reason, at) {
                revoked += 1;
            }
        }
        revoked
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: &Session) -> AuthResult<()> {
        self.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Session>> {
        Ok(self.sessions.get(&id).map(|s| s.value().clone()))
    }

    async fn list_active_for_user(
        &self,
        user_id: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.is_active_at(now))
            .map(|s| s.value().clone())
            .collect();
        sessions.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        Ok(sessions)
    }

    async fn revoke(&self, id: Uuid, reason: &str, at: OffsetDateTime) -> AuthResult<bool> {
        Ok(self
            .sessions
            .get_mut(&id)
            .is_some_and(|mut s| s.revoke(reason, at)))
    }

    async fn revoke_all_for_user(
        &self,
        user_id: &str,
        reason: &str,
        at: OffsetDateTime,
    ) -> AuthResult<u64> {
        Ok(self.revoke_matching(reason, at, |s| s.user_id == user_id))
    }

    async fn touch(&self, id: Uuid, at: OffsetDateTime) -> AuthResult<()> {
        if let Some(mut session) = self.sessions.get_mut(&id) {
            session.last_active = at;
        }
        Ok(())
    }

    async fn advance_version(
        &self,
        id: Uuid,
        expected_version: u32,
        refreshed_at: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> AuthResult<Option<Session>> {
        let Some(mut entry) = self.sessions.get_mut(&id) else {
            return Ok(None);
        };

        let session = entry.value_mut();
        if session.is_revoked || session.token_version != expected_version {
            return Ok(None);
        }

        session.apply_refresh(refreshed_at, expires_at);
        Ok(Some(session.clone()))
    }

    async fn revoke_idle_expired(&self, now: OffsetDateTime, reason: &str) -> AuthResult<u64> {
        Ok(self.revoke_matching(reason, now, |s| s.expires_at < now))
    }

    async fn revoke_lifetime_exceeded(
        &self,
        now: OffsetDateTime,
        reason: &str,
    ) -> AuthResult<u64> {
        Ok(self.revoke_matching(reason, now, |s| s.absolute_expires_at < now))
    }
}
