//! In-crate test doubles for the storage and identity traits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::identity::{CredentialVerifier, TwoFactorVerifier, User};
use crate::session::Session;
use crate::storage::{OtpRecord, OtpStore, SessionStore, UserDirectory, UserUpdate};
use crate::verification::OtpDelivery;

#[derive(Default)]
pub(crate) struct MockSessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
    lose_next_cas: AtomicBool,
}

impl MockSessionStore {
    /// Makes the next `advance_version` behave as if a concurrent refresh
    /// committed first.
    pub(crate) fn lose_next_cas(&self) {
        self.lose_next_cas.store(true, Ordering::SeqCst);
    }

    pub(crate) fn put(&self, session: Session) {
        self.sessions.write().unwrap().insert(session.id, session);
    }

    pub(crate) fn get(&self, id: Uuid) -> Session {
        self.sessions.read().unwrap().get(&id).cloned().unwrap()
    }

    pub(crate) fn all_for_user(&self, user_id: &str) -> Vec<Session> {
        self.sessions
            .read()
            .unwrap()
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    fn revoke_where(&self, reason: &str, at: OffsetDateTime, f: impl Fn(&Session) -> bool) -> u64 {
        self.sessions
            .write()
            .unwrap()
            .values_mut()
            .filter(|s| f(s))
            .map(|s| u64::from(s.revoke(reason, at)))
            .sum()
    }
}

#[async_trait]
impl SessionStore for MockSessionStore {
    async fn create(&self, session: &Session) -> AuthResult<()> {
        self.put(session.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Session>> {
        Ok(self.sessions.read().unwrap().get(&id).cloned())
    }

    async fn list_active_for_user(
        &self,
        user_id: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Vec<Session>> {
        Ok(self
            .all_for_user(user_id)
            .into_iter()
            .filter(|s| s.is_active_at(now))
            .collect())
    }

    async fn revoke(&self, id: Uuid, reason: &str, at: OffsetDateTime) -> AuthResult<bool> {
        Ok(self
            .sessions
            .write()
            .unwrap()
            .get_mut(&id)
            .is_some_and(|s| s.revoke(reason, at)))
    }

    async fn revoke_all_for_user(
        &self,
        user_id: &str,
        reason: &str,
        at: OffsetDateTime,
    ) -> AuthResult<u64> {
        Ok(self.revoke_where(reason, at, |s| s.user_id == user_id))
    }

    async fn touch(&self, id: Uuid, at: OffsetDateTime) -> AuthResult<()> {
        if let Some(s) = self.sessions.write().unwrap().get_mut(&id) {
            s.last_active = at;
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
        let mut sessions = self.sessions.write().unwrap();
        if self.lose_next_cas.swap(false, Ordering::SeqCst) {
            if let Some(s) = sessions.get_mut(&id) {
                s.apply_refresh(refreshed_at, expires_at);
            }
            return Ok(None);
        }
        match sessions.get_mut(&id) {
            Some(s) if !s.is_revoked && s.token_version == expected_version => {
                s.apply_refresh(refreshed_at, expires_at);
                Ok(Some(s.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn revoke_idle_expired(&self, now: OffsetDateTime, reason: &str) -> AuthResult<u64> {
        Ok(self.revoke_where(reason, now, |s| s.expires_at < now))
    }

    async fn revoke_lifetime_exceeded(
        &self,
        now: OffsetDateTime,
        reason: &str,
    ) -> AuthResult<u64> {
        Ok(self.revoke_where(reason, now, |s| s.absolute_expires_at < now))
    }
}

/// Users keyed by id, with plain-text passwords.
#[derive(Default)]
pub(crate) struct MockUserDirectory {
    users: RwLock<HashMap<String, (User, String)>>,
}

impl MockUserDirectory {
    pub(crate) fn add(&self, user: User, password: &str) {
        self.users
            .write()
            .unwrap()
            .insert(user.id.clone(), (user, password.to_string()));
    }

    pub(crate) fn remove(&self, id: &str) {
        self.users.write().unwrap().remove(id);
    }

    pub(crate) fn get(&self, id: &str) -> User {
        self.users.read().unwrap()[id].0.clone()
    }

    fn lookup(&self, identifier: &str) -> Option<(User, String)> {
        self.users
            .read()
            .unwrap()
            .values()
            .find(|(u, _)| u.email == identifier || u.mobile.as_deref() == Some(identifier))
            .cloned()
    }
}

#[async_trait]
impl UserDirectory for MockUserDirectory {
    async fn find_by_id(&self, id: &str) -> AuthResult<Option<User>> {
        Ok(self.users.read().unwrap().get(id).map(|(u, _)| u.clone()))
    }

    async fn find_by_identifier(&self, identifier: &str) -> AuthResult<Option<User>> {
        Ok(self.lookup(identifier).map(|(u, _)| u))
    }

    async fn update(&self, id: &str, update: UserUpdate) -> AuthResult<()> {
        let mut users = self.users.write().unwrap();
        let (user, _) = users.get_mut(id).ok_or(AuthError::UserNotFound)?;
        if let Some(at) = update.last_login_at {
            user.last_login_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialVerifier for MockUserDirectory {
    async fn verify(&self, identifier: &str, password: &str) -> AuthResult<Option<User>> {
        Ok(self
            .lookup(identifier)
            .filter(|(_, p)| p == password)
            .map(|(u, _)| u))
    }
}

/// Accepts exactly one code for every user.
pub(crate) struct FixedTwoFactor(pub(crate) &'static str);

#[async_trait]
impl TwoFactorVerifier for FixedTwoFactor {
    async fn verify(&self, _user_id: &str, code: &str) -> AuthResult<bool> {
        Ok(code == self.0)
    }
}

#[derive(Default)]
pub(crate) struct MockOtpStore {
    records: Mutex<Vec<OtpRecord>>,
}

impl MockOtpStore {
    pub(crate) fn records(&self) -> Vec<OtpRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl OtpStore for MockOtpStore {
    async fn save(&self, record: &OtpRecord) -> AuthResult<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn find_pending(&self, key: &str, now: OffsetDateTime) -> AuthResult<Option<OtpRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.key == key && r.is_pending_at(now))
            .max_by_key(|r| r.expires_at)
            .cloned())
    }

    async fn mark_verified(&self, id: Uuid) -> AuthResult<bool> {
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.id == id && !r.verified) {
            Some(record) => {
                record.verified = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn purge_settled(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.is_pending_at(now));
        Ok((before - records.len()) as u64)
    }
}

/// Remembers the last code delivered per key.
#[derive(Default)]
pub(crate) struct CapturingDelivery {
    codes: Mutex<HashMap<String, String>>,
}

impl CapturingDelivery {
    pub(crate) fn last_code(&self, key: &str) -> Option<String> {
        self.codes.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl OtpDelivery for CapturingDelivery {
    async fn deliver(&self, key: &str, code: &str) -> AuthResult<()> {
        self.codes
            .lock()
            .unwrap()
            .insert(key.to_string(), code.to_string());
        Ok(())
    }
}
