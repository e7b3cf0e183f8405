use async_trait::async_trait;
use dashmap::DashMap;
use warden_auth::{AuthError, AuthResult, CredentialVerifier, User, UserDirectory, UserUpdate};

use crate::password::{hash_password, verify_password};

#[derive(Clone)]
struct StoredUser {
    user: User,
    password_hash: String,
}

/// In-memory user directory with Argon2 password credentials.
///
/// Users are keyed by id; email and mobile number are indexed as login
/// identifiers.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: DashMap<String, StoredUser>,
    identifiers: DashMap<String, String>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a user with the given password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if the password cannot be hashed.
    pub fn insert(&self, user: User, password: &str) -> AuthResult<()> {
        let password_hash = hash_password(password)
            .map_err(|e| AuthError::internal(format!("password hashing failed: {e}")))?;

        if let Some(previous) = self.users.get(&user.id).map(|s| s.user.clone()) {
            self.unindex(&previous);
        }

        self.identifiers.insert(user.email.clone(), user.id.clone());
        if let Some(mobile) = &user.mobile {
            self.identifiers.insert(mobile.clone(), user.id.clone());
        }

        tracing::debug!(user_id = %user.id, "User added to directory");
        self.users.insert(
            user.id.clone(),
            StoredUser {
                user,
                password_hash,
            },
        );
        Ok(())
    }

    /// Removes a user. Returns the removed record.
    pub fn remove(&self, id: &str) -> Option<User> {
        let (_, stored) = self.users.remove(id)?;
        self.unindex(&stored.user);
        Some(stored.user)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn unindex(&self, user: &User) {
        self.identifiers.remove(&user.email);
        if let Some(mobile) = &user.mobile {
            self.identifiers.remove(mobile);
        }
    }

    fn lookup(&self, identifier: &str) -> Option<StoredUser> {
        let id = self.identifiers.get(identifier)?.value().clone();
        self.users.get(&id).map(|s| s.value().clone())
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_id(&self, id: &str) -> AuthResult<Option<User>> {
        Ok(self.users.get(id).map(|s| s.user.clone()))
    }

    async fn find_by_identifier(&self, identifier: &str) -> AuthResult<Option<User>> {
        Ok(self.lookup(identifier).map(|s| s.user))
    }

    async fn update(&self, id: &str, update: UserUpdate) -> AuthResult<()> {
        let mut stored = self.users.get_mut(id).ok_or(AuthError::UserNotFound)?;
        if let Some(at) = update.last_login_at {
            stored.user.last_login_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialVerifier for InMemoryUserDirectory {
    async fn verify(&self, identifier: &str, password: &str) -> AuthResult<Option<User>> {
        let Some(stored) = self.lookup(identifier) else {
            return Ok(None);
        };

        let matches = verify_password(password, &stored.password_hash)
            .map_err(|e| AuthError::storage(format!("stored password hash unreadable: {e}")))?;

        Ok(matches.then_some(stored.user))
    }
}
