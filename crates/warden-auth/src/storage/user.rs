//! User directory trait.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::identity::User;

/// Fields the core writes back to a user record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    /// Time of the last successful login.
    pub last_login_at: Option<OffsetDateTime>,
}

/// Lookup and minimal update of user records.
///
/// One directory is bound per role (e.g. creators and editors); the core is
/// otherwise identical for every role.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Finds a user by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, id: &str) -> AuthResult<Option<User>>;

    /// Finds a user by a login identifier (email or mobile number).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_identifier(&self, identifier: &str) -> AuthResult<Option<User>>;

    /// Applies `update` to the user record.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user does not exist, or an
    /// error if the storage operation fails.
    async fn update(&self, id: &str, update: UserUpdate) -> AuthResult<()>;
}
