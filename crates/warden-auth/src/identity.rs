//! User record and the identity collaborators the core consumes.
//!
//! Credential checking, channel policy and second-factor verification live
//! outside the core. They are injected as trait objects so one orchestrator
//! implementation serves every user role.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::otp::OtpGenerator;
use crate::storage::UserDirectory;

/// Channel that is accepted for every user.
pub const API_CHANNEL: &str = "api";

/// Account status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// May authenticate.
    #[default]
    Active,
    /// Disabled by the user or an administrator.
    Inactive,
    /// Blocked pending review.
    Suspended,
}

/// Coarse access level carried on the user record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// No access.
    None,
    /// Regular user.
    #[default]
    User,
    /// Administrator.
    Admin,
}

/// The subset of a user record the core reads.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Stable user identifier.
    pub id: String,

    /// Email address, also usable as login identifier.
    pub email: String,

    /// Mobile number, also usable as login identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,

    /// Account status.
    #[serde(default)]
    pub status: UserStatus,

    /// Whether login requires a second factor.
    #[serde(default)]
    pub two_factor_enabled: bool,

    /// Key for the second-factor code generator.
    #[serde(default, skip_serializing)]
    pub two_factor_secret: Option<String>,

    /// Channels the user may log in on, besides `api`.
    #[serde(default)]
    pub allowed_channels: Vec<String>,

    /// Access level.
    #[serde(default)]
    pub access_level: AccessLevel,

    /// Time of the last successful login.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub last_login_at: Option<OffsetDateTime>,
}

impl User {
    /// Creates an active user with no allowed channels.
    #[must_use]
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            mobile: None,
            status: UserStatus::Active,
            two_factor_enabled: false,
            two_factor_secret: None,
            allowed_channels: Vec::new(),
            access_level: AccessLevel::User,
            last_login_at: None,
        }
    }

    /// Returns `true` if the account may authenticate.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("mobile", &self.mobile)
            .field("status", &self.status)
            .field("two_factor_enabled", &self.two_factor_enabled)
            .field("allowed_channels", &self.allowed_channels)
            .field("access_level", &self.access_level)
            .field("last_login_at", &self.last_login_at)
            .finish_non_exhaustive()
    }
}

/// Checks an identifier/password pair.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Returns the user if the credentials are correct, `None` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure failures.
    async fn verify(&self, identifier: &str, password: &str) -> AuthResult<Option<User>>;
}

/// Decides which channels and clients a user may use.
pub trait PolicyService: Send + Sync {
    /// Returns `true` if `user` may authenticate on `channel`.
    fn is_channel_authorized(&self, user: &User, channel: &str) -> bool;

    /// Returns `true` if a token of `user` may be used on `channel` by
    /// `client_id`.
    fn is_client_authorized(&self, user: &User, channel: &str, client_id: Option<&str>) -> bool {
        let _ = client_id;
        self.is_channel_authorized(user, channel)
    }
}

/// Verifies second-factor codes.
#[async_trait]
pub trait TwoFactorVerifier: Send + Sync {
    /// Returns `true` if `code` is currently valid for the user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user does not exist, or an
    /// error for infrastructure failures.
    async fn verify(&self, user_id: &str, code: &str) -> AuthResult<bool>;
}

/// Channel policy driven by `User::allowed_channels`.
///
/// - `api` is accepted for every user; an `api` token presented with a
///   client id is accepted only for allow-listed clients.
/// - Any other channel requires an active account that lists the channel.
#[derive(Debug, Clone, Default)]
pub struct AllowedChannelsPolicy {
    api_clients: HashSet<String>,
}

impl AllowedChannelsPolicy {
    /// Creates a policy with an allow-list of `api` client ids.
    #[must_use]
    pub fn new<I, S>(api_clients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            api_clients: api_clients.into_iter().map(Into::into).collect(),
        }
    }
}

impl PolicyService for AllowedChannelsPolicy {
    fn is_channel_authorized(&self, user: &User, channel: &str) -> bool {
        if channel == API_CHANNEL {
            return true;
        }

        if !user.is_active() {
            tracing::debug!(user_id = %user.id, "User not active, denying channel access");
            return false;
        }

        let authorized = user.allowed_channels.iter().any(|c| c == channel);
        if !authorized {
            tracing::debug!(user_id = %user.id, channel, "User not authorized for channel");
        }
        authorized
    }

    fn is_client_authorized(&self, user: &User, channel: &str, client_id: Option<&str>) -> bool {
        if !self.is_channel_authorized(user, channel) {
            return false;
        }

        match client_id {
            Some(client) if channel == API_CHANNEL => self.api_clients.contains(client),
            _ => true,
        }
    }
}

/// Second factor backed by the OTP generator, keyed by the user's
/// `two_factor_secret`.
pub struct OtpTwoFactorVerifier {
    users: Arc<dyn UserDirectory>,
    generator: OtpGenerator,
    salt: String,
}

impl OtpTwoFactorVerifier {
    /// Creates a verifier.
    #[must_use]
    pub fn new(users: Arc<dyn UserDirectory>, generator: OtpGenerator, salt: impl Into<String>) -> Self {
        Self {
            users,
            generator,
            salt: salt.into(),
        }
    }
}

#[async_trait]
impl TwoFactorVerifier for OtpTwoFactorVerifier {
    async fn verify(&self, user_id: &str, code: &str) -> AuthResult<bool> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        match user.two_factor_secret.as_deref() {
            Some(secret) if user.two_factor_enabled => {
                Ok(self.generator.verify(secret, &self.salt, code))
            }
            _ => {
                tracing::debug!(user_id, "Two-factor is not set up for user");
                Ok(false)
            }
        }
    }
}
