//! Session domain types.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Metadata key holding the channel the session was opened on.
pub const META_CHANNEL: &str = "channel";
/// Metadata key holding the client user agent.
pub const META_USER_AGENT: &str = "userAgent";
/// Metadata key holding how the user authenticated.
pub const META_LOGIN_METHOD: &str = "loginMethod";
/// Metadata key holding the RFC 3339 time of the last token issuance.
pub const META_LAST_TOKEN_REFRESH: &str = "lastTokenRefresh";

/// One authenticated device/login.
///
/// Tokens are never persisted; they are verified against the session they
/// reference. A session is never deleted, it only moves to the terminal
/// revoked state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session identifier.
    pub id: Uuid,

    /// Owner of the session.
    pub user_id: String,

    /// Human-readable device description.
    pub device_info: String,

    /// Sliding expiry, set at creation and on every successful refresh.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Fixed ceiling on the session's lifetime. Never extended.
    #[serde(with = "time::serde::rfc3339")]
    pub absolute_expires_at: OffsetDateTime,

    /// Terminal revocation flag.
    pub is_revoked: bool,

    /// When the session was revoked.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub revoked_at: Option<OffsetDateTime>,

    /// Why the session was revoked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_reason: Option<String>,

    /// Shared by every refresh token descended from this login.
    pub refresh_token_family: String,

    /// Version of the only refresh token that may still be redeemed.
    pub token_version: u32,

    /// Successful refreshes so far.
    pub refresh_count: u32,

    /// Last successful validity check.
    #[serde(with = "time::serde::rfc3339")]
    pub last_active: OffsetDateTime,

    /// Last successful refresh.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub last_refresh_at: Option<OffsetDateTime>,

    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Channel, user agent, login method and free-form entries.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Session {
    /// Returns `true` if the session is usable at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: OffsetDateTime) -> bool {
        !self.is_revoked && now < self.expires_at && now < self.absolute_expires_at
    }

    /// Channel recorded at creation, if any.
    #[must_use]
    pub fn channel(&self) -> Option<&str> {
        self.metadata.get(META_CHANNEL).and_then(|v| v.as_str())
    }

    /// Marks the session revoked.
    ///
    /// Returns `false` without touching the record if it was already revoked,
    /// so the original reason and time are preserved.
    pub fn revoke(&mut self, reason: &str, at: OffsetDateTime) -> bool {
        if self.is_revoked {
            return false;
        }
        self.is_revoked = true;
        self.revoked_at = Some(at);
        self.revoked_reason = Some(reason.to_string());
        true
    }

    /// Applies a successful rotation: bumps the version and refresh counter
    /// and slides the idle expiry.
    pub fn apply_refresh(&mut self, refreshed_at: OffsetDateTime, expires_at: OffsetDateTime) {
        self.token_version += 1;
        self.refresh_count += 1;
        self.last_refresh_at = Some(refreshed_at);
        self.expires_at = expires_at;
        if let Ok(stamp) = refreshed_at.format(&Rfc3339) {
            self.metadata
                .insert(META_LAST_TOKEN_REFRESH.to_string(), stamp.into());
        }
    }
}

/// How the user authenticated when the session was opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    /// Identifier and password, optionally with a second factor.
    #[default]
    Password,
    /// One-time code sent to the user's mobile or email.
    Otp,
}

impl LoginMethod {
    /// Returns the metadata value for this method.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Otp => "otp",
        }
    }
}

/// Why a session moved to the revoked state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RevocationReason {
    /// Explicit logout of one session.
    UserLogout,
    /// Explicit logout of every session of the user.
    UserLogoutAllDevices,
    /// A superseded refresh token was replayed.
    TokenReuse,
    /// The refresh ceiling was reached.
    RefreshLimitExceeded,
    /// The sliding expiry passed.
    IdleExpired,
    /// The absolute expiry passed.
    LifetimeExceeded,
}

impl RevocationReason {
    /// Returns the reason string stored on the session.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserLogout => "user logout",
            Self::UserLogoutAllDevices => "user logout (all devices)",
            Self::TokenReuse => "token reuse detected",
            Self::RefreshLimitExceeded => "maximum refresh count exceeded",
            Self::IdleExpired => "Session expired",
            Self::LifetimeExceeded => "Maximum session lifetime exceeded",
        }
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to [`SessionManager::create_session`](super::SessionManager::create_session).
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    /// Pre-allocated id. A new one is generated when `None`.
    pub id: Option<Uuid>,
    /// Owner of the session.
    pub user_id: String,
    /// Channel the login happened on.
    pub channel: String,
    /// Client user agent.
    pub user_agent: Option<String>,
    /// How the user authenticated.
    pub login_method: LoginMethod,
    /// Token family. A new one is generated when `None`.
    pub refresh_token_family: Option<String>,
    /// Additional metadata entries.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl NewSession {
    /// Creates a session request for `user_id` on `channel`.
    #[must_use]
    pub fn new(user_id: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            channel: channel.into(),
            ..Self::default()
        }
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Sets the login method.
    #[must_use]
    pub fn with_login_method(mut self, method: LoginMethod) -> Self {
        self.login_method = method;
        self
    }

    /// Sets the token family.
    #[must_use]
    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.refresh_token_family = Some(family.into());
        self
    }

    /// Device description: `"<channel>"` or `"<channel> - <user agent>"`.
    #[must_use]
    pub fn device_info(&self) -> String {
        match self.user_agent.as_deref() {
            Some(agent) if !agent.is_empty() => format!("{} - {}", self.channel, agent),
            _ => self.channel.clone(),
        }
    }
}

/// Outcome of one cleanup sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Sessions revoked because their sliding expiry passed.
    pub idle_expired: u64,
    /// Sessions revoked because their absolute expiry passed.
    pub lifetime_exceeded: u64,
}

impl CleanupReport {
    /// Total sessions revoked by the sweep.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.idle_expired + self.lifetime_exceeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn session(now: OffsetDateTime) -> Session {
        Session {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            device_info: "web".to_string(),
            expires_at: now + Duration::hours(24),
            absolute_expires_at: now + Duration::days(30),
            is_revoked: false,
            revoked_at: None,
            revoked_reason: None,
            refresh_token_family: "family".to_string(),
            token_version: 1,
            refresh_count: 0,
            last_active: now,
            last_refresh_at: None,
            created_at: now,
            metadata: HashMap::from([(META_CHANNEL.to_string(), "web".into())]),
        }
    }

    #[test]
    fn test_is_active_at() {
        let now = OffsetDateTime::now_utc();
        let mut s = session(now);
        assert!(s.is_active_at(now));
        assert!(!s.is_active_at(now + Duration::hours(25)));

        s.expires_at = now + Duration::days(40);
        assert!(!s.is_active_at(now + Duration::days(31)));

        s.is_revoked = true;
        assert!(!s.is_active_at(now));
    }

    #[test]
    fn test_revoke_is_terminal_and_keeps_first_reason() {
        let now = OffsetDateTime::now_utc();
        let mut s = session(now);

        assert!(s.revoke(RevocationReason::UserLogout.as_str(), now));
        assert!(!s.revoke(RevocationReason::TokenReuse.as_str(), now + Duration::minutes(1)));

        assert!(s.is_revoked);
        assert_eq!(s.revoked_at, Some(now));
        assert_eq!(s.revoked_reason.as_deref(), Some("user logout"));
    }

    #[test]
    fn test_apply_refresh() {
        let now = OffsetDateTime::now_utc();
        let mut s = session(now);
        let later = now + Duration::minutes(10);

        s.apply_refresh(later, later + Duration::hours(24));

        assert_eq!(s.token_version, 2);
        assert_eq!(s.refresh_count, 1);
        assert_eq!(s.last_refresh_at, Some(later));
        assert_eq!(s.expires_at, later + Duration::hours(24));
        assert!(s.metadata.contains_key(META_LAST_TOKEN_REFRESH));
    }

    #[test]
    fn test_channel_from_metadata() {
        let s = session(OffsetDateTime::now_utc());
        assert_eq!(s.channel(), Some("web"));
    }

    #[test]
    fn test_device_info() {
        let req = NewSession::new("u1", "mobile");
        assert_eq!(req.device_info(), "mobile");

        let req = req.with_user_agent("okhttp/4.12");
        assert_eq!(req.device_info(), "mobile - okhttp/4.12");
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let s = session(OffsetDateTime::now_utc());
        let json = serde_json::to_value(&s).unwrap();
        assert!(json.get("refreshTokenFamily").is_some());
        assert!(json.get("absoluteExpiresAt").is_some());
        assert!(json.get("revokedAt").is_none());
    }

    #[test]
    fn test_revocation_reason_strings() {
        assert_eq!(RevocationReason::TokenReuse.to_string(), "token reuse detected");
        assert_eq!(RevocationReason::IdleExpired.as_str(), "Session expired");
        assert_eq!(
            RevocationReason::LifetimeExceeded.as_str(),
            "Maximum session lifetime exceeded"
        );
    }
}
