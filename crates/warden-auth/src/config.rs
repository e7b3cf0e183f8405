//! Authentication core configuration.
//!
//! All sections default to production-safe values except the secrets, which
//! must be supplied by the deployment (file or `WARDEN__*` environment
//! variables) before [`AuthConfig::validate`] accepts the configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::rate_limit::{RateLimitCategory, RateLimitRule};
use crate::token::SigningAlgorithm;

/// Root configuration of the authentication core.
///
/// # Example (TOML)
///
/// ```toml
/// issuer = "warden-customer"
///
/// [tokens]
/// access_token_lifetime = "1h"
/// refresh_token_lifetime = "7d"
/// access_secret = "change-me"
///
/// [rate_limiting.login]
/// points = 5
/// duration = "15m"
/// block_duration = "1h"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Token `iss` claim. One issuer per role/tenant deployment.
    pub issuer: String,

    /// Default log filter directive used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Token signing and rotation.
    pub tokens: TokenSettings,

    /// Session lifetimes and sweeping.
    pub sessions: SessionSettings,

    /// Per-category rate-limit rules.
    pub rate_limiting: RateLimitSettings,

    /// One-time password generation.
    pub otp: OtpSettings,

    /// Channel policy.
    pub policy: PolicySettings,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "warden".to_string(),
            log_level: "info".to_string(),
            tokens: TokenSettings::default(),
            sessions: SessionSettings::default(),
            rate_limiting: RateLimitSettings::default(),
            otp: OtpSettings::default(),
            policy: PolicySettings::default(),
        }
    }
}

/// What happens to the loser of two concurrent refreshes of the same token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshRacePolicy {
    /// Fail the loser with `SessionInvalid`; other sessions stay intact.
    #[default]
    Reject,
    /// Handle the loser like a replayed token: revoke every session of the user.
    TreatAsReuse,
}

/// Token signing and rotation settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenSettings {
    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// HMAC algorithm used for both token kinds.
    pub algorithm: SigningAlgorithm,

    /// Secret for access tokens.
    pub access_secret: String,

    /// Secret for refresh tokens. Falls back to `access_secret` when empty.
    pub refresh_secret: String,

    /// Refreshes allowed per session before it is revoked.
    pub max_refresh_count: u32,

    /// Disposition of the losing request in a concurrent refresh.
    pub refresh_race: RefreshRacePolicy,
}

impl TokenSettings {
    /// Returns the secret used for refresh tokens.
    #[must_use]
    pub fn effective_refresh_secret(&self) -> &str {
        if self.refresh_secret.is_empty() {
            &self.access_secret
        } else {
            &self.refresh_secret
        }
    }
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::from_secs(3600), // 1 hour
            refresh_token_lifetime: Duration::from_secs(7 * 24 * 3600), // 7 days
            algorithm: SigningAlgorithm::default(),
            access_secret: String::new(),
            refresh_secret: String::new(),
            max_refresh_count: 1000,
            refresh_race: RefreshRacePolicy::default(),
        }
    }
}

impl fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSettings")
            .field("access_token_lifetime", &self.access_token_lifetime)
            .field("refresh_token_lifetime", &self.refresh_token_lifetime)
            .field("algorithm", &self.algorithm)
            .field("access_secret", &"[REDACTED]")
            .field("refresh_secret", &"[REDACTED]")
            .field("max_refresh_count", &self.max_refresh_count)
            .field("refresh_race", &self.refresh_race)
            .finish()
    }
}

/// Session lifetime settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Sliding expiry, reset on every successful refresh.
    #[serde(with = "humantime_serde")]
    pub idle_lifetime: Duration,

    /// Hard ceiling on a session's total lifetime.
    #[serde(with = "humantime_serde")]
    pub absolute_lifetime: Duration,

    /// Interval between expiry sweeps.
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_lifetime: Duration::from_secs(24 * 3600),          // 24 hours
            absolute_lifetime: Duration::from_secs(30 * 24 * 3600), // 30 days
            cleanup_interval: Duration::from_secs(3600),            // 1 hour
        }
    }
}

/// Rate-limit rules, one per bucket category.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Password and OTP login attempts, keyed by identifier.
    pub login: RateLimitRule,

    /// Refresh attempts, keyed by refresh-token jti.
    pub refresh: RateLimitRule,

    /// Verification code requests and confirmations, keyed by mobile/email.
    pub verification: RateLimitRule,

    /// Two-factor code attempts, keyed by user id.
    pub two_factor: RateLimitRule,
}

impl RateLimitSettings {
    /// Returns the rule for a category.
    #[must_use]
    pub fn rule(&self, category: RateLimitCategory) -> &RateLimitRule {
        match category {
            RateLimitCategory::Login => &self.login,
            RateLimitCategory::Refresh => &self.refresh,
            RateLimitCategory::Verification => &self.verification,
            RateLimitCategory::TwoFactor => &self.two_factor,
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            login: RateLimitRule::new(5, Duration::from_secs(900), Duration::from_secs(3600)),
            refresh: RateLimitRule::new(5, Duration::from_secs(60), Duration::from_secs(300)),
            verification: RateLimitRule::new(
                3,
                Duration::from_secs(600),
                Duration::from_secs(1800),
            ),
            two_factor: RateLimitRule::new(5, Duration::from_secs(900), Duration::from_secs(3600)),
        }
    }
}

/// One-time password settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OtpSettings {
    /// Length of one OTP window.
    #[serde(with = "humantime_serde")]
    pub time_step: Duration,

    /// Server-side salt mixed into every code.
    pub salt: String,
}

impl Default for OtpSettings {
    fn default() -> Self {
        Self {
            time_step: Duration::from_secs(60),
            salt: String::new(),
        }
    }
}

impl fmt::Debug for OtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtpSettings")
            .field("time_step", &self.time_step)
            .field("salt", &"[REDACTED]")
            .finish()
    }
}

/// Channel policy settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicySettings {
    /// Client ids accepted on the `api` channel. Empty accepts none.
    pub api_client_ids: Vec<String>,
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl From<ConfigError> for AuthError {
    fn from(err: ConfigError) -> Self {
        AuthError::configuration(err.to_string())
    }
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if a secret or the OTP salt is empty, and
    /// `ConfigError::InvalidValue` if:
    /// - The issuer is empty
    /// - A lifetime, the OTP time step or a rate-limit window is zero
    /// - The idle lifetime exceeds the absolute lifetime
    /// - The refresh ceiling or a rule's point budget is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::InvalidValue(
                "issuer cannot be empty".to_string(),
            ));
        }

        // Secrets
        if self.tokens.access_secret.is_empty() {
            return Err(ConfigError::Missing("tokens.access_secret".to_string()));
        }
        if self.otp.salt.is_empty() {
            return Err(ConfigError::Missing("otp.salt".to_string()));
        }

        // Token lifetimes
        if self.tokens.access_token_lifetime.is_zero()
            || self.tokens.refresh_token_lifetime.is_zero()
        {
            return Err(ConfigError::InvalidValue(
                "token lifetimes must be > 0".to_string(),
            ));
        }
        if self.tokens.max_refresh_count == 0 {
            return Err(ConfigError::InvalidValue(
                "max_refresh_count must be > 0".to_string(),
            ));
        }

        // Session lifetimes
        if self.sessions.idle_lifetime.is_zero() || self.sessions.absolute_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "session lifetimes must be > 0".to_string(),
            ));
        }
        if self.sessions.idle_lifetime > self.sessions.absolute_lifetime {
            return Err(ConfigError::InvalidValue(
                "idle_lifetime cannot exceed absolute_lifetime".to_string(),
            ));
        }
        if self.sessions.cleanup_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "cleanup_interval must be > 0".to_string(),
            ));
        }

        if self.otp.time_step.as_secs() == 0 {
            return Err(ConfigError::InvalidValue(
                "otp time_step must be at least one second".to_string(),
            ));
        }

        for category in RateLimitCategory::ALL {
            let rule = self.rate_limiting.rule(category);
            if rule.points == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "rate_limiting.{category}.points must be > 0"
                )));
            }
            if rule.duration.is_zero() {
                return Err(ConfigError::InvalidValue(format!(
                    "rate_limiting.{category}.duration must be > 0"
                )));
            }
        }

        Ok(())
    }
}

/// Layered loading of [`AuthConfig`] from a TOML file and the environment.
pub mod loader {
    use std::path::Path;

    use config::{Config, Environment, File};

    use super::{AuthConfig, ConfigError};

    /// Loads, merges and validates the configuration.
    ///
    /// The file at `path` is optional; a missing file leaves the defaults in
    /// place. Environment variables override file values, e.g.
    /// `WARDEN__TOKENS__ACCESS_SECRET=...` or `WARDEN__RATE_LIMITING__LOGIN__POINTS=10`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Load` if a source cannot be parsed, or the
    /// validation error if the merged configuration is invalid.
    pub fn load_config(path: Option<&Path>) -> Result<AuthConfig, ConfigError> {
        let mut builder = Config::builder();
        if let Some(p) = path.filter(|p| p.exists()) {
            builder = builder.add_source(File::from(p));
        }
        builder = builder.add_source(
            Environment::with_prefix("WARDEN")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| ConfigError::Load(format!("config build error: {e}")))?;
        let merged: AuthConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::Load(format!("config deserialize error: {e}")))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.tokens.access_secret = "access-secret".to_string();
        config.otp.salt = "salt1".to_string();
        config
    }

    #[test]
    fn test_config_error_maps_to_auth_error() {
        let mut config = valid_config();
        config.otp.salt.clear();

        let err = AuthError::from(config.validate().unwrap_err());
        assert!(matches!(err, AuthError::Configuration { .. }));
        assert!(err.is_server_error());
        assert_eq!(err.error_code(), "configuration_error");
        assert!(err.to_string().contains("otp.salt"));
    }

    #[test]
    fn test_default_config() {
        let config = AuthConfig::default();
        assert_eq!(config.tokens.max_refresh_count, 1000);
        assert_eq!(config.tokens.refresh_race, RefreshRacePolicy::Reject);
        assert_eq!(config.sessions.idle_lifetime, Duration::from_secs(86400));
        assert_eq!(config.rate_limiting.login.points, 5);
        assert_eq!(config.rate_limiting.verification.points, 3);
        assert_eq!(config.otp.time_step, Duration::from_secs(60));
    }

    #[test]
    fn test_defaults_require_secrets() {
        let err = AuthConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_idle_longer_than_absolute_fails_validation() {
        let mut config = valid_config();
        config.sessions.idle_lifetime = Duration::from_secs(31 * 24 * 3600);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("idle_lifetime"));
    }

    #[test]
    fn test_zero_points_fails_validation() {
        let mut config = valid_config();
        config.rate_limiting.two_factor.points = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("two_factor"));
    }

    #[test]
    fn test_zero_refresh_ceiling_fails_validation() {
        let mut config = valid_config();
        config.tokens.max_refresh_count = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_refresh_secret_fallback() {
        let mut config = valid_config();
        assert_eq!(config.tokens.effective_refresh_secret(), "access-secret");
        config.tokens.refresh_secret = "refresh-secret".to_string();
        assert_eq!(config.tokens.effective_refresh_secret(), "refresh-secret");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = valid_config();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("access-secret"));
        assert!(!rendered.contains("salt1"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_deserialize_humantime_durations() {
        let toml = r#"
            issuer = "warden-admin"

            [tokens]
            access_token_lifetime = "15m"
            refresh_token_lifetime = "7d"
            access_secret = "s"
            refresh_race = "treat_as_reuse"

            [rate_limiting.login]
            points = 10
            duration = "5m"
            block_duration = "30m"

            [otp]
            salt = "pepper"
        "#;
        let config: AuthConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.issuer, "warden-admin");
        assert_eq!(
            config.tokens.access_token_lifetime,
            Duration::from_secs(900)
        );
        assert_eq!(config.tokens.refresh_race, RefreshRacePolicy::TreatAsReuse);
        assert_eq!(config.rate_limiting.login.points, 10);
        assert_eq!(
            config.rate_limiting.login.block_duration,
            Duration::from_secs(1800)
        );
        // Untouched sections keep their defaults.
        assert_eq!(config.rate_limiting.refresh.points, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.toml");
        std::fs::write(
            &path,
            "issuer = \"file-issuer\"\n[tokens]\naccess_secret = \"abc\"\n[otp]\nsalt = \"xyz\"\n",
        )
        .unwrap();

        let config = loader::load_config(Some(&path)).unwrap();
        assert_eq!(config.issuer, "file-issuer");
        assert_eq!(config.tokens.access_secret, "abc");
    }

    #[test]
    fn test_load_config_invalid_file_reports_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[tokens\naccess_secret = ").unwrap();

        let err = loader::load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}
