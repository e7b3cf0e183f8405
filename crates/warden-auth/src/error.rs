//! Authentication error types.
//!
//! Every failure path of the core maps to exactly one [`AuthError`] variant so
//! the calling layer can translate it into a distinct, externally observable
//! status. None of these errors is fatal to the process.

use std::fmt;
use std::time::Duration;

use crate::rate_limit::RateLimitCategory;

/// Errors that can occur during authentication, session and token operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The identifier/password pair was rejected.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The user is not permitted to authenticate on the requested channel.
    #[error("Channel not authorized: {channel}")]
    ChannelNotAuthorized {
        /// The channel that was requested.
        channel: String,
    },

    /// The supplied two-factor code did not verify.
    #[error("Invalid two-factor code")]
    InvalidTwoFactorCode,

    /// The supplied one-time verification code did not verify.
    #[error("Invalid verification code")]
    InvalidVerificationCode,

    /// A rate-limit bucket is exhausted for this key.
    #[error("Too many {category} attempts, retry after {}s", retry_after.as_secs())]
    RateLimited {
        /// The bucket that rejected the request.
        category: RateLimitCategory,
        /// How long the caller should wait before trying again.
        retry_after: Duration,
    },

    /// The token could not be parsed or its signature/claims are invalid.
    #[error("Malformed token: {message}")]
    TokenMalformed {
        /// Description of why the token was rejected.
        message: String,
    },

    /// The token is past its `exp` claim.
    #[error("Token expired")]
    TokenExpired,

    /// The session referenced by a token is missing, revoked or past expiry.
    #[error("Session invalid: {message}")]
    SessionInvalid {
        /// Description of why the session is unusable.
        message: String,
    },

    /// A superseded refresh token was presented. All sessions of the user
    /// have been revoked as a side effect.
    #[error("Security violation detected")]
    SecurityViolation,

    /// The session reached a hard limit and has been revoked.
    #[error("Session expired: {message}")]
    SessionExpired {
        /// Which limit ended the session.
        message: String,
    },

    /// The user referenced by a token or identifier no longer exists.
    #[error("User not found")]
    UserNotFound,

    /// An error occurred while storing or retrieving auth data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `ChannelNotAuthorized` error.
    #[must_use]
    pub fn channel_not_authorized(channel: impl Into<String>) -> Self {
        Self::ChannelNotAuthorized {
            channel: channel.into(),
        }
    }

    /// Creates a new `RateLimited` error.
    #[must_use]
    pub fn rate_limited(category: RateLimitCategory, retry_after: Duration) -> Self {
        Self::RateLimited {
            category,
            retry_after,
        }
    }

    /// Creates a new `TokenMalformed` error.
    #[must_use]
    pub fn token_malformed(message: impl Into<String>) -> Self {
        Self::TokenMalformed {
            message: message.into(),
        }
    }

    /// Creates a new `SessionInvalid` error.
    #[must_use]
    pub fn session_invalid(message: impl Into<String>) -> Self {
        Self::SessionInvalid {
            message: message.into(),
        }
    }

    /// Creates a new `SessionExpired` error.
    #[must_use]
    pub fn session_expired(message: impl Into<String>) -> Self {
        Self::SessionExpired {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the caller can fix this by changing the request.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns `true` if this is an infrastructure failure.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. }
        )
    }

    /// Returns `true` if this is a token-related error.
    #[must_use]
    pub fn is_token_error(&self) -> bool {
        matches!(self, Self::TokenMalformed { .. } | Self::TokenExpired)
    }

    /// Returns the retry hint carried by `RateLimited`.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidCredentials
            | Self::InvalidTwoFactorCode
            | Self::InvalidVerificationCode
            | Self::UserNotFound => ErrorCategory::Authentication,
            Self::ChannelNotAuthorized { .. } => ErrorCategory::Authorization,
            Self::RateLimited { .. } => ErrorCategory::Throttling,
            Self::TokenMalformed { .. } | Self::TokenExpired => ErrorCategory::Token,
            Self::SessionInvalid { .. } | Self::SessionExpired { .. } => ErrorCategory::Session,
            Self::SecurityViolation => ErrorCategory::Security,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns a stable machine-readable code for this error.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::ChannelNotAuthorized { .. } => "channel_not_authorized",
            Self::InvalidTwoFactorCode => "invalid_two_factor_code",
            Self::InvalidVerificationCode => "invalid_verification_code",
            Self::RateLimited { .. } => "rate_limited",
            Self::TokenMalformed { .. } => "token_malformed",
            Self::TokenExpired => "token_expired",
            Self::SessionInvalid { .. } => "session_invalid",
            Self::SecurityViolation => "security_violation",
            Self::SessionExpired { .. } => "session_expired",
            Self::UserNotFound => "user_not_found",
            Self::Storage { .. } => "storage_error",
            Self::Configuration { .. } => "configuration_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Returns the HTTP status an outer layer should answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ChannelNotAuthorized { .. } => 403,
            Self::RateLimited { .. } => 429,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. } => 500,
            _ => 401,
        }
    }
}

/// Categories of authentication errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Identity verification failures.
    Authentication,
    /// Permission checks.
    Authorization,
    /// Rate limiting.
    Throttling,
    /// Token decoding and expiry.
    Token,
    /// Session state.
    Session,
    /// Detected token theft.
    Security,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Throttling => write!(f, "throttling"),
            Self::Token => write!(f, "token"),
            Self::Session => write!(f, "session"),
            Self::Security => write!(f, "security"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::channel_not_authorized("mobile");
        assert_eq!(err.to_string(), "Channel not authorized: mobile");

        let err = AuthError::rate_limited(RateLimitCategory::Login, Duration::from_secs(3600));
        assert_eq!(err.to_string(), "Too many login attempts, retry after 3600s");

        let err = AuthError::session_expired("maximum refresh count exceeded");
        assert_eq!(
            err.to_string(),
            "Session expired: maximum refresh count exceeded"
        );
    }

    #[test]
    fn test_error_predicates() {
        assert!(AuthError::TokenExpired.is_client_error());
        assert!(AuthError::TokenExpired.is_token_error());
        assert!(!AuthError::SecurityViolation.is_token_error());

        let err = AuthError::storage("database down");
        assert!(err.is_server_error());
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_retry_after() {
        let err = AuthError::rate_limited(RateLimitCategory::Refresh, Duration::from_secs(300));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(300)));
        assert_eq!(AuthError::InvalidCredentials.retry_after(), None);
    }

    #[test]
    fn test_status_codes_are_distinct_per_disposition() {
        assert_eq!(AuthError::InvalidCredentials.status_code(), 401);
        assert_eq!(AuthError::channel_not_authorized("web").status_code(), 403);
        assert_eq!(
            AuthError::rate_limited(RateLimitCategory::TwoFactor, Duration::ZERO).status_code(),
            429
        );
        assert_eq!(AuthError::internal("boom").status_code(), 500);
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthError::SecurityViolation.category(),
            ErrorCategory::Security
        );
        assert_eq!(
            AuthError::session_invalid("revoked").category(),
            ErrorCategory::Session
        );
        assert_eq!(ErrorCategory::Throttling.to_string(), "throttling");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(AuthError::SecurityViolation.error_code(), "security_violation");
        assert_eq!(
            AuthError::token_malformed("bad").error_code(),
            "token_malformed"
        );
        assert_eq!(AuthError::UserNotFound.error_code(), "user_not_found");
    }
}
