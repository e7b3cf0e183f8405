//! # warden-auth
//!
//! Authentication security core.
//!
//! This crate provides:
//! - Session lifecycle with sliding and absolute expiry
//! - Rotating refresh tokens with reuse (theft) detection
//! - Deterministic time-windowed one-time codes
//! - Point-bucket rate limiting for login, refresh and verification
//! - An orchestrator composing the above into login/logout/refresh flows
//!
//! ## Overview
//!
//! Every login opens a [`Session`] that anchors a token family. Each refresh
//! advances the session's version; presenting a superseded refresh token is
//! treated as theft and revokes every session of the user.
//!
//! Persistence and identity are collaborators behind traits in [`storage`]
//! and [`identity`]; `warden-auth-memory` ships in-process implementations.
//!
//! ## Modules
//!
//! - [`config`] - Configuration and loader
//! - [`error`] - Error taxonomy
//! - [`identity`] - User model and identity collaborators
//! - [`orchestrator`] - Caller-facing flows
//! - [`otp`] - One-time code generator
//! - [`rate_limit`] - Point-bucket rate limiter
//! - [`session`] - Session model and lifecycle manager
//! - [`storage`] - Persistence traits
//! - [`token`] - JWT codec and token service
//! - [`verification`] - One-time code issue/confirm flow

pub mod config;
pub mod error;
pub mod identity;
pub mod orchestrator;
pub mod otp;
pub mod rate_limit;
pub mod session;
pub mod storage;
pub mod token;
pub mod verification;

#[cfg(test)]
mod testing;

pub use config::{AuthConfig, ConfigError, RefreshRacePolicy};
pub use error::{AuthError, ErrorCategory};
pub use identity::{
    AccessLevel, AllowedChannelsPolicy, CredentialVerifier, OtpTwoFactorVerifier, PolicyService,
    TwoFactorVerifier, User, UserStatus,
};
pub use orchestrator::{
    AuthOrchestrator, IdentityProviders, LoginOutcome, LoginRequest, OtpLoginRequest,
};
pub use otp::OtpGenerator;
pub use rate_limit::{RateLimitCategory, RateLimitRule, RateLimiter};
pub use session::{
    CleanupReport, LoginMethod, NewSession, RevocationReason, Session, SessionManager,
};
pub use storage::{OtpRecord, OtpStore, SessionStore, UserDirectory, UserUpdate};
pub use token::{
    AccessTokenClaims, JwtError, SigningAlgorithm, TokenKind, TokenPair, TokenService,
};
pub use verification::{OtpDelivery, OtpVerificationService};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use warden_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::identity::{CredentialVerifier, PolicyService, TwoFactorVerifier, User};
    pub use crate::orchestrator::{
        AuthOrchestrator, IdentityProviders, LoginOutcome, LoginRequest, OtpLoginRequest,
    };
    pub use crate::session::{Session, SessionManager};
    pub use crate::storage::{OtpStore, SessionStore, UserDirectory};
    pub use crate::token::TokenPair;
    pub use crate::verification::OtpDelivery;
}
