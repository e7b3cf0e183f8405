//! Token service for issuing, rotating and validating tokens.
//!
//! This module provides the token service that handles:
//!
//! - Access token generation
//! - Refresh token generation and rotation with reuse detection
//! - Signature/expiry verification for logout and session inspection
//! - Channel/client authorization checks for presented tokens
//!
//! # Usage
//!
//! ```ignore
//! use warden_auth::token::TokenService;
//!
//! let service = TokenService::new(&config.issuer, config.tokens.clone(), sessions, limiter, users, policy);
//!
//! let pair = service.refresh_access_token(&refresh_token).await?;
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::config::{RefreshRacePolicy, TokenSettings};
use crate::error::AuthError;
use crate::identity::{PolicyService, User};
use crate::rate_limit::{RateLimitCategory, RateLimiter};
use crate::session::{RevocationReason, Session, SessionManager};
use crate::storage::UserDirectory;
use crate::token::jwt::{
    AccessTokenClaims, DecodedToken, JwtService, RefreshTokenClaims, TokenKind, peek_jti,
};

/// Channel assumed for sessions that did not record one.
const DEFAULT_CHANNEL: &str = "web";

/// Tokens handed to the client after login or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived bearer token.
    pub access_token: String,
    /// Rotation token, valid for exactly one refresh.
    pub refresh_token: String,
    /// Session both tokens are bound to.
    #[serde(rename = "sessionId")]
    pub session_id: Uuid,
}

/// Token service for generating and rotating tokens.
pub struct TokenService {
    /// Signs and verifies access tokens.
    access_jwt: JwtService,

    /// Signs and verifies refresh tokens.
    refresh_jwt: JwtService,

    /// Session lifecycle.
    sessions: Arc<SessionManager>,

    /// Refresh throttling.
    limiter: Arc<RateLimiter>,

    /// User lookup.
    users: Arc<dyn UserDirectory>,

    /// Channel/client policy.
    policy: Arc<dyn PolicyService>,

    /// Service configuration.
    settings: TokenSettings,
}

impl TokenService {
    /// Creates a new token service.
    ///
    /// Access and refresh tokens are signed with separate secrets; the
    /// refresh secret falls back to the access secret when unset.
    #[must_use]
    pub fn new(
        issuer: &str,
        settings: TokenSettings,
        sessions: Arc<SessionManager>,
        limiter: Arc<RateLimiter>,
        users: Arc<dyn UserDirectory>,
        policy: Arc<dyn PolicyService>,
    ) -> Self {
        let access_jwt = JwtService::new(
            settings.access_secret.as_bytes(),
            settings.algorithm,
            issuer,
        );
        let refresh_jwt = JwtService::new(
            settings.effective_refresh_secret().as_bytes(),
            settings.algorithm,
            issuer,
        );

        Self {
            access_jwt,
            refresh_jwt,
            sessions,
            limiter,
            users,
            policy,
            settings,
        }
    }

    /// Signs an access token for `user` bound to `session_id`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if signing fails.
    pub fn issue_access_token(
        &self,
        user: &User,
        session_id: Uuid,
        channel: &str,
    ) -> AuthResult<String> {
        let now = OffsetDateTime::now_utc();
        let claims = AccessTokenClaims {
            iss: self.access_jwt.issuer().to_string(),
            sub: user.id.clone(),
            email: user.email.clone(),
            channel: channel.to_string(),
            session_id,
            token_use: TokenKind::Access,
            iat: now.unix_timestamp(),
            exp: (now + self.settings.access_token_lifetime).unix_timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        tracing::debug!(user_id = %user.id, session_id = %session_id, channel, "Generating access token");
        Ok(self.access_jwt.encode(&claims)?)
    }

    /// Signs a refresh token for version `version` of `family`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if signing fails.
    pub fn issue_refresh_token(
        &self,
        user_id: &str,
        session_id: Uuid,
        family: &str,
        version: u32,
    ) -> AuthResult<String> {
        let now = OffsetDateTime::now_utc();
        let claims = RefreshTokenClaims {
            iss: self.refresh_jwt.issuer().to_string(),
            sub: user_id.to_string(),
            token_family: family.to_string(),
            session_id,
            version,
            token_use: TokenKind::Refresh,
            iat: now.unix_timestamp(),
            exp: (now + self.settings.refresh_token_lifetime).unix_timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        tracing::debug!(user_id, session_id = %session_id, version, "Generating refresh token");
        Ok(self.refresh_jwt.encode(&claims)?)
    }

    /// Issues the token pair for the current version of `session`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if signing fails.
    pub fn issue_token_pair(&self, user: &User, session: &Session) -> AuthResult<TokenPair> {
        let channel = session.channel().unwrap_or(DEFAULT_CHANNEL);
        Ok(TokenPair {
            access_token: self.issue_access_token(user, session.id, channel)?,
            refresh_token: self.issue_refresh_token(
                &user.id,
                session.id,
                &session.refresh_token_family,
                session.token_version,
            )?,
            session_id: session.id,
        })
    }

    /// Verifies signature and expiry of a token of the given kind.
    ///
    /// No session lookup happens here.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenExpired` if the token is past `exp`, and
    /// `AuthError::TokenMalformed` for any other decoding failure, including
    /// a token of the other kind.
    pub fn decode_and_verify(&self, token: &str, kind: TokenKind) -> AuthResult<DecodedToken> {
        match kind {
            TokenKind::Access => self.decode_access(token).map(DecodedToken::Access),
            TokenKind::Refresh => self.decode_refresh(token).map(DecodedToken::Refresh),
        }
    }

    /// Verifies an access token and returns its claims.
    ///
    /// # Errors
    ///
    /// See [`decode_and_verify`](Self::decode_and_verify).
    pub fn decode_access(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        let claims: AccessTokenClaims = self.access_jwt.decode(token).inspect_err(|e| {
            tracing::debug!(error = %e, "Access token verification failed");
        })?;
        if claims.token_use != TokenKind::Access {
            return Err(AuthError::token_malformed("not an access token"));
        }
        Ok(claims)
    }

    /// Verifies a refresh token and returns its claims.
    ///
    /// # Errors
    ///
    /// See [`decode_and_verify`](Self::decode_and_verify).
    pub fn decode_refresh(&self, token: &str) -> AuthResult<RefreshTokenClaims> {
        let claims: RefreshTokenClaims = self.refresh_jwt.decode(token).inspect_err(|e| {
            tracing::debug!(error = %e, "Refresh token verification failed");
        })?;
        if claims.token_use != TokenKind::Refresh {
            return Err(AuthError::token_malformed("not a refresh token"));
        }
        Ok(claims)
    }

    /// Redeems a refresh token for a new token pair.
    ///
    /// The presented token must carry the session's current family and
    /// version. Redeeming advances the session version, so each refresh
    /// token works at most once.
    ///
    /// # Errors
    ///
    /// - `RateLimited` if the token's jti exhausted its refresh budget
    /// - `TokenMalformed` / `TokenExpired` if verification fails
    /// - `SessionInvalid` if the session is missing, revoked, expired, or was
    ///   refreshed concurrently (under the `reject` race policy)
    /// - `SecurityViolation` if a superseded token was presented; every
    ///   session of the user is revoked
    /// - `SessionExpired` if the refresh ceiling was reached; the session is
    ///   revoked
    /// - `UserNotFound` if the subject no longer exists
    pub async fn refresh_access_token(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        // 1. Throttle by token id before spending time on verification
        let jti = peek_jti(refresh_token)?;
        self.limiter.consume(RateLimitCategory::Refresh, &jti)?;

        // 2. Verify signature and expiry
        let claims = self.decode_refresh(refresh_token)?;

        // 3. Load session
        let session = self
            .sessions
            .find(claims.session_id)
            .await?
            .ok_or_else(|| AuthError::session_invalid("session not found"))?;

        if session.is_revoked {
            return Err(AuthError::session_invalid("session revoked"));
        }
        if session.user_id != claims.sub {
            return Err(AuthError::session_invalid("session belongs to another user"));
        }

        // 4. Reuse detection
        if session.refresh_token_family != claims.token_family
            || session.token_version != claims.version
        {
            tracing::warn!(
                user_id = %claims.sub,
                session_id = %session.id,
                presented_version = claims.version,
                current_version = session.token_version,
                "Refresh token reuse detected, revoking all user sessions"
            );
            self.sessions
                .invalidate_all_for_user(&claims.sub, RevocationReason::TokenReuse)
                .await?;
            return Err(AuthError::SecurityViolation);
        }

        if !session.is_active_at(OffsetDateTime::now_utc()) {
            return Err(AuthError::session_invalid("session expired"));
        }

        // 5. Refresh ceiling
        if session.refresh_count >= self.settings.max_refresh_count {
            let reason = RevocationReason::RefreshLimitExceeded;
            self.sessions.invalidate(session.id, reason).await?;
            tracing::info!(session_id = %session.id, "Session reached refresh ceiling");
            return Err(AuthError::session_expired(reason.as_str()));
        }

        // 6. Load user
        let user = self
            .users
            .find_by_id(&claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        // 7. Issue rotated tokens
        let channel = session.channel().unwrap_or(DEFAULT_CHANNEL);
        let access_token = self.issue_access_token(&user, session.id, channel)?;
        let refresh_token = self.issue_refresh_token(
            &user.id,
            session.id,
            &claims.token_family,
            claims.version + 1,
        )?;

        // 8. Commit the rotation only if nobody else did first
        if self.sessions.update_after_refresh(&session).await?.is_none() {
            return Err(self.lost_refresh_race(&claims).await);
        }

        // 9. Build response
        tracing::debug!(
            user_id = %user.id,
            session_id = %session.id,
            token_version = claims.version + 1,
            "Token refreshed"
        );

        Ok(TokenPair {
            access_token,
            refresh_token,
            session_id: session.id,
        })
    }

    async fn lost_refresh_race(&self, claims: &RefreshTokenClaims) -> AuthError {
        match self.settings.refresh_race {
            RefreshRacePolicy::Reject => {
                tracing::warn!(
                    user_id = %claims.sub,
                    session_id = %claims.session_id,
                    "Concurrent refresh lost version check, rejecting"
                );
                AuthError::session_invalid("session was refreshed concurrently")
            }
            RefreshRacePolicy::TreatAsReuse => {
                tracing::warn!(
                    user_id = %claims.sub,
                    session_id = %claims.session_id,
                    "Concurrent refresh lost version check, treating as token reuse"
                );
                match self
                    .sessions
                    .invalidate_all_for_user(&claims.sub, RevocationReason::TokenReuse)
                    .await
                {
                    Ok(_) => AuthError::SecurityViolation,
                    Err(e) => e,
                }
            }
        }
    }

    /// Checks whether `user_id` may use a token on `channel`, optionally as
    /// `client_id`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user does not exist.
    pub async fn validate_token(
        &self,
        user_id: &str,
        channel: &str,
        client_id: Option<&str>,
    ) -> AuthResult<bool> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let valid = self.policy.is_client_authorized(&user, channel, client_id);
        tracing::debug!(user_id, channel, client_id, valid, "Token validation result");
        Ok(valid)
    }

    /// Returns the service configuration.
    #[must_use]
    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }
}
