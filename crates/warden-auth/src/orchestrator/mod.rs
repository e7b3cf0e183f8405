//! Caller-facing authentication flows.
//!
//! [`AuthOrchestrator`] is the one component an HTTP layer talks to. It
//! composes the rate limiter, the external identity collaborators, the
//! session manager and the token service into:
//!
//! - password login (with optional second factor)
//! - one-time code login
//! - logout and logout everywhere
//! - refresh, token validation and session introspection
//!
//! # Usage
//!
//! ```ignore
//! let outcome = orchestrator
//!     .login(LoginRequest::new("bob@example.com", password, "web"))
//!     .await?;
//!
//! match outcome {
//!     LoginOutcome::Authenticated(pair) => respond_with(pair),
//!     LoginOutcome::RequiresTwoFactor => prompt_for_code(),
//! }
//! ```

pub mod request;

pub use request::{LoginOutcome, LoginRequest, OtpLoginRequest};

use std::sync::Arc;

use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::identity::{CredentialVerifier, PolicyService, TwoFactorVerifier, User};
use crate::rate_limit::{RateLimitCategory, RateLimiter};
use crate::session::{LoginMethod, NewSession, RevocationReason, Session, SessionManager};
use crate::storage::{UserDirectory, UserUpdate};
use crate::token::{AccessTokenClaims, TokenPair, TokenService};
use crate::verification::OtpVerificationService;

/// External collaborators bound to one user role.
#[derive(Clone)]
pub struct IdentityProviders {
    pub users: Arc<dyn UserDirectory>,
    pub credentials: Arc<dyn CredentialVerifier>,
    pub policy: Arc<dyn PolicyService>,
    pub two_factor: Arc<dyn TwoFactorVerifier>,
}

/// Entry point for login, logout and refresh.
pub struct AuthOrchestrator {
    identity: IdentityProviders,
    sessions: Arc<SessionManager>,
    tokens: Arc<TokenService>,
    verification: Arc<OtpVerificationService>,
    limiter: Arc<RateLimiter>,
}

impl AuthOrchestrator {
    /// Creates an orchestrator over already constructed services.
    #[must_use]
    pub fn new(
        identity: IdentityProviders,
        sessions: Arc<SessionManager>,
        tokens: Arc<TokenService>,
        verification: Arc<OtpVerificationService>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            identity,
            sessions,
            tokens,
            verification,
            limiter,
        }
    }

    /// Authenticates with identifier and password.
    ///
    /// # Returns
    ///
    /// `LoginOutcome::RequiresTwoFactor` when the account has two-factor
    /// enabled and the request carries no code; no session is created in
    /// that case.
    ///
    /// # Errors
    ///
    /// - `RateLimited` if the login bucket for the identifier, or the
    ///   two-factor bucket for the user, is exhausted
    /// - `InvalidCredentials` if the identifier/password pair is unknown
    /// - `ChannelNotAuthorized` if the policy denies the channel
    /// - `InvalidTwoFactorCode` if the supplied code is rejected
    pub async fn login(&self, request: LoginRequest) -> AuthResult<LoginOutcome> {
        // 1. Throttle by identifier
        self.limiter
            .consume(RateLimitCategory::Login, &request.identifier)?;

        // 2. Credentials
        let user = self
            .identity
            .credentials
            .verify(&request.identifier, &request.password)
            .await?
            .ok_or_else(|| {
                tracing::warn!(channel = %request.channel, "Login failed: invalid credentials");
                AuthError::InvalidCredentials
            })?;

        // 3. Channel policy
        self.ensure_channel(&user, &request.channel)?;

        // 4. Second factor
        if user.two_factor_enabled {
            let Some(code) = request.two_factor_code.as_deref() else {
                tracing::debug!(user_id = %user.id, "Login requires second factor");
                return Ok(LoginOutcome::RequiresTwoFactor);
            };

            self.limiter.consume(RateLimitCategory::TwoFactor, &user.id)?;
            if !self.identity.two_factor.verify(&user.id, code).await? {
                tracing::warn!(user_id = %user.id, "Login failed: invalid two-factor code");
                return Err(AuthError::InvalidTwoFactorCode);
            }
        }

        // 5. Session and tokens
        let pair = self
            .establish_session(
                &user,
                &request.identifier,
                &request.channel,
                request.user_agent,
                LoginMethod::Password,
            )
            .await?;

        Ok(LoginOutcome::Authenticated(pair))
    }

    /// Sends a one-time code to the user identified by `identifier`.
    ///
    /// Returns the verification reference.
    ///
    /// # Errors
    ///
    /// Returns `RateLimited` if the verification bucket is exhausted, or
    /// `UserNotFound` if no user has that identifier. The bucket is charged
    /// before the lookup, unknown identifiers included.
    pub async fn initiate_otp_login(&self, identifier: &str) -> AuthResult<String> {
        self.limiter
            .consume(RateLimitCategory::Verification, identifier)?;

        if self
            .identity
            .users
            .find_by_identifier(identifier)
            .await?
            .is_none()
        {
            return Err(AuthError::UserNotFound);
        }

        self.verification.issue_code(identifier).await
    }

    /// Completes a one-time code login.
    ///
    /// # Errors
    ///
    /// - `RateLimited` if the verification bucket is exhausted
    /// - `UserNotFound` if no user has the identifier
    /// - `ChannelNotAuthorized` if the policy denies the channel
    /// - `InvalidVerificationCode` if the code does not confirm
    pub async fn complete_otp_login(&self, request: OtpLoginRequest) -> AuthResult<TokenPair> {
        self.limiter
            .consume(RateLimitCategory::Verification, &request.identifier)?;

        let user = self
            .identity
            .users
            .find_by_identifier(&request.identifier)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        self.ensure_channel(&user, &request.channel)?;

        if !self
            .verification
            .confirm_pending(&request.identifier, &request.code)
            .await?
        {
            tracing::warn!(user_id = %user.id, "OTP login failed: code not confirmed");
            return Err(AuthError::InvalidVerificationCode);
        }

        self.establish_session(
            &user,
            &request.identifier,
            &request.channel,
            request.user_agent,
            LoginMethod::Otp,
        )
        .await
    }

    /// Verifies an access token and requires its session to still be
    /// usable. Records activity on the session.
    ///
    /// # Errors
    ///
    /// Returns a token error if the access token does not verify, or
    /// `SessionInvalid` if its session is revoked, expired or unknown.
    pub async fn authenticate(&self, access_token: &str) -> AuthResult<AccessTokenClaims> {
        let claims = self.tokens.decode_access(access_token)?;

        if !self.sessions.is_valid(claims.session_id).await? {
            tracing::warn!(
                user_id = %claims.sub,
                session_id = %claims.session_id,
                "Access token presented for an unusable session"
            );
            return Err(AuthError::session_invalid("session expired"));
        }

        Ok(claims)
    }

    /// Revokes the session an access token belongs to.
    ///
    /// # Errors
    ///
    /// Returns a token error if the access token does not verify, or
    /// `SessionInvalid` if its session is no longer usable or is owned by
    /// someone else.
    pub async fn logout(&self, access_token: &str) -> AuthResult<()> {
        let claims = self.authenticate(access_token).await?;

        let session = self
            .sessions
            .find(claims.session_id)
            .await?
            .ok_or_else(|| AuthError::session_invalid("session not found"))?;

        if session.user_id != claims.sub {
            tracing::warn!(
                user_id = %claims.sub,
                session_id = %session.id,
                "Logout attempted for a session of another user"
            );
            return Err(AuthError::session_invalid("session belongs to another user"));
        }

        self.sessions
            .invalidate(session.id, RevocationReason::UserLogout)
            .await?;

        tracing::info!(user_id = %claims.sub, session_id = %session.id, "User logged out");
        Ok(())
    }

    /// Revokes every session of the access token's subject.
    ///
    /// Returns the number of sessions revoked.
    ///
    /// # Errors
    ///
    /// Returns a token error if the access token does not verify, or
    /// `SessionInvalid` if its session is no longer usable.
    pub async fn logout_all(&self, access_token: &str) -> AuthResult<u64> {
        let claims = self.authenticate(access_token).await?;

        let revoked = self
            .sessions
            .invalidate_all_for_user(&claims.sub, RevocationReason::UserLogoutAllDevices)
            .await?;

        tracing::info!(user_id = %claims.sub, revoked, "User logged out of all devices");
        Ok(revoked)
    }

    /// Rotates a refresh token. See [`TokenService::refresh_access_token`].
    ///
    /// # Errors
    ///
    /// See [`TokenService::refresh_access_token`].
    pub async fn refresh_access_token(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        self.tokens.refresh_access_token(refresh_token).await
    }

    /// Checks whether `user_id` may act on `channel`, optionally as
    /// `client_id`.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` if the user does not exist.
    pub async fn validate_token(
        &self,
        user_id: &str,
        channel: &str,
        client_id: Option<&str>,
    ) -> AuthResult<bool> {
        self.tokens.validate_token(user_id, channel, client_id).await
    }

    /// Lists the usable sessions of `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn list_active_sessions(&self, user_id: &str) -> AuthResult<Vec<Session>> {
        self.sessions.list_active_sessions(user_id).await
    }

    /// Lists the usable sessions of the access token's subject.
    ///
    /// # Errors
    ///
    /// Returns a token error if the access token does not verify, or
    /// `SessionInvalid` if its session is no longer usable.
    pub async fn sessions_for_token(&self, access_token: &str) -> AuthResult<Vec<Session>> {
        let claims = self.authenticate(access_token).await?;
        self.sessions.list_active_sessions(&claims.sub).await
    }

    fn ensure_channel(&self, user: &User, channel: &str) -> AuthResult<()> {
        if self.identity.policy.is_channel_authorized(user, channel) {
            return Ok(());
        }
        tracing::warn!(user_id = %user.id, channel, "Login refused on channel");
        Err(AuthError::channel_not_authorized(channel))
    }

    async fn establish_session(
        &self,
        user: &User,
        identifier: &str,
        channel: &str,
        user_agent: Option<String>,
        method: LoginMethod,
    ) -> AuthResult<TokenPair> {
        let mut request = NewSession::new(&user.id, channel).with_login_method(method);
        request.user_agent = user_agent;

        let session = self.sessions.create_session(request).await?;
        let pair = self.tokens.issue_token_pair(user, &session)?;

        self.identity
            .users
            .update(
                &user.id,
                UserUpdate {
                    last_login_at: Some(OffsetDateTime::now_utc()),
                },
            )
            .await?;

        self.limiter.reset(identifier);
        self.limiter.reset(&user.id);

        tracing::info!(
            user_id = %user.id,
            session_id = %session.id,
            channel,
            method = method.as_str(),
            "Login succeeded"
        );

        Ok(pair)
    }
}
