//! Composition root for the warden authentication core.
//!
//! [`AuthRuntime`] builds every long-lived service once, from an
//! [`AuthConfig`] and a set of [`Backends`], and hands them out behind `Arc`.
//! An HTTP layer mounts on top of [`AuthRuntime::orchestrator`].

pub mod observability;
pub mod seed;

use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinHandle;
use warden_auth::{
    AllowedChannelsPolicy, AuthConfig, AuthError, AuthOrchestrator, CredentialVerifier,
    IdentityProviders, OtpDelivery, OtpGenerator, OtpStore, OtpTwoFactorVerifier,
    OtpVerificationService, RateLimiter, SessionManager, SessionStore, TokenService,
    UserDirectory,
};
use warden_auth_memory::{
    InMemoryOtpStore, InMemorySessionStore, InMemoryUserDirectory, TracingOtpDelivery,
};

/// Persistence and identity collaborators.
#[derive(Clone)]
pub struct Backends {
    pub sessions: Arc<dyn SessionStore>,
    pub otp: Arc<dyn OtpStore>,
    pub users: Arc<dyn UserDirectory>,
    pub credentials: Arc<dyn CredentialVerifier>,
    pub delivery: Arc<dyn OtpDelivery>,
}

impl Backends {
    /// Process-local backends around an existing user directory.
    pub fn in_memory(users: Arc<InMemoryUserDirectory>) -> Self {
        Self {
            sessions: Arc::new(InMemorySessionStore::new()),
            otp: Arc::new(InMemoryOtpStore::new()),
            users: users.clone(),
            credentials: users,
            delivery: Arc::new(TracingOtpDelivery::new()),
        }
    }
}

/// The constructed service graph.
pub struct AuthRuntime {
    config: AuthConfig,
    limiter: Arc<RateLimiter>,
    sessions: Arc<SessionManager>,
    tokens: Arc<TokenService>,
    verification: Arc<OtpVerificationService>,
    orchestrator: Arc<AuthOrchestrator>,
}

impl AuthRuntime {
    /// Validates `config` and wires the services.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(config: AuthConfig, backends: Backends) -> anyhow::Result<Self> {
        config
            .validate()
            .map_err(AuthError::from)
            .context("invalid auth configuration")?;

        let limiter = Arc::new(RateLimiter::new(config.rate_limiting.clone()));
        let generator = OtpGenerator::new(config.otp.time_step);
        let policy = Arc::new(AllowedChannelsPolicy::new(
            config.policy.api_client_ids.iter().cloned(),
        ));

        let sessions = Arc::new(SessionManager::new(
            backends.sessions,
            config.sessions.clone(),
        ));
        let tokens = Arc::new(TokenService::new(
            &config.issuer,
            config.tokens.clone(),
            sessions.clone(),
            limiter.clone(),
            backends.users.clone(),
            policy.clone(),
        ));
        let verification = Arc::new(OtpVerificationService::new(
            generator,
            config.otp.salt.clone(),
            backends.otp,
            backends.delivery,
            limiter.clone(),
        ));

        let identity = IdentityProviders {
            users: backends.users.clone(),
            credentials: backends.credentials,
            policy,
            two_factor: Arc::new(OtpTwoFactorVerifier::new(
                backends.users,
                generator,
                config.otp.salt.clone(),
            )),
        };

        let orchestrator = Arc::new(AuthOrchestrator::new(
            identity,
            sessions.clone(),
            tokens.clone(),
            verification.clone(),
            limiter.clone(),
        ));

        tracing::info!(
            issuer = %config.issuer,
            algorithm = %config.tokens.algorithm,
            refresh_race = ?config.tokens.refresh_race,
            "Auth runtime built"
        );

        Ok(Self {
            config,
            limiter,
            sessions,
            tokens,
            verification,
            orchestrator,
        })
    }

    /// Spawns the session expiry sweep, which also purges stale rate-limit
    /// buckets and settled one-time code records.
    pub fn start_background_tasks(&self) -> JoinHandle<()> {
        self.sessions.clone().start_cleanup_task(
            Some(self.limiter.clone()),
            Some(self.verification.clone()),
        )
    }

    pub fn orchestrator(&self) -> Arc<AuthOrchestrator> {
        self.orchestrator.clone()
    }

    pub fn sessions(&self) -> Arc<SessionManager> {
        self.sessions.clone()
    }

    pub fn tokens(&self) -> Arc<TokenService> {
        self.tokens.clone()
    }

    pub fn limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}
