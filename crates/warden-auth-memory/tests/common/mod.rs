#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use warden_auth::config::{RateLimitSettings, SessionSettings, TokenSettings};
use warden_auth::{
    AllowedChannelsPolicy, AuthOrchestrator, IdentityProviders, LoginRequest, OtpGenerator,
    OtpTwoFactorVerifier, OtpVerificationService, RateLimiter, RefreshRacePolicy, SessionManager,
    TokenPair, TokenService, User,
};
use warden_auth_memory::{
    InMemoryOtpStore, InMemorySessionStore, InMemoryUserDirectory, TracingOtpDelivery,
};

pub const SALT: &str = "salt1";
pub const BOB_PASSWORD: &str = "correct horse battery staple";

pub struct Stack {
    pub store: Arc<InMemorySessionStore>,
    pub users: Arc<InMemoryUserDirectory>,
    pub delivery: Arc<TracingOtpDelivery>,
    pub sessions: Arc<SessionManager>,
    pub tokens: Arc<TokenService>,
    pub orchestrator: AuthOrchestrator,
}

pub fn stack() -> Stack {
    stack_with(RefreshRacePolicy::Reject)
}

pub fn stack_with(refresh_race: RefreshRacePolicy) -> Stack {
    let store = Arc::new(InMemorySessionStore::new());
    let users = Arc::new(InMemoryUserDirectory::new());
    let delivery = Arc::new(TracingOtpDelivery::capturing());
    let limiter = Arc::new(RateLimiter::new(RateLimitSettings::default()));
    let policy = Arc::new(AllowedChannelsPolicy::default());
    let generator = OtpGenerator::new(Duration::from_secs(60));

    let mut bob = User::new("u1", "bob@example.com");
    bob.mobile = Some("+15550001234".to_string());
    bob.allowed_channels = vec!["web".to_string(), "mobile".to_string()];
    users.insert(bob, BOB_PASSWORD).expect("insert bob");

    let sessions = Arc::new(SessionManager::new(store.clone(), SessionSettings::default()));
    let tokens = Arc::new(TokenService::new(
        "warden-it",
        TokenSettings {
            access_secret: "it-access-secret".to_string(),
            refresh_secret: "it-refresh-secret".to_string(),
            refresh_race,
            ..TokenSettings::default()
        },
        sessions.clone(),
        limiter.clone(),
        users.clone(),
        policy.clone(),
    ));
    let verification = Arc::new(OtpVerificationService::new(
        generator,
        SALT,
        Arc::new(InMemoryOtpStore::new()),
        delivery.clone(),
        limiter.clone(),
    ));

    let identity = IdentityProviders {
        users: users.clone(),
        credentials: users.clone(),
        policy,
        two_factor: Arc::new(OtpTwoFactorVerifier::new(users.clone(), generator, SALT)),
    };

    Stack {
        store,
        users,
        delivery,
        sessions: sessions.clone(),
        tokens: tokens.clone(),
        orchestrator: AuthOrchestrator::new(identity, sessions, tokens, verification, limiter),
    }
}

pub async fn login(stack: &Stack, channel: &str) -> TokenPair {
    stack
        .orchestrator
        .login(LoginRequest::new("bob@example.com", BOB_PASSWORD, channel))
        .await
        .expect("login")
        .into_tokens()
        .expect("no second factor for bob")
}
