//! Inputs and outcomes of the orchestrator flows.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::token::TokenPair;

/// Password login.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Email address or mobile number.
    pub identifier: String,
    pub password: String,
    pub channel: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Second factor, when the client already has one.
    #[serde(default)]
    pub two_factor_code: Option<String>,
}

impl LoginRequest {
    #[must_use]
    pub fn new(
        identifier: impl Into<String>,
        password: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            password: password.into(),
            channel: channel.into(),
            user_agent: None,
            two_factor_code: None,
        }
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    #[must_use]
    pub fn with_two_factor_code(mut self, code: impl Into<String>) -> Self {
        self.two_factor_code = Some(code.into());
        self
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("identifier", &self.identifier)
            .field("password", &"[REDACTED]")
            .field("channel", &self.channel)
            .field("user_agent", &self.user_agent)
            .field(
                "two_factor_code",
                &self.two_factor_code.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Second step of a one-time code login.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpLoginRequest {
    pub identifier: String,
    pub code: String,
    pub channel: String,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl fmt::Debug for OtpLoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtpLoginRequest")
            .field("identifier", &self.identifier)
            .field("code", &"[REDACTED]")
            .field("channel", &self.channel)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Result of a password login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginOutcome {
    /// A session was created.
    Authenticated(TokenPair),
    /// Credentials were valid but the account needs a second factor. No
    /// session was created.
    RequiresTwoFactor,
}

impl LoginOutcome {
    /// The issued tokens, if the login completed.
    #[must_use]
    pub fn into_tokens(self) -> Option<TokenPair> {
        match self {
            Self::Authenticated(pair) => Some(pair),
            Self::RequiresTwoFactor => None,
        }
    }
}
