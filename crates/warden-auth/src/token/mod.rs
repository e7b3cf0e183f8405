//! Token generation, validation, and rotation.
//!
//! This module provides:
//!
//! - Access token generation and validation
//! - Refresh token rotation with reuse detection
//! - JWT encoding and decoding

pub mod jwt;
pub mod service;

pub use jwt::{
    AccessTokenClaims, DecodedToken, JwtError, JwtService, RefreshTokenClaims, SigningAlgorithm,
    TokenKind, peek_jti,
};
pub use service::{TokenPair, TokenService};
