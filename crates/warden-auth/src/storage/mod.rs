//! Storage traits for authentication data.
//!
//! This module defines storage interfaces for:
//!
//! - Sessions
//! - One-time password records
//! - User records (lookup and last-login update)
//!
//! # Implementations
//!
//! Storage implementations are provided in separate crates:
//!
//! - `warden-auth-memory` - in-process storage backend

pub mod otp;
pub mod session;
pub mod user;

pub use otp::{OtpRecord, OtpStore};
pub use session::SessionStore;
pub use user::{UserDirectory, UserUpdate};
