//! In-memory backends for warden-auth.
//!
//! This crate provides process-local implementations of the `warden-auth`
//! persistence and identity traits, backed by `dashmap` for concurrent
//! access. They are meant for development, tests and single-node setups.
//!
//! # Example
//!
//! ```ignore
//! use warden_auth_memory::{InMemorySessionStore, InMemoryUserDirectory};
//!
//! let users = InMemoryUserDirectory::new();
//! users.insert(User::new("u1", "bob@example.com"), "correct horse")?;
//!
//! let sessions = SessionManager::new(Arc::new(InMemorySessionStore::new()), settings);
//! ```

mod delivery;
mod otp_store;
pub mod password;
mod session_store;
mod user_directory;

pub use delivery::TracingOtpDelivery;
pub use otp_store::InMemoryOtpStore;
pub use password::{hash_password, verify_password};
pub use session_store::InMemorySessionStore;
pub use user_directory::InMemoryUserDirectory;
