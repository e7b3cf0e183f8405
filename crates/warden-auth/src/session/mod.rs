//! Session lifecycle.
//!
//! ```text
//! ACTIVE(v) --refresh--> ACTIVE(v+1)
//! ACTIVE    --logout | reuse | idle expiry | absolute expiry | refresh ceiling--> REVOKED
//! ```
//!
//! `REVOKED` is terminal.

pub mod manager;
pub mod model;

pub use manager::SessionManager;
pub use model::{CleanupReport, LoginMethod, NewSession, RevocationReason, Session};
