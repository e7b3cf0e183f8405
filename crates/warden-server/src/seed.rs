//! Bootstrap users for the in-memory directory.
//!
//! The seed file is TOML with one `[[users]]` table per account:
//!
//! ```toml
//! [[users]]
//! id = "u1"
//! email = "bob@example.com"
//! mobile = "+15550001234"
//! password = "correct horse"
//! allowed_channels = ["web", "mobile"]
//! ```

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use warden_auth::User;
use warden_auth_memory::InMemoryUserDirectory;

#[derive(Deserialize)]
pub struct SeedUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub mobile: Option<String>,
    pub password: String,
    #[serde(default)]
    pub allowed_channels: Vec<String>,
    /// Enables two-factor login with this OTP secret.
    #[serde(default)]
    pub two_factor_secret: Option<String>,
}

#[derive(Deserialize)]
struct SeedFile {
    #[serde(default)]
    users: Vec<SeedUser>,
}

/// Reads the users listed in the seed file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid TOML.
pub fn load_seed_users(path: &Path) -> anyhow::Result<Vec<SeedUser>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading seed file {}", path.display()))?;
    let file: SeedFile =
        toml::from_str(&raw).with_context(|| format!("parsing seed file {}", path.display()))?;
    Ok(file.users)
}

/// Inserts `users` into `directory`, hashing their passwords. Returns the
/// number of users added.
///
/// # Errors
///
/// Returns an error if a password cannot be hashed.
pub fn seed_directory(
    directory: &InMemoryUserDirectory,
    users: Vec<SeedUser>,
) -> anyhow::Result<usize> {
    let count = users.len();
    for seed in users {
        let mut user = User::new(seed.id, seed.email);
        user.mobile = seed.mobile;
        user.allowed_channels = seed.allowed_channels;
        user.two_factor_enabled = seed.two_factor_secret.is_some();
        user.two_factor_secret = seed.two_factor_secret;

        let id = user.id.clone();
        directory
            .insert(user, &seed.password)
            .with_context(|| format!("seeding user {id}"))?;
    }
    Ok(count)
}
