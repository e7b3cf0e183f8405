use std::{env, path::PathBuf, sync::Arc};

use warden_auth::config::loader::load_config;
use warden_auth_memory::InMemoryUserDirectory;
use warden_server::{AuthRuntime, Backends, observability, seed};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From WARDEN_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (warden.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (WARDEN_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // .env is optional
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    observability::init_tracing();

    let (config_path, source) = resolve_config_path();

    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %config_path.display(),
        source = %source,
        "Configuration loaded"
    );

    observability::apply_logging_level(&cfg.log_level);

    let users = Arc::new(InMemoryUserDirectory::new());
    match resolve_seed_path() {
        Some(path) => {
            let seeded = seed::load_seed_users(&path)
                .and_then(|seeds| seed::seed_directory(&users, seeds));
            match seeded {
                Ok(count) => tracing::info!(path = %path.display(), count, "Users seeded"),
                Err(e) => {
                    eprintln!("User seeding failed: {e:#}");
                    std::process::exit(2);
                }
            }
        }
        None => tracing::warn!(
            "No user seed file given (--users or WARDEN_USERS), every login will fail"
        ),
    }

    let runtime = match AuthRuntime::build(cfg, Backends::in_memory(users)) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Auth runtime initialization failed: {e:#}");
            std::process::exit(2);
        }
    };

    let cleanup = runtime.start_background_tasks();
    tracing::info!("Warden auth core running, press Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }

    cleanup.abort();
    tracing::info!("Shutdown complete");
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: WARDEN_CONFIG
/// 3. Default: warden.toml
fn resolve_config_path() -> (PathBuf, ConfigSource) {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (PathBuf::from(path), ConfigSource::CliArgument);
            }
        }
    }

    if let Ok(path) = env::var("WARDEN_CONFIG") {
        if !path.is_empty() {
            return (PathBuf::from(path), ConfigSource::EnvironmentVariable);
        }
    }

    (PathBuf::from("warden.toml"), ConfigSource::Default)
}

/// Seed file path from `--users <path>` or `WARDEN_USERS`.
fn resolve_seed_path() -> Option<PathBuf> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--users" {
            return args.next().map(PathBuf::from);
        }
    }

    env::var("WARDEN_USERS")
        .ok()
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}
