//! Bootstrap helpers for tezgate.
//!
//! Runs before `Config` is resolved: loads `~/.tezgate/.env` and installs the
//! tracing subscriber.
//!
//! File: `~/.tezgate/.env` (standard dotenvy format)

use std::path::PathBuf;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Path to the tezgate-specific `.env` file: `~/.tezgate/.env`.
pub fn tezgate_env_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tezgate")
        .join(".env")
}

/// Load env vars from `~/.tezgate/.env` (in addition to the standard `.env`).
///
/// Call this **after** `dotenvy::dotenv()` so that the standard `./.env`
/// takes priority over `~/.tezgate/.env`. dotenvy never overwrites
/// existing env vars, so the effective priority is:
///
///   explicit env vars > `./.env` > `~/.tezgate/.env`
fn load_tezgate_env() {
    let path = tezgate_env_path();
    if path.exists()
        && let Err(e) = dotenvy::from_path(&path)
    {
        eprintln!("Warning: failed to load {}: {}", path.display(), e);
    }
}

/// Load `./.env`, then `~/.tezgate/.env`. Neither overwrites variables that
/// are already set, so repeated calls are harmless.
pub fn load_env_files() {
    let _ = dotenvy::dotenv();
    load_tezgate_env();
}

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// `TEZGATE_LOG_FORMAT=json` selects JSON lines; anything else is pretty.
    pub fn from_env() -> Self {
        match std::env::var("TEZGATE_LOG_FORMAT") {
            Ok(v) if v.trim().eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the default
/// `tezgate=info` filter.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "tezgate=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}
