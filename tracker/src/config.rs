//! Configuration module for environment variable parsing.
//!
//! Reads all tracking-core configuration from environment variables. The
//! debug-vs-production selection and the rest of the settings surface live
//! in the embedding application.

use std::env;
use std::path::PathBuf;

use tracing::warn;

/// Signing key used when none is configured. Fine for development, useless
/// against anyone who has read the source.
const DEFAULT_TOKEN_KEY: &str = "mailbeacon-insecure-dev-key";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding one JSON record per post
    pub post_store_dir: PathBuf,

    /// Signing key for tracking tokens.
    ///
    /// Tokens embed an HMAC tag under this key, so it must stay stable
    /// across restarts or every in-flight pixel URL stops decoding.
    pub token_key: String,

    /// Upper bound in milliseconds on waiting for a post's write lock
    pub lock_wait_ms: u64,

    /// Base URL the tracking pixel is served from
    pub tracking_base_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let token_key = match env::var("TRACKING_TOKEN_KEY") {
            Ok(key) if !key.trim().is_empty() => key,
            _ => {
                warn!("TRACKING_TOKEN_KEY not set, using the development default");
                DEFAULT_TOKEN_KEY.to_string()
            }
        };

        Config {
            post_store_dir: env::var("POST_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/posts")),

            token_key,

            lock_wait_ms: parse_millis("TRACK_LOCK_WAIT_MS", 2000),

            tracking_base_url: env::var("TRACKING_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080/t".to_string()),
        }
    }
}

/// Parse a positive millisecond value, falling back to a default on bad input.
fn parse_millis(name: &str, default: u64) -> u64 {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => v,
        _ => {
            warn!(env_var = name, value = %raw, "Invalid duration, using default");
            default
        }
    }
}
