// =============================================================================
// config.rs — THE KNOBS
// =============================================================================
//
// Everything tunable lives here: where the two upstreams are, how long one
// request may take, how often we may knock on each door, and how patiently
// we back off when told to go away.
//
// All values can be overridden via TOSDR_* environment variables (a .env
// file is honoured too). Anything unset or unparseable falls back to the
// default. The library never reads the environment on its own; only the
// binary calls `Config::from_env`, and tests build a Config directly.
//
// The default rate windows are the ones the upstreams tolerate in practice:
// one catalog request per 1.5 s, one edit-site page per 0.5 s.
// =============================================================================

use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // UPSTREAMS
    // =========================================================================

    /// ToS;DR catalog API. Default: https://api.tosdr.org
    pub api_base_url: String,

    /// The edit site, which we scrape for case points.
    /// Default: https://edit.tosdr.org
    pub edit_site_base_url: String,

    /// Sent with every request so the maintainers know who's knocking.
    pub user_agent: String,

    // =========================================================================
    // REQUEST BEHAVIOUR
    // =========================================================================

    /// Per-request timeout. A timeout is a transport error and is never retried.
    /// Default: 10 seconds.
    pub request_timeout: Duration,

    /// One catalog request per this window. Default: 1500 ms.
    pub api_rate_window: Duration,

    /// One edit-site request per this window. Default: 500 ms.
    pub edit_site_rate_window: Duration,

    // =========================================================================
    // RETRY ON HTTP 429
    // =========================================================================

    /// Total attempts per request, the first one included. Default: 10.
    pub max_attempts: u32,

    /// First backoff delay; doubles on every further 429. Default: 500 ms.
    pub backoff_base: Duration,

    /// Backoff ceiling. Default: 60 seconds.
    pub backoff_max: Duration,

    // =========================================================================
    // OUTPUT & LOGGING (binary only)
    // =========================================================================

    /// Where the CLI writes its .ndjson.gz files. Default: data/tosdr
    pub output_dir: PathBuf,

    /// Emit JSON log lines instead of human-readable ones.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.tosdr.org".to_string(),
            edit_site_base_url: "https://edit.tosdr.org".to_string(),
            user_agent: default_user_agent(),
            request_timeout: Duration::from_secs(10),
            api_rate_window: Duration::from_millis(1500),
            edit_site_rate_window: Duration::from_millis(500),
            max_attempts: 10,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(60),
            output_dir: PathBuf::from("data/tosdr"),
            log_json: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, defaulting anything
    /// that is missing or malformed.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Config::default();

        Config {
            api_base_url: env_or_default("TOSDR_API_BASE_URL", &defaults.api_base_url),
            edit_site_base_url: env_or_default(
                "TOSDR_EDIT_SITE_BASE_URL",
                &defaults.edit_site_base_url,
            ),
            user_agent: env_or_default("TOSDR_USER_AGENT", &defaults.user_agent),

            request_timeout: Duration::from_secs(
                env_or_default("TOSDR_REQUEST_TIMEOUT_SECS", "10").parse().unwrap_or(10),
            ),
            api_rate_window: Duration::from_millis(
                env_or_default("TOSDR_API_RATE_WINDOW_MS", "1500").parse().unwrap_or(1500),
            ),
            edit_site_rate_window: Duration::from_millis(
                env_or_default("TOSDR_EDIT_SITE_RATE_WINDOW_MS", "500").parse().unwrap_or(500),
            ),

            max_attempts: env_or_default("TOSDR_MAX_ATTEMPTS", "10").parse().unwrap_or(10),
            backoff_base: Duration::from_millis(
                env_or_default("TOSDR_BACKOFF_BASE_MS", "500").parse().unwrap_or(500),
            ),
            backoff_max: Duration::from_millis(
                env_or_default("TOSDR_BACKOFF_MAX_MS", "60000").parse().unwrap_or(60_000),
            ),

            output_dir: PathBuf::from(env_or_default(
                "TOSDR_OUTPUT_DIR",
                &defaults.output_dir.to_string_lossy(),
            )),
            log_json: env_or_default("TOSDR_LOG_JSON", "false").parse().unwrap_or(false),
        }
    }
}

fn default_user_agent() -> String {
    format!("tosdr-harvester/{}", env!("CARGO_PKG_VERSION"))
}

/// Read an environment variable, or fall back to `default`.
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
