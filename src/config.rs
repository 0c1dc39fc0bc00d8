//! Process configuration.
//!
//! Every value is read from the environment once at startup. Missing variables
//! use the defaults below; malformed numbers are logged and replaced by the
//! default rather than aborting startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::{ModelProfile, RetryPolicy};
use crate::progress::MIN_POLL_INTERVAL;
use crate::segment::SegmenterConfig;

/// Default model for first-pass translation.
pub const DEFAULT_FAST_MODEL: &str = "google/gemini-2.0-flash-001";

/// Default model for user-requested corrections.
pub const DEFAULT_CORRECTION_MODEL: &str = "google/gemini-2.5-pro";

/// Runtime configuration for the translator service.
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenRouter API key used by the generation provider.
    pub api_key: String,
    /// Profile used for first-pass translation.
    pub fast_profile: ModelProfile,
    /// Profile used for corrections.
    pub strong_profile: ModelProfile,
    /// Directory holding `{doc}_context.txt` streams and `{doc}_assets.json` label tables.
    pub extract_dir: PathBuf,
    /// Directory holding `{doc}_llm_cache.json` snapshots.
    pub llm_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub segmenter: SegmenterConfig,
    pub retry: RetryPolicy,
    /// I/O timeout applied to each provider request.
    pub request_timeout: Duration,
    /// Progress channel polling interval.
    pub progress_poll: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            fast_profile: ModelProfile::new(DEFAULT_FAST_MODEL, 0.1),
            strong_profile: ModelProfile::new(DEFAULT_CORRECTION_MODEL, 0.2),
            extract_dir: PathBuf::from("./extracted_output"),
            llm_dir: PathBuf::from("./llm_output"),
            host: "127.0.0.1".to_string(),
            port: 8000,
            segmenter: SegmenterConfig::default(),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(600),
            progress_poll: Duration::from_millis(500),
        }
    }
}

impl Config {
    /// Build the configuration from environment variables.
    ///
    /// The API key is required; everything else has a default.
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENROUTER_API_KEY environment variable is not set"))?;

        let defaults = Self::default();

        let fast_profile = ModelProfile::new(
            std::env::var("FAST_MODEL").unwrap_or_else(|_| DEFAULT_FAST_MODEL.to_string()),
            defaults.fast_profile.temperature,
        );
        let strong_profile = ModelProfile::new(
            std::env::var("CORRECTION_MODEL")
                .unwrap_or_else(|_| DEFAULT_CORRECTION_MODEL.to_string()),
            defaults.strong_profile.temperature,
        );

        let segmenter = segmenter_limits(
            env_parse("MAX_CHUNK_CHARS", defaults.segmenter.soft_chunk_chars),
            env_parse("HARD_CHUNK_CHARS", defaults.segmenter.hard_chunk_chars),
        );

        let retry = RetryPolicy {
            max_attempts: env_parse("MAX_RETRIES", defaults.retry.max_attempts).max(1),
            delay: Duration::from_secs(env_parse(
                "RETRY_DELAY_SECS",
                defaults.retry.delay.as_secs(),
            )),
        };

        Ok(Self {
            api_key,
            fast_profile,
            strong_profile,
            extract_dir: std::env::var("EXTRACT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.extract_dir),
            llm_dir: std::env::var("LLM_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.llm_dir),
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT", defaults.port),
            segmenter,
            retry,
            request_timeout: Duration::from_secs(env_parse(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
            progress_poll: Duration::from_millis(env_parse(
                "PROGRESS_POLL_MS",
                defaults.progress_poll.as_millis() as u64,
            ))
            .max(MIN_POLL_INTERVAL),
        })
    }
}

/// Chunk limits with both values at least 1 and the hard cap never below the soft budget.
fn segmenter_limits(soft: usize, hard: usize) -> SegmenterConfig {
    let soft_chunk_chars = soft.max(1);
    SegmenterConfig {
        soft_chunk_chars,
        hard_chunk_chars: hard.max(soft_chunk_chars),
    }
}

/// Parse an environment variable, falling back to `default` when unset or invalid.
fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Invalid value for {}: {:?}, using default {}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}
