use crate::services::poller::{Backoff, PollPolicy};
use std::env;
use std::time::Duration;
use validator::Validate;

/// Client configuration for the thumbnail pipeline
#[derive(Debug, Clone, Validate)]
pub struct UploaderConfig {
    /// Base URL of the pipeline API (default: "http://localhost:3000")
    #[validate(url)]
    pub api_base_url: String,

    /// AWS region of the buckets (informational, default: "us-east-1")
    pub region: String,

    /// Bucket receiving uploads (informational)
    pub input_bucket: Option<String>,

    /// Bucket holding generated thumbnails (informational)
    pub output_bucket: Option<String>,

    /// Maximum status checks before giving up (default: 30)
    #[validate(range(min = 1))]
    pub poll_max_attempts: u32,

    /// Delay between status checks in milliseconds (default: 2000)
    pub poll_interval_ms: u64,

    /// Use exponential backoff between status checks (default: false)
    pub poll_exponential: bool,

    /// Per-request timeout for every HTTP call in seconds (default: 30)
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".to_string(),
            region: "us-east-1".to_string(),
            input_bucket: None,
            output_bucket: None,
            poll_max_attempts: 30,
            poll_interval_ms: 2000,
            poll_exponential: false,
            request_timeout_secs: 30,
        }
    }
}

impl UploaderConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            api_base_url: env::var("API_BASE_URL").unwrap_or(default.api_base_url),

            region: env::var("AWS_REGION").unwrap_or(default.region),

            input_bucket: env::var("INPUT_BUCKET").ok(),
            output_bucket: env::var("OUTPUT_BUCKET").ok(),

            poll_max_attempts: env::var("POLL_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.poll_max_attempts),

            poll_interval_ms: env::var("POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.poll_interval_ms),

            poll_exponential: env::var("POLL_EXPONENTIAL")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.poll_exponential),

            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.request_timeout_secs),
        }
    }

    /// Polling policy derived from this configuration
    pub fn poll_policy(&self) -> PollPolicy {
        let interval = Duration::from_millis(self.poll_interval_ms);
        let backoff = if self.poll_exponential {
            Backoff::Exponential {
                factor: 2,
                max_interval: interval * 8,
            }
        } else {
            Backoff::Fixed
        };

        PollPolicy {
            max_attempts: self.poll_max_attempts,
            interval,
            backoff,
            max_wait: None,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
