//! # Issuer Configuration
//!
//! Static configuration for the issuance pipeline: who the emitting
//! taxpayer is, and how the submission worker paces itself.
//!
//! All fields carry serde defaults so a deployment can configure only what
//! it overrides.

use serde::{Deserialize, Serialize};

use timbre_core::Issuer;

// =============================================================================
// Issuer Config
// =============================================================================

/// Top-level configuration for the issuance pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerConfig {
    /// The emitting taxpayer. Stamped on every document.
    pub issuer: Issuer,

    /// Submission worker pacing.
    #[serde(default)]
    pub submission: SubmissionConfig,
}

impl IssuerConfig {
    /// Builds a configuration with default submission pacing.
    pub fn new(issuer: Issuer) -> Self {
        IssuerConfig {
            issuer,
            submission: SubmissionConfig::default(),
        }
    }
}

// =============================================================================
// Submission Config
// =============================================================================

/// Pacing and retry settings for the background submission worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Seconds between polls of the pending-document feed.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Maximum documents picked up per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Submission attempts per document before it is skipped and flagged
    /// for an operator (the document stays `pending`; nothing is lost).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,

    /// Initial backoff after an endpoint failure (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Per-attempt timeout for endpoint calls (seconds). An endpoint that
    /// never answers must not wedge the worker loop.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    /// Total time the backoff keeps retrying within one outage before
    /// giving up for the cycle (seconds). `None` retries for as long as
    /// the process runs.
    #[serde(default)]
    pub max_elapsed_secs: Option<u64>,
}

fn default_poll_interval() -> u64 {
    5
}
fn default_batch_size() -> i64 {
    50
}
fn default_max_attempts() -> i64 {
    10
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}
fn default_attempt_timeout() -> u64 {
    30
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        SubmissionConfig {
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            attempt_timeout_secs: default_attempt_timeout(),
            max_elapsed_secs: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let json = r#"{
            "issuer": {
                "rut": "76086428-5",
                "razon_social": "Farmacia Austral SpA",
                "giro": "Venta de productos farmacéuticos",
                "address": "Av. Libertador 1234",
                "comuna": "Santiago"
            }
        }"#;

        let config: IssuerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.submission.poll_interval_secs, 5);
        assert_eq!(config.submission.batch_size, 50);
        assert_eq!(config.submission.max_attempts, 10);
        assert_eq!(config.submission.attempt_timeout_secs, 30);
        assert_eq!(config.submission.max_elapsed_secs, None);
    }
}
