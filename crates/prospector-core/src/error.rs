use std::time::Duration;

use thiserror::Error;

use crate::events::PipelineStage;

/// Failures raised by collaborators (fetching, enrichment APIs, LLM, reports, CRM).
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed or returned a non-success status.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// LLM API call failed.
    #[error("LLM error (HTTP {status_code}): {message}")]
    LlmError {
        message: String,
        status_code: u16,
        retryable: bool,
    },

    /// Upstream answered with HTTP 429.
    #[error("Upstream rate limit exceeded")]
    RateLimitExceeded,

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The site's robots.txt forbids fetching this URL.
    #[error("Disallowed by robots.txt: {0}")]
    RobotsDisallowed(String),

    /// Collaborator returned data that could not be interpreted.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded => true,
            AppError::LlmError { retryable, .. } => *retryable,
            AppError::HttpError(msg) => {
                msg.contains("timeout")
                    || msg.contains("connect")
                    || msg.contains("reset")
                    || msg.starts_with("HTTP 5")
            }
            _ => false,
        }
    }
}

/// Classifies errors for [`RetryPolicy`](crate::retry::RetryPolicy).
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for AppError {
    fn is_retryable(&self) -> bool {
        AppError::is_retryable(self)
    }
}

/// Aggregation could not satisfy the `CompanyRecord` schema.
///
/// Lists every offending field, not just the first one found.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", describe_aggregation(.missing, .invalid))]
pub struct AggregationError {
    /// Required fields absent from both sources.
    pub missing: Vec<String>,
    /// Fields present but not of the expected shape.
    pub invalid: Vec<String>,
}

impl AggregationError {
    /// True if `field` is reported as missing or invalid.
    pub fn names(&self, field: &str) -> bool {
        self.missing.iter().chain(&self.invalid).any(|f| f == field)
    }
}

fn describe_aggregation(missing: &[String], invalid: &[String]) -> String {
    match (missing.is_empty(), invalid.is_empty()) {
        (false, true) => format!("Missing required fields: {}", missing.join(", ")),
        (true, false) => format!("Invalid fields: {}", invalid.join(", ")),
        _ => format!(
            "Missing required fields: {}; invalid fields: {}",
            missing.join(", "),
            invalid.join(", ")
        ),
    }
}

/// Class of a fatal pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    RateLimited,
    Extraction,
    AggregationIncomplete,
    Timeout,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Extraction => "extraction",
            FailureKind::AggregationIncomplete => "aggregation_incomplete",
            FailureKind::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal pipeline failures. No `CompanyRecord` is produced.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The target URL (or derived company name) is unusable.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The named dependency has no budget left in the current window.
    #[error("Rate limited: dependency '{dependency}' is at capacity")]
    RateLimited { dependency: String },

    /// Website extraction failed after the retry policy gave up.
    /// Carries the last underlying error unchanged.
    #[error("Extraction failed: {0}")]
    Extraction(#[source] AppError),

    /// Merged data does not satisfy the record schema.
    #[error("Aggregation incomplete: {0}")]
    Aggregation(#[from] AggregationError),

    /// The overall invocation deadline passed.
    #[error("Pipeline timed out after {}ms during {stage}", .elapsed.as_millis())]
    Timeout {
        stage: PipelineStage,
        elapsed: Duration,
    },
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Validation(_) => FailureKind::Validation,
            PipelineError::RateLimited { .. } => FailureKind::RateLimited,
            PipelineError::Extraction(_) => FailureKind::Extraction,
            PipelineError::Aggregation(_) => FailureKind::AggregationIncomplete,
            PipelineError::Timeout { .. } => FailureKind::Timeout,
        }
    }
}

/// Why an enrichment source contributed nothing.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DegradationReason {
    /// The limiter refused the source's dependency name.
    RateLimited,
    /// The source returned an error.
    Failed(String),
    /// The source's future panicked.
    Panicked,
}

impl std::fmt::Display for DegradationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DegradationReason::RateLimited => write!(f, "rate limited"),
            DegradationReason::Failed(msg) => write!(f, "{msg}"),
            DegradationReason::Panicked => write!(f, "panicked"),
        }
    }
}

/// Non-fatal: one enrichment source was skipped or failed.
#[derive(Error, Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[error("Enrichment source '{source_name}' degraded: {reason}")]
pub struct EnrichmentDegraded {
    #[serde(rename = "source")]
    pub source_name: String,
    pub reason: DegradationReason,
}

/// Downstream handoff that failed after the record was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownstreamStage {
    Analysis,
    Profile,
    Report,
    Crm,
}

impl std::fmt::Display for DownstreamStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DownstreamStage::Analysis => "analysis",
            DownstreamStage::Profile => "profile",
            DownstreamStage::Report => "report",
            DownstreamStage::Crm => "crm",
        };
        f.write_str(s)
    }
}

/// Non-fatal: a downstream stage failed; the record is still valid.
#[derive(Error, Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[error("Downstream stage {stage} failed: {message}")]
pub struct DownstreamError {
    pub stage: DownstreamStage,
    pub message: String,
}
