use std::time::Duration;

use crate::error::{DownstreamError, EnrichmentDegraded, FailureKind};

/// Pipeline states, in the order one invocation walks through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Validating,
    RateChecking,
    Extracting,
    Enriching,
    Aggregating,
    Analyzing,
    Generating,
    Integrating,
    Done,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Validating => "validating",
            PipelineStage::RateChecking => "rate_checking",
            PipelineStage::Extracting => "extracting",
            PipelineStage::Enriching => "enriching",
            PipelineStage::Aggregating => "aggregating",
            PipelineStage::Analyzing => "analyzing",
            PipelineStage::Generating => "generating",
            PipelineStage::Integrating => "integrating",
            PipelineStage::Done => "done",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by the pipeline for monitoring/logging.
#[derive(Debug, Clone)]
pub enum PipelineEvent<'a> {
    Started {
        url: &'a str,
    },
    StageEntered {
        stage: PipelineStage,
    },
    SourceDegraded {
        degraded: &'a EnrichmentDegraded,
    },
    DownstreamFailed {
        failure: &'a DownstreamError,
    },
    Completed {
        company: &'a str,
        degraded: bool,
        elapsed: Duration,
    },
    Failed {
        stage: PipelineStage,
        kind: FailureKind,
        error: &'a str,
    },
}

/// Trait for receiving pipeline events (decoupled logging).
pub trait PipelineReporter: Send + Sync {
    fn report(&self, event: PipelineEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPipelineReporter;

impl PipelineReporter for TracingPipelineReporter {
    fn report(&self, event: PipelineEvent<'_>) {
        match event {
            PipelineEvent::Started { url } => {
                tracing::info!(%url, "Researching company");
            }
            PipelineEvent::StageEntered { stage } => {
                tracing::debug!(%stage, "Entering stage");
            }
            PipelineEvent::SourceDegraded { degraded } => {
                tracing::warn!(
                    source = %degraded.source_name,
                    reason = %degraded.reason,
                    "Enrichment source degraded"
                );
            }
            PipelineEvent::DownstreamFailed { failure } => {
                tracing::warn!(stage = %failure.stage, error = %failure.message, "Downstream stage failed");
            }
            PipelineEvent::Completed {
                company,
                degraded,
                elapsed,
            } => {
                tracing::info!(
                    %company,
                    %degraded,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Research complete"
                );
            }
            PipelineEvent::Failed { stage, kind, error } => {
                tracing::error!(%stage, %kind, %error, "Research failed");
            }
        }
    }
}
