use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{DownstreamError, EnrichmentDegraded, FailureKind, PipelineError};
use crate::models::{AnalysisResult, CompanyRecord, ReportReference};

/// Everything one successful invocation produced.
#[derive(Debug, Clone, Serialize)]
pub struct ProspectReport {
    pub run_id: Uuid,
    pub url: String,
    pub record: CompanyRecord,
    pub analysis: Option<AnalysisResult>,
    pub profile: Option<String>,
    pub report: Option<ReportReference>,
    /// `Some(true)` once the CRM acknowledged the update.
    pub crm_updated: Option<bool>,
    pub degraded_sources: Vec<EnrichmentDegraded>,
    pub downstream_failures: Vec<DownstreamError>,
    pub completed_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_millis", rename = "elapsed_ms")]
    pub elapsed: Duration,
}

impl ProspectReport {
    /// True if any enrichment source or downstream stage failed.
    pub fn is_degraded(&self) -> bool {
        !self.degraded_sources.is_empty() || !self.downstream_failures.is_empty()
    }

    /// Names of the enrichment sources that contributed nothing.
    pub fn degraded_source_names(&self) -> Vec<&str> {
        self.degraded_sources
            .iter()
            .map(|d| d.source_name.as_str())
            .collect()
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Final result of one invocation.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Record produced and every stage succeeded.
    Completed(ProspectReport),
    /// Record produced; some enrichment sources or downstream stages failed.
    Degraded(ProspectReport),
    /// No record produced.
    Failed(PipelineError),
}

impl PipelineOutcome {
    pub fn report(&self) -> Option<&ProspectReport> {
        match self {
            PipelineOutcome::Completed(report) | PipelineOutcome::Degraded(report) => Some(report),
            PipelineOutcome::Failed(_) => None,
        }
    }

    pub fn record(&self) -> Option<&CompanyRecord> {
        self.report().map(|r| &r.record)
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            PipelineOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error().map(PipelineError::kind)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineOutcome::Failed(_))
    }

    pub fn status(&self) -> &'static str {
        match self {
            PipelineOutcome::Completed(_) => "completed",
            PipelineOutcome::Degraded(_) => "degraded",
            PipelineOutcome::Failed(_) => "failed",
        }
    }

    pub fn into_result(self) -> Result<ProspectReport, PipelineError> {
        match self {
            PipelineOutcome::Completed(report) | PipelineOutcome::Degraded(report) => Ok(report),
            PipelineOutcome::Failed(e) => Err(e),
        }
    }
}

impl From<Result<ProspectReport, PipelineError>> for PipelineOutcome {
    fn from(result: Result<ProspectReport, PipelineError>) -> Self {
        match result {
            Ok(report) if report.is_degraded() => PipelineOutcome::Degraded(report),
            Ok(report) => PipelineOutcome::Completed(report),
            Err(e) => PipelineOutcome::Failed(e),
        }
    }
}

/// JSON summary of an outcome, used for CLI output.
#[derive(Debug, Serialize)]
pub struct OutcomeSummary<'a> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<&'a ProspectReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<'a> From<&'a PipelineOutcome> for OutcomeSummary<'a> {
    fn from(outcome: &'a PipelineOutcome) -> Self {
        Self {
            status: outcome.status(),
            report: outcome.report(),
            failure: outcome.failure_kind(),
            error: outcome.error().map(|e| e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DegradationReason, DownstreamStage};
    use crate::testutil::make_test_record;

    fn report() -> ProspectReport {
        ProspectReport {
            run_id: Uuid::new_v4(),
            url: "https://acme.com".into(),
            record: make_test_record("Acme"),
            analysis: None,
            profile: None,
            report: None,
            crm_updated: None,
            degraded_sources: vec![],
            downstream_failures: vec![],
            completed_at: Utc::now(),
            elapsed: Duration::from_millis(1500),
        }
    }

    #[test]
    fn clean_report_is_completed() {
        let outcome = PipelineOutcome::from(Ok(report()));
        assert_eq!(outcome.status(), "completed");
        assert!(!outcome.is_fatal());
        assert_eq!(outcome.record().unwrap().name, "Acme");
    }

    #[test]
    fn degraded_source_marks_outcome_degraded() {
        let mut report = report();
        report.degraded_sources.push(EnrichmentDegraded {
            source_name: "linkedin".into(),
            reason: DegradationReason::Failed("HTTP 500".into()),
        });

        let outcome = PipelineOutcome::from(Ok(report));
        assert!(matches!(outcome, PipelineOutcome::Degraded(_)));
        assert_eq!(outcome.report().unwrap().degraded_source_names(), ["linkedin"]);
    }

    #[test]
    fn downstream_failure_marks_outcome_degraded() {
        let mut report = report();
        report.downstream_failures.push(DownstreamError {
            stage: DownstreamStage::Crm,
            message: "refused".into(),
        });
        assert_eq!(PipelineOutcome::from(Ok(report)).status(), "degraded");
    }

    #[test]
    fn failure_has_no_record() {
        let outcome = PipelineOutcome::from(Err(PipelineError::Validation("bad".into())));
        assert!(outcome.is_fatal());
        assert!(outcome.record().is_none());
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Validation));
    }

    #[test]
    fn summary_serializes_failure() {
        let outcome = PipelineOutcome::Failed(PipelineError::RateLimited {
            dependency: "DataExtractor".into(),
        });
        let json = serde_json::to_value(OutcomeSummary::from(&outcome)).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["failure"], "rate_limited");
        assert!(json.get("report").is_none());
    }

    #[test]
    fn summary_serializes_report() {
        let outcome = PipelineOutcome::from(Ok(report()));
        let json = serde_json::to_value(OutcomeSummary::from(&outcome)).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["report"]["record"]["name"], "Acme");
        assert_eq!(json["report"]["elapsed_ms"], 1500);
    }
}
