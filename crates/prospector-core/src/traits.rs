use std::future::Future;

use crate::error::AppError;
use crate::models::{AnalysisBundle, AnalysisResult, CompanyRecord, FieldMap, ReportReference};

/// Fetches raw HTML content from a URL.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Produces raw company fields from the company's own website.
pub trait WebsiteExtractor: Send + Sync + Clone {
    /// Must fail only when the site is unreachable (network, HTTP, robots.txt),
    /// never because the HTML is malformed. Partial or empty maps are fine.
    fn extract_website_data(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<FieldMap, AppError>> + Send;
}

/// Looks a company up in a named third-party source (Crunchbase, LinkedIn, news, ...).
pub trait Enricher: Send + Sync + Clone {
    fn enrich(
        &self,
        source_name: &str,
        company_name: &str,
    ) -> impl Future<Output = Result<FieldMap, AppError>> + Send;

    /// Data already held locally for this lookup. A hit is served without an
    /// upstream request, so it is not charged against the source's rate limit.
    fn cached(
        &self,
        source_name: &str,
        company_name: &str,
    ) -> impl Future<Output = Option<FieldMap>> + Send {
        let _ = (source_name, company_name);
        async { None }
    }
}

/// LLM-backed assessment of a complete record.
pub trait Analyzer: Send + Sync + Clone {
    fn analyze(
        &self,
        record: &CompanyRecord,
    ) -> impl Future<Output = Result<AnalysisResult, AppError>> + Send;

    /// Narrative company profile.
    fn generate_profile(
        &self,
        record: &CompanyRecord,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Renders and stores a prospect report.
pub trait ReportGenerator: Send + Sync + Clone {
    fn generate_report(
        &self,
        record: &CompanyRecord,
        bundle: &AnalysisBundle,
    ) -> impl Future<Output = Result<ReportReference, AppError>> + Send;
}

/// Pushes the prospect into a CRM.
pub trait CrmIntegrator: Send + Sync + Clone {
    /// Returns `Ok(false)` when the CRM accepted the call but refused the update.
    fn update_crm(
        &self,
        record: &CompanyRecord,
        report: &ReportReference,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;
}

/// A CRM integrator that acknowledges every update without writing anywhere.
#[derive(Debug, Clone)]
pub struct NoopCrm;

impl CrmIntegrator for NoopCrm {
    async fn update_crm(
        &self,
        record: &CompanyRecord,
        report: &ReportReference,
    ) -> Result<bool, AppError> {
        tracing::debug!(company = %record.name, report = %report.location, "No CRM configured, skipping update");
        Ok(true)
    }
}
