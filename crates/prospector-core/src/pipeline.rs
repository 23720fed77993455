use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::FutureExt;
use futures::future::join_all;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::aggregator::{combine_enrichment, merge};
use crate::config::PipelineConfig;
use crate::error::{
    AppError, DegradationReason, DownstreamError, DownstreamStage, EnrichmentDegraded,
    PipelineError,
};
use crate::events::{PipelineEvent, PipelineReporter, PipelineStage, TracingPipelineReporter};
use crate::models::{AnalysisBundle, FieldMap};
use crate::outcome::{PipelineOutcome, ProspectReport};
use crate::rate_limiter::{RateLimiter, RateReservation};
use crate::retry::RetryPolicy;
use crate::timing::timed;
use crate::traits::{Analyzer, CrmIntegrator, Enricher, ReportGenerator, WebsiteExtractor};
use crate::validation::{derive_company_name, validate_url};

/// Orchestrates one company research run:
/// validate → rate check → extract → enrich → aggregate → analyze → report → CRM.
///
/// Generic over every collaborator via traits, so tests run without HTTP or
/// LLM calls. Cloning the [`RateLimiter`] into several pipelines shares one
/// budget between them.
pub struct ProspectPipeline<W, E, A, R, C>
where
    W: WebsiteExtractor,
    E: Enricher,
    A: Analyzer,
    R: ReportGenerator,
    C: CrmIntegrator,
{
    extractor: W,
    enricher: E,
    analyzer: A,
    reports: R,
    crm: C,
    config: PipelineConfig,
    limiter: RateLimiter,
    retry: RetryPolicy,
    reporter: Arc<dyn PipelineReporter>,
}

impl<W, E, A, R, C> ProspectPipeline<W, E, A, R, C>
where
    W: WebsiteExtractor,
    E: Enricher,
    A: Analyzer,
    R: ReportGenerator,
    C: CrmIntegrator,
{
    /// Create a pipeline with its own rate limiter built from `config`.
    pub fn new(
        extractor: W,
        enricher: E,
        analyzer: A,
        reports: R,
        crm: C,
        config: PipelineConfig,
    ) -> Self {
        let limiter = RateLimiter::new(config.rate_limit);
        let retry = RetryPolicy::new(config.retry);
        Self {
            extractor,
            enricher,
            analyzer,
            reports,
            crm,
            config,
            limiter,
            retry,
            reporter: Arc::new(TracingPipelineReporter),
        }
    }

    /// Use a shared limiter instead of the pipeline's own.
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn PipelineReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Research the company behind `url`, deriving its name from the host.
    pub async fn process_company(&self, url: &str) -> PipelineOutcome {
        self.process_company_named(url, None).await
    }

    /// Research the company behind `url`. A non-blank `name` overrides the
    /// name derived from the host.
    pub async fn process_company_named(&self, url: &str, name: Option<&str>) -> PipelineOutcome {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("research", %run_id, %url);

        async {
            let started = Instant::now();
            let tracker = StageTracker::new(self.reporter.as_ref());
            self.reporter.report(PipelineEvent::Started { url });

            let run = self.run(run_id, url, name, &tracker, started);
            let result = match self.config.timeout {
                Some(limit) => match tokio::time::timeout(limit, run).await {
                    Ok(result) => result,
                    Err(_) => Err(PipelineError::Timeout {
                        stage: tracker.current(),
                        elapsed: started.elapsed(),
                    }),
                },
                None => run.await,
            };

            match &result {
                Ok(report) => self.reporter.report(PipelineEvent::Completed {
                    company: &report.record.name,
                    degraded: report.is_degraded(),
                    elapsed: report.elapsed,
                }),
                Err(e) => self.reporter.report(PipelineEvent::Failed {
                    stage: tracker.current(),
                    kind: e.kind(),
                    error: &e.to_string(),
                }),
            }

            PipelineOutcome::from(result)
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        run_id: Uuid,
        url: &str,
        name: Option<&str>,
        tracker: &StageTracker<'_>,
        started: Instant,
    ) -> Result<ProspectReport, PipelineError> {
        // 1. Validate
        tracker.enter(PipelineStage::Validating);
        let parsed = validate_url(url)?;
        let company = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => derive_company_name(&parsed).ok_or_else(|| {
                PipelineError::Validation(format!("cannot derive a company name from '{url}'"))
            })?,
        };

        // 2. Rate check
        tracker.enter(PipelineStage::RateChecking);
        let dependency = &self.config.extractor_dependency;
        let reservation =
            self.limiter
                .try_reserve(dependency)
                .ok_or_else(|| PipelineError::RateLimited {
                    dependency: dependency.clone(),
                })?;

        // 3. Extract
        tracker.enter(PipelineStage::Extracting);
        let website = self.extract(url, reservation).await?;
        tracing::info!(fields = website.len(), "Website data extracted");

        // 4. Enrich
        tracker.enter(PipelineStage::Enriching);
        let (enrichment, degraded_sources) = self.enrich_all(&company).await;
        for degraded in &degraded_sources {
            self.reporter
                .report(PipelineEvent::SourceDegraded { degraded });
        }

        // 5. Aggregate
        tracker.enter(PipelineStage::Aggregating);
        let record = merge(&website, &enrichment, &company)?;

        // 6. Analyze
        tracker.enter(PipelineStage::Analyzing);
        let mut failures = Vec::new();
        let analysis = self.settle(
            DownstreamStage::Analysis,
            timed("analysis", self.analyzer.analyze(&record)).await,
            &mut failures,
        );
        let profile = self.settle(
            DownstreamStage::Profile,
            timed("profile", self.analyzer.generate_profile(&record)).await,
            &mut failures,
        );
        let bundle = AnalysisBundle { analysis, profile };

        // 7. Report
        tracker.enter(PipelineStage::Generating);
        let report = self.settle(
            DownstreamStage::Report,
            timed("report", self.reports.generate_report(&record, &bundle)).await,
            &mut failures,
        );

        // 8. CRM
        tracker.enter(PipelineStage::Integrating);
        let crm_updated = match &report {
            Some(reference) => {
                match timed("crm", self.crm.update_crm(&record, reference)).await {
                    Ok(true) => Some(true),
                    Ok(false) => {
                        self.record_failure(
                            DownstreamStage::Crm,
                            "CRM refused the update".into(),
                            &mut failures,
                        );
                        Some(false)
                    }
                    Err(e) => {
                        self.record_failure(DownstreamStage::Crm, e.to_string(), &mut failures);
                        None
                    }
                }
            }
            None => {
                self.record_failure(
                    DownstreamStage::Crm,
                    "skipped: no report was generated".into(),
                    &mut failures,
                );
                None
            }
        };

        tracker.enter(PipelineStage::Done);
        let AnalysisBundle { analysis, profile } = bundle;
        Ok(ProspectReport {
            run_id,
            url: url.to_string(),
            record,
            analysis,
            profile,
            report,
            crm_updated,
            degraded_sources,
            downstream_failures: failures,
            completed_at: Utc::now(),
            elapsed: started.elapsed(),
        })
    }

    /// Extraction through the retry policy. The reservation is committed when
    /// the first attempt is issued; retries are not charged again.
    async fn extract(
        &self,
        url: &str,
        reservation: RateReservation,
    ) -> Result<FieldMap, PipelineError> {
        let extractor = &self.extractor;
        let mut reservation = Some(reservation);
        let attempts = self.retry.run(move || {
            if let Some(reservation) = reservation.take() {
                reservation.commit();
            }
            extractor.extract_website_data(url)
        });
        timed("extraction", attempts)
            .await
            .map_err(PipelineError::Extraction)
    }

    /// Query every configured source concurrently. Returns the combined map
    /// (in configured order) and the sources that contributed nothing.
    async fn enrich_all(&self, company: &str) -> (FieldMap, Vec<EnrichmentDegraded>) {
        let sources = &self.config.enrichment_sources;
        let results = join_all(sources.iter().map(|source| self.enrich_one(source, company))).await;

        let mut contributions = Vec::with_capacity(sources.len());
        let mut degraded = Vec::new();
        for (source, result) in sources.iter().zip(results) {
            match result {
                Ok(fields) => contributions.push(fields),
                Err(reason) => degraded.push(EnrichmentDegraded {
                    source_name: source.clone(),
                    reason,
                }),
            }
        }
        (combine_enrichment(&contributions), degraded)
    }

    async fn enrich_one(&self, source: &str, company: &str) -> Result<FieldMap, DegradationReason> {
        // No request is issued for a cache hit, so it takes no slot.
        if let Some(fields) = self.enricher.cached(source, company).await {
            tracing::debug!(source, "Enrichment served from cache");
            return Ok(fields);
        }

        let Some(reservation) = self.limiter.try_reserve(source) else {
            return Err(DegradationReason::RateLimited);
        };
        reservation.commit();

        let lookup = AssertUnwindSafe(self.enricher.enrich(source, company)).catch_unwind();
        match timed(source, lookup).await {
            Ok(Ok(fields)) => Ok(fields),
            Ok(Err(e)) => Err(DegradationReason::Failed(e.to_string())),
            Err(_) => Err(DegradationReason::Panicked),
        }
    }

    fn settle<T>(
        &self,
        stage: DownstreamStage,
        result: Result<T, AppError>,
        failures: &mut Vec<DownstreamError>,
    ) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.record_failure(stage, e.to_string(), failures);
                None
            }
        }
    }

    fn record_failure(
        &self,
        stage: DownstreamStage,
        message: String,
        failures: &mut Vec<DownstreamError>,
    ) {
        let failure = DownstreamError { stage, message };
        self.reporter
            .report(PipelineEvent::DownstreamFailed { failure: &failure });
        failures.push(failure);
    }
}

/// Current stage of one invocation, readable after the run future is dropped.
struct StageTracker<'a> {
    stage: Mutex<PipelineStage>,
    reporter: &'a dyn PipelineReporter,
}

impl<'a> StageTracker<'a> {
    fn new(reporter: &'a dyn PipelineReporter) -> Self {
        Self {
            stage: Mutex::new(PipelineStage::Idle),
            reporter,
        }
    }

    fn enter(&self, stage: PipelineStage) {
        *self.stage.lock().unwrap_or_else(|p| p.into_inner()) = stage;
        self.reporter.report(PipelineEvent::StageEntered { stage });
    }

    fn current(&self) -> PipelineStage {
        *self.stage.lock().unwrap_or_else(|p| p.into_inner())
    }
}
