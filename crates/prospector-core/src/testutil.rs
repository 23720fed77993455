//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use crate::error::{AppError, FailureKind};
use crate::events::{PipelineEvent, PipelineReporter, PipelineStage};
use crate::models::{
    AnalysisBundle, AnalysisResult, CompanyRecord, FieldMap, MetricValue, NewsItem,
    ReportReference, TeamMember, compute_hash,
};
use crate::traits::{Analyzer, CrmIntegrator, Enricher, ReportGenerator, WebsiteExtractor};

fn object(value: serde_json::Value) -> FieldMap {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Website fields covering description, products, team and social media.
pub fn complete_website_fields() -> FieldMap {
    object(json!({
        "description": "Industrial robotics for small factories",
        "products": ["ArmOne", "Vision Kit"],
        "team": [{"name": "Ada Park", "role": "CEO"}],
        "social_media": {"linkedin": "https://linkedin.com/company/acme"}
    }))
}

/// `(crunchbase, linkedin, news)` maps that complete [`complete_website_fields`].
pub fn complete_enrichment_fields() -> (FieldMap, FieldMap, FieldMap) {
    let crunchbase = object(json!({
        "industry": "Robotics",
        "metrics": {"employees": 85, "funding_stage": "Series B"}
    }));
    let linkedin = object(json!({
        "team": [
            {"name": "Ada Park", "role": "CEO"},
            {"name": "Sam Ortiz", "role": "CTO"}
        ]
    }));
    let news = object(json!({
        "news": [{"headline": "Acme raises Series B", "date": "2024-03-01", "source": "TechWire"}]
    }));
    (crunchbase, linkedin, news)
}

/// A fully populated record.
pub fn make_test_record(name: &str) -> CompanyRecord {
    CompanyRecord {
        name: name.to_string(),
        description: "Industrial robotics for small factories".into(),
        industry: "Robotics".into(),
        products: vec!["ArmOne".into()],
        team: vec![TeamMember {
            name: "Ada Park".into(),
            role: "CEO".into(),
        }],
        news: vec![NewsItem {
            headline: "Acme raises Series B".into(),
            date: "2024-03-01".into(),
            source: "TechWire".into(),
        }],
        social_media: BTreeMap::from([(
            "twitter".to_string(),
            "https://twitter.com/acme".to_string(),
        )]),
        metrics: BTreeMap::from([("employees".to_string(), MetricValue::Integer(85))]),
    }
}

// ---------------------------------------------------------------------------
// MockWebsiteExtractor
// ---------------------------------------------------------------------------

/// Mock extractor with a queue of responses. Each call pops the first
/// element; once empty, returns an empty map.
#[derive(Clone)]
pub struct MockWebsiteExtractor {
    responses: Arc<Mutex<Vec<Result<FieldMap, AppError>>>>,
    calls: Arc<Mutex<u32>>,
}

impl MockWebsiteExtractor {
    pub fn new(fields: FieldMap) -> Self {
        Self::with_responses(vec![Ok(fields)])
    }

    pub fn with_responses(responses: Vec<Result<FieldMap, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

impl WebsiteExtractor for MockWebsiteExtractor {
    async fn extract_website_data(&self, _url: &str) -> Result<FieldMap, AppError> {
        *self.calls.lock().unwrap() += 1;
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(FieldMap::new())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockEnricher
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum SourceBehavior {
    Fields(FieldMap),
    Error(String),
    Panic,
}

/// Mock enricher configured per source name. Unknown sources answer with an
/// empty map.
#[derive(Clone, Default)]
pub struct MockEnricher {
    behaviors: HashMap<String, SourceBehavior>,
    delays: HashMap<String, Duration>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockEnricher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fields(mut self, source: &str, fields: FieldMap) -> Self {
        self.behaviors
            .insert(source.to_string(), SourceBehavior::Fields(fields));
        self
    }

    /// `source` fails with [`AppError::HttpError`].
    pub fn with_error(mut self, source: &str, message: &str) -> Self {
        self.behaviors
            .insert(source.to_string(), SourceBehavior::Error(message.to_string()));
        self
    }

    pub fn with_panic(mut self, source: &str) -> Self {
        self.behaviors
            .insert(source.to_string(), SourceBehavior::Panic);
        self
    }

    /// `source` sleeps for `delay` before answering.
    pub fn with_delay(mut self, source: &str, delay: Duration) -> Self {
        self.delays.insert(source.to_string(), delay);
        self
    }

    /// `(source, company)` pairs in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Enricher for MockEnricher {
    async fn enrich(&self, source_name: &str, company_name: &str) -> Result<FieldMap, AppError> {
        self.calls
            .lock()
            .unwrap()
            .push((source_name.to_string(), company_name.to_string()));

        if let Some(delay) = self.delays.get(source_name) {
            tokio::time::sleep(*delay).await;
        }

        match self.behaviors.get(source_name) {
            Some(SourceBehavior::Fields(fields)) => Ok(fields.clone()),
            Some(SourceBehavior::Error(message)) => Err(AppError::HttpError(message.clone())),
            Some(SourceBehavior::Panic) => panic!("{source_name} exploded"),
            None => Ok(FieldMap::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockAnalyzer
// ---------------------------------------------------------------------------

/// Mock analyzer that records the names of analyzed companies.
#[derive(Clone)]
pub struct MockAnalyzer {
    error: Option<String>,
    analyzed: Arc<Mutex<Vec<String>>>,
}

impl MockAnalyzer {
    pub fn new() -> Self {
        Self {
            error: None,
            analyzed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Both `analyze` and `generate_profile` fail with an LLM error.
    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            analyzed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn analyzed(&self) -> Vec<String> {
        self.analyzed.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), AppError> {
        match &self.error {
            Some(message) => Err(AppError::LlmError {
                message: message.clone(),
                status_code: 503,
                retryable: true,
            }),
            None => Ok(()),
        }
    }
}

impl Analyzer for MockAnalyzer {
    async fn analyze(&self, record: &CompanyRecord) -> Result<AnalysisResult, AppError> {
        self.analyzed.lock().unwrap().push(record.name.clone());
        self.check()?;
        Ok(AnalysisResult {
            market_position: format!("{} is a challenger in {}", record.name, record.industry),
            opportunities: vec!["EU expansion".into()],
            risks: vec!["Hardware margins".into()],
            extra: FieldMap::new(),
        })
    }

    async fn generate_profile(&self, record: &CompanyRecord) -> Result<String, AppError> {
        self.check()?;
        Ok(format!("{}: {}", record.name, record.description))
    }
}

// ---------------------------------------------------------------------------
// MockReportGenerator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MockReportGenerator {
    error: Option<String>,
    generated: Arc<Mutex<Vec<(String, AnalysisBundle)>>>,
}

impl MockReportGenerator {
    pub fn new() -> Self {
        Self {
            error: None,
            generated: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fails with an I/O error.
    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            generated: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn generated(&self) -> Vec<(String, AnalysisBundle)> {
        self.generated.lock().unwrap().clone()
    }
}

impl ReportGenerator for MockReportGenerator {
    async fn generate_report(
        &self,
        record: &CompanyRecord,
        bundle: &AnalysisBundle,
    ) -> Result<ReportReference, AppError> {
        if let Some(message) = &self.error {
            return Err(AppError::IoError(std::io::Error::other(message.clone())));
        }
        self.generated
            .lock()
            .unwrap()
            .push((record.name.clone(), bundle.clone()));
        Ok(ReportReference {
            location: format!("reports/{}.md", record.name.to_lowercase()),
            content_hash: compute_hash(&record.name),
        })
    }
}

// ---------------------------------------------------------------------------
// MockCrm
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MockCrm {
    accept: bool,
    updates: Arc<Mutex<Vec<String>>>,
}

impl MockCrm {
    pub fn accepting() -> Self {
        Self {
            accept: true,
            updates: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answers every update with `Ok(false)`.
    pub fn refusing() -> Self {
        Self {
            accept: false,
            updates: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn updates(&self) -> Vec<String> {
        self.updates.lock().unwrap().clone()
    }
}

impl CrmIntegrator for MockCrm {
    async fn update_crm(
        &self,
        record: &CompanyRecord,
        _report: &ReportReference,
    ) -> Result<bool, AppError> {
        self.updates.lock().unwrap().push(record.name.clone());
        Ok(self.accept)
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ReporterLog {
    stages: Vec<PipelineStage>,
    degraded: Vec<String>,
    failed: Option<FailureKind>,
}

/// Reporter that records entered stages, degraded sources and the failure kind.
#[derive(Clone, Default)]
pub struct MockReporter {
    log: Arc<Mutex<ReporterLog>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stages(&self) -> Vec<PipelineStage> {
        self.log.lock().unwrap().stages.clone()
    }

    pub fn degraded(&self) -> Vec<String> {
        self.log.lock().unwrap().degraded.clone()
    }

    pub fn failed(&self) -> Option<FailureKind> {
        self.log.lock().unwrap().failed
    }
}

impl PipelineReporter for MockReporter {
    fn report(&self, event: PipelineEvent<'_>) {
        let mut log = self.log.lock().unwrap();
        match event {
            PipelineEvent::StageEntered { stage } => log.stages.push(stage),
            PipelineEvent::SourceDegraded { degraded } => {
                log.degraded.push(degraded.source_name.clone())
            }
            PipelineEvent::Failed { kind, .. } => log.failed = Some(kind),
            _ => {}
        }
    }
}
