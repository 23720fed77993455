//! Builds a concrete pipeline from settings and command-line overrides.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use prospector_client::{
    HtmlWebsiteExtractor, HttpEnricher, MarkdownReportGenerator, OpenAiAnalyzer, ReqwestFetcher,
    WebhookCrmIntegrator,
};
use prospector_core::cache::{CacheConfig, CachedEnricher};
use prospector_core::config::{PipelineConfig, Settings};
use prospector_core::error::AppError;
use prospector_core::models::{CompanyRecord, FieldMap, ReportReference};
use prospector_core::traits::{CrmIntegrator, Enricher, NoopCrm};
use prospector_core::ProspectPipeline;

pub type CliPipeline = ProspectPipeline<
    HtmlWebsiteExtractor<ReqwestFetcher>,
    SourceEnricher,
    OpenAiAnalyzer,
    MarkdownReportGenerator,
    CrmTarget,
>;

/// Enrichment with or without the TTL cache in front.
#[derive(Clone)]
pub enum SourceEnricher {
    Cached(CachedEnricher<HttpEnricher>),
    Direct(HttpEnricher),
}

impl Enricher for SourceEnricher {
    async fn enrich(&self, source_name: &str, company_name: &str) -> Result<FieldMap, AppError> {
        match self {
            SourceEnricher::Cached(e) => e.enrich(source_name, company_name).await,
            SourceEnricher::Direct(e) => e.enrich(source_name, company_name).await,
        }
    }

    async fn cached(&self, source_name: &str, company_name: &str) -> Option<FieldMap> {
        match self {
            SourceEnricher::Cached(e) => e.cached(source_name, company_name).await,
            SourceEnricher::Direct(e) => e.cached(source_name, company_name).await,
        }
    }
}

/// Webhook CRM when configured, otherwise a no-op.
#[derive(Clone)]
pub enum CrmTarget {
    Webhook(WebhookCrmIntegrator),
    Noop(NoopCrm),
}

impl CrmIntegrator for CrmTarget {
    async fn update_crm(
        &self,
        record: &CompanyRecord,
        report: &ReportReference,
    ) -> Result<bool, AppError> {
        match self {
            CrmTarget::Webhook(c) => c.update_crm(record, report).await,
            CrmTarget::Noop(c) => c.update_crm(record, report).await,
        }
    }
}

/// Command-line values that take precedence over the settings file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub reports_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub max_requests: Option<usize>,
    pub ignore_robots: bool,
}

/// Effective pipeline configuration: settings file first, then overrides.
pub fn pipeline_config(settings: &Settings, overrides: &Overrides) -> Result<PipelineConfig> {
    let mut config = settings.pipeline_config();
    if let Some(secs) = overrides.timeout_secs {
        config.timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if let Some(max_requests) = overrides.max_requests {
        config.rate_limit.max_requests = max_requests;
    }
    config.validate().context("Invalid pipeline configuration")?;
    Ok(config)
}

pub fn build_pipeline(settings: &Settings, overrides: &Overrides) -> Result<CliPipeline> {
    let config = pipeline_config(settings, overrides)?;

    let fetcher = ReqwestFetcher::new().context("Failed to create HTTP client")?;
    let mut extractor = HtmlWebsiteExtractor::new(fetcher);
    if overrides.ignore_robots {
        extractor = extractor.ignore_robots();
    }

    let mut http = HttpEnricher::new().context("Failed to create enrichment client")?;
    for source in &settings.enrichment {
        match &source.endpoint {
            Some(endpoint) => {
                http = http.with_source(&source.name, endpoint, settings.enrichment_key(source))?;
            }
            None => tracing::warn!(
                source = %source.name,
                "No endpoint configured; source will be reported as degraded"
            ),
        }
    }
    let enricher = if settings.settings.cache_enabled {
        SourceEnricher::Cached(CachedEnricher::new(
            http,
            CacheConfig {
                ttl: Duration::from_secs(settings.settings.cache_ttl),
                ..CacheConfig::default()
            },
        ))
    } else {
        SourceEnricher::Direct(http)
    };

    let api_key = match overrides.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(key) => key,
        None => settings.openai_key()?,
    };
    let analyzer = OpenAiAnalyzer::with_base_url(api_key, &overrides.model, &overrides.base_url)?;

    let reports_dir = overrides
        .reports_dir
        .clone()
        .unwrap_or_else(|| settings.paths.reports.clone());
    let reports = MarkdownReportGenerator::new(reports_dir);

    let crm = match &settings.crm.webhook_url {
        Some(url) => CrmTarget::Webhook(WebhookCrmIntegrator::new(
            url,
            settings.crm.api_key.clone(),
        )?),
        None => CrmTarget::Noop(NoopCrm),
    };

    Ok(ProspectPipeline::new(extractor, enricher, analyzer, reports, crm, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides() -> Overrides {
        Overrides {
            model: "gpt-4o-mini".into(),
            base_url: "http://127.0.0.1:9/v1".into(),
            ..Overrides::default()
        }
    }

    #[test]
    fn overrides_replace_settings() {
        let settings = Settings::default();
        let config = pipeline_config(
            &settings,
            &Overrides {
                timeout_secs: Some(0),
                max_requests: Some(3),
                ..overrides()
            },
        )
        .unwrap();
        assert_eq!(config.timeout, None);
        assert_eq!(config.rate_limit.max_requests, 3);
    }

    #[test]
    fn zero_budget_override_is_rejected() {
        let err = pipeline_config(
            &Settings::default(),
            &Overrides {
                max_requests: Some(0),
                ..overrides()
            },
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("max_requests"));
    }

    #[test]
    fn missing_openai_key_fails_build() {
        let err = build_pipeline(&Settings::default(), &overrides()).err().unwrap();
        assert!(err.to_string().contains("openai"));
    }

    #[test]
    fn key_from_overrides_builds_pipeline() {
        let settings = Settings::from_json(
            r#"{"enrichment": [{"name": "news", "endpoint": "https://enrich.test/news"}],
                "crm": {"webhook_url": "https://crm.test/hook"}}"#,
        )
        .unwrap();
        let pipeline = build_pipeline(
            &settings,
            &Overrides {
                api_key: Some("sk-test".into()),
                ..overrides()
            },
        )
        .unwrap();
        assert_eq!(pipeline.config().enrichment_sources, ["news"]);
    }

    #[test]
    fn pipeline_limiter_uses_effective_budget() {
        let pipeline = build_pipeline(
            &Settings::default(),
            &Overrides {
                api_key: Some("sk-test".into()),
                max_requests: Some(3),
                ..overrides()
            },
        )
        .unwrap();
        assert_eq!(pipeline.rate_limiter().config().max_requests, 3);
    }
}
