pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod outcome;
pub mod pipeline;
pub mod rate_limiter;
pub mod retry;
pub mod timing;
pub mod traits;
pub mod validation;

#[cfg(test)]
pub mod testutil;

pub use cache::{CacheConfig, CachedEnricher};
pub use config::{PipelineConfig, RateLimitConfig, RetryConfig, Settings};
pub use error::{AppError, PipelineError};
pub use events::{PipelineReporter, PipelineStage, TracingPipelineReporter};
pub use models::{CompanyRecord, FieldMap, compute_hash};
pub use outcome::{OutcomeSummary, PipelineOutcome, ProspectReport};
pub use pipeline::ProspectPipeline;
pub use rate_limiter::RateLimiter;
pub use traits::{Analyzer, CrmIntegrator, Enricher, Fetcher, ReportGenerator, WebsiteExtractor};
