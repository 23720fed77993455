//! TTL cache in front of an [`Enricher`].
//!
//! Wraps any enricher so repeated lookups of the same company in the same
//! source within the TTL are answered from memory. Failures are never cached.

use std::time::Duration;

use moka::future::Cache;

use crate::error::AppError;
use crate::models::FieldMap;
use crate::traits::Enricher;

/// Configuration for [`CachedEnricher`].
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub max_entries: u64,
}

impl Default for CacheConfig {
    /// One hour, 1000 entries.
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_entries: 1000,
        }
    }
}

/// An [`Enricher`] wrapper that caches successful lookups by `(source, company)`.
#[derive(Clone)]
pub struct CachedEnricher<E> {
    inner: E,
    cache: Cache<(String, String), FieldMap>,
}

impl<E: Enricher> CachedEnricher<E> {
    pub fn new(inner: E, config: CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.ttl)
            .build();
        Self { inner, cache }
    }

    fn key(source_name: &str, company_name: &str) -> (String, String) {
        (source_name.to_string(), company_name.trim().to_lowercase())
    }
}

impl<E: Enricher> Enricher for CachedEnricher<E> {
    async fn enrich(&self, source_name: &str, company_name: &str) -> Result<FieldMap, AppError> {
        let key = Self::key(source_name, company_name);
        if let Some(hit) = self.cache.get(&key).await {
            tracing::debug!(source = %source_name, company = %company_name, "Enrichment cache hit");
            return Ok(hit);
        }

        let fields = self.inner.enrich(source_name, company_name).await?;
        self.cache.insert(key, fields.clone()).await;
        Ok(fields)
    }

    async fn cached(&self, source_name: &str, company_name: &str) -> Option<FieldMap> {
        match self.cache.get(&Self::key(source_name, company_name)).await {
            Some(hit) => Some(hit),
            None => self.inner.cached(source_name, company_name).await,
        }
    }
}
