//! Merge website and enrichment fields into a [`CompanyRecord`].
//!
//! Precedence on key collision: enrichment over website. `name` always comes
//! from the caller and is never taken from either map.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::AggregationError;
use crate::models::{CompanyRecord, FieldMap, MetricValue, NewsItem, TeamMember};

/// Fields every record must have, besides `name`.
pub const REQUIRED_FIELDS: [&str; 7] = [
    "description",
    "industry",
    "products",
    "team",
    "news",
    "social_media",
    "metrics",
];

/// Combine per-source enrichment maps in the given order; later maps win.
///
/// The orchestrator passes sources in configured order, so the combined map
/// does not depend on which source answered first.
pub fn combine_enrichment<'a, I>(sources: I) -> FieldMap
where
    I: IntoIterator<Item = &'a FieldMap>,
{
    let mut combined = FieldMap::new();
    for fields in sources {
        for (key, value) in fields {
            combined.insert(key.clone(), value.clone());
        }
    }
    combined
}

/// Build a [`CompanyRecord`] from both sources.
///
/// Fails with every missing or mistyped field listed. `null` counts as missing.
pub fn merge(
    website: &FieldMap,
    enrichment: &FieldMap,
    name: &str,
) -> Result<CompanyRecord, AggregationError> {
    let mut buffer = MergeBuffer::new(website, enrichment);

    let name = name.trim();
    if name.is_empty() {
        buffer.missing.push("name".to_string());
    }

    let description: Option<String> = buffer.take("description");
    let industry: Option<String> = buffer.take("industry");
    let products: Option<Vec<String>> = buffer.take("products");
    let team: Option<Vec<TeamMember>> = buffer.take("team");
    let news: Option<Vec<NewsItem>> = buffer.take("news");
    let social_media: Option<BTreeMap<String, String>> = buffer.take("social_media");
    let metrics: Option<BTreeMap<String, MetricValue>> = buffer.take("metrics");

    match (
        description,
        industry,
        products,
        team,
        news,
        social_media,
        metrics,
    ) {
        (
            Some(description),
            Some(industry),
            Some(products),
            Some(team),
            Some(news),
            Some(social_media),
            Some(metrics),
        ) if buffer.missing.is_empty() => Ok(CompanyRecord {
            name: name.to_string(),
            description,
            industry,
            products,
            team,
            news,
            social_media,
            metrics,
        }),
        _ => Err(AggregationError {
            missing: buffer.missing,
            invalid: buffer.invalid,
        }),
    }
}

/// Transient view over both sources used while building one record.
struct MergeBuffer<'a> {
    website: &'a FieldMap,
    enrichment: &'a FieldMap,
    missing: Vec<String>,
    invalid: Vec<String>,
}

impl<'a> MergeBuffer<'a> {
    fn new(website: &'a FieldMap, enrichment: &'a FieldMap) -> Self {
        Self {
            website,
            enrichment,
            missing: Vec::new(),
            invalid: Vec::new(),
        }
    }

    fn lookup(&self, key: &str) -> Option<&'a Value> {
        let present = |map: &'a FieldMap| map.get(key).filter(|v| !v.is_null());
        present(self.enrichment).or_else(|| present(self.website))
    }

    /// Typed value for `key`, recording it as missing or invalid on failure.
    fn take<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        let Some(value) = self.lookup(key) else {
            self.missing.push(key.to_string());
            return None;
        };
        match T::deserialize(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                tracing::debug!(field = key, error = %e, "Field has unexpected shape");
                self.invalid.push(key.to_string());
                None
            }
        }
    }
}
