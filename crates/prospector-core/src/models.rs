use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Untyped key/value data produced by extraction and enrichment collaborators.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

/// A key person at the company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    pub role: String,
}

/// A recent news item about the company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub headline: String,
    pub date: String,
    pub source: String,
}

/// A business metric: head count, revenue, funding stage, ...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Integer(v) => write!(f, "{v}"),
            MetricValue::Float(v) => write!(f, "{v}"),
            MetricValue::Text(v) => f.write_str(v),
        }
    }
}

/// The aggregated, validated view of a company.
///
/// Only built by [`aggregator::merge`](crate::aggregator::merge) once every
/// required field is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub name: String,
    pub description: String,
    pub industry: String,
    pub products: Vec<String>,
    pub team: Vec<TeamMember>,
    pub news: Vec<NewsItem>,
    /// Platform -> handle or profile URL.
    pub social_media: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, MetricValue>,
}

/// Market assessment returned by the analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub market_position: String,
    #[serde(default)]
    pub opportunities: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    /// Any additional keys the model returned.
    #[serde(flatten)]
    pub extra: FieldMap,
}

/// Everything the report generator receives besides the record itself.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisBundle {
    pub analysis: Option<AnalysisResult>,
    pub profile: Option<String>,
}

/// Where a generated report ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportReference {
    /// File path or URL of the report.
    pub location: String,
    /// SHA-256 of the report body.
    pub content_hash: String,
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash_consistency() {
        let h1 = compute_hash("hello world");
        let h2 = compute_hash("hello world");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, compute_hash("hello"));
    }

    #[test]
    fn test_metric_value_accepts_numbers_and_strings() {
        let metrics: BTreeMap<String, MetricValue> = serde_json::from_value(serde_json::json!({
            "employees": 120,
            "growth": 0.35,
            "stage": "Series B"
        }))
        .unwrap();

        assert_eq!(metrics["employees"], MetricValue::Integer(120));
        assert_eq!(metrics["growth"], MetricValue::Float(0.35));
        assert_eq!(metrics["stage"], MetricValue::Text("Series B".into()));
        assert_eq!(metrics["stage"].to_string(), "Series B");
    }

    #[test]
    fn test_analysis_result_keeps_extra_keys() {
        let analysis: AnalysisResult = serde_json::from_value(serde_json::json!({
            "market_position": "Challenger",
            "opportunities": ["EU expansion"],
            "competitors": ["Globex"]
        }))
        .unwrap();

        assert_eq!(analysis.market_position, "Challenger");
        assert!(analysis.risks.is_empty());
        assert_eq!(analysis.extra["competitors"], serde_json::json!(["Globex"]));
    }
}
