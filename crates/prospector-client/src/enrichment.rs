use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use prospector_core::error::AppError;
use prospector_core::models::FieldMap;
use prospector_core::traits::Enricher;
use reqwest::Client;
use url::Url;

use crate::fetcher::{USER_AGENT, status_error, transport_error};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct SourceEndpoint {
    url: Url,
    api_key: Option<String>,
}

/// Enricher that queries one JSON HTTP endpoint per source.
///
/// `GET <endpoint>?company=<name>` with an optional bearer token. The
/// response body must be a JSON object; its keys become record fields.
#[derive(Clone)]
pub struct HttpEnricher {
    client: Client,
    sources: Arc<HashMap<String, SourceEndpoint>>,
    timeout_secs: u64,
}

impl HttpEnricher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            sources: Arc::new(HashMap::new()),
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Register `name` to be served from `endpoint`.
    pub fn with_source(
        mut self,
        name: &str,
        endpoint: &str,
        api_key: Option<String>,
    ) -> Result<Self, AppError> {
        let url = Url::parse(endpoint).map_err(|e| {
            AppError::ConfigError(format!("Invalid endpoint for source '{name}': {e}"))
        })?;
        Arc::make_mut(&mut self.sources).insert(name.to_string(), SourceEndpoint { url, api_key });
        Ok(self)
    }

    pub fn has_source(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }
}

impl Enricher for HttpEnricher {
    async fn enrich(&self, source_name: &str, company_name: &str) -> Result<FieldMap, AppError> {
        let source = self.sources.get(source_name).ok_or_else(|| {
            AppError::ConfigError(format!("No endpoint configured for source '{source_name}'"))
        })?;

        let mut url = source.url.clone();
        url.query_pairs_mut().append_pair("company", company_name);

        let mut request = self.client.get(url.as_str());
        if let Some(key) = &source.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &format!("source '{source_name}'")));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            AppError::InvalidResponse(format!("Source '{source_name}' returned invalid JSON: {e}"))
        })?;

        match body {
            serde_json::Value::Object(fields) => {
                tracing::debug!(source = %source_name, fields = fields.len(), "Enrichment data received");
                Ok(fields)
            }
            other => Err(AppError::InvalidResponse(format!(
                "Source '{source_name}' returned {}, expected a JSON object",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
