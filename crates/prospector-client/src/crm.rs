use std::time::Duration;

use chrono::Utc;
use prospector_core::error::AppError;
use prospector_core::models::{CompanyRecord, ReportReference};
use prospector_core::traits::CrmIntegrator;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::fetcher::{USER_AGENT, status_error, transport_error};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Pushes prospects to a CRM through a JSON webhook.
///
/// A 2xx answer counts as accepted. Other 4xx answers (bad request,
/// conflict, ...) mean the CRM refused the update and yield `Ok(false)`;
/// 429, 5xx and transport failures are errors.
#[derive(Clone)]
pub struct WebhookCrmIntegrator {
    client: Client,
    webhook_url: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct CrmPayload<'a> {
    company: &'a CompanyRecord,
    report: &'a ReportReference,
    updated_at: String,
}

impl WebhookCrmIntegrator {
    pub fn new(webhook_url: &str, api_key: Option<String>) -> Result<Self, AppError> {
        url::Url::parse(webhook_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid CRM webhook URL: {e}")))?;
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            webhook_url: webhook_url.to_string(),
            api_key,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        })
    }
}

impl CrmIntegrator for WebhookCrmIntegrator {
    async fn update_crm(
        &self,
        record: &CompanyRecord,
        report: &ReportReference,
    ) -> Result<bool, AppError> {
        let payload = CrmPayload {
            company: record,
            report,
            updated_at: Utc::now().to_rfc3339(),
        };

        let mut request = self.client.post(&self.webhook_url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(company = %record.name, "CRM updated");
            Ok(true)
        } else if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(company = %record.name, status = status.as_u16(), "CRM refused update");
            Ok(false)
        } else {
            Err(status_error(status, "CRM webhook"))
        }
    }
}
