use std::time::Duration;

use prospector_core::error::AppError;
use prospector_core::models::{AnalysisResult, CompanyRecord};
use prospector_core::traits::Analyzer;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::fetcher::transport_error;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(120);
const ANALYSIS_SYSTEM_PROMPT: &str = "You are a market analyst. Assess the company's market position, growth opportunities and risks. Respond ONLY with a JSON object with the keys \"market_position\" (string), \"opportunities\" (array of strings) and \"risks\" (array of strings). Do not include explanations.";
const PROFILE_SYSTEM_PROMPT: &str = "You are an expert business analyst writing concise company profiles for a sales team.";
const PROFILE_TEMPERATURE: f32 = 0.7;
const PROFILE_MAX_TOKENS: u32 = 1000;

/// OpenAI-compatible LLM client for company analysis.
///
/// Works with any OpenAI-compatible API, including:
/// - OpenAI directly (`https://api.openai.com/v1`)
/// - Gemini via compatibility layer (`https://generativelanguage.googleapis.com/v1beta/openai`)
#[derive(Clone)]
pub struct OpenAiAnalyzer {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl OpenAiAnalyzer {
    pub fn new(api_key: &str, model: &str) -> Result<Self, AppError> {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Result<Self, AppError> {
        Self::build(api_key, model, base_url, DEFAULT_LLM_TIMEOUT)
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self, AppError> {
        Self::build(&self.api_key, &self.model, &self.base_url, timeout)
    }

    fn build(
        api_key: &str,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    async fn complete(&self, request: &ChatRequest<'_>) -> Result<String, AppError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            if status_code == 429 {
                return Err(AppError::RateLimitExceeded);
            }
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {status_code}: {body}"));

            return Err(AppError::LlmError {
                message,
                status_code,
                retryable: status_code >= 500,
            });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to parse LLM response: {e}")))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AppError::LlmError {
                message: "Empty response from LLM".into(),
                status_code: 200,
                retryable: false,
            })
    }
}

// ---- OpenAI API types ----

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn system(content: &str) -> Message {
    Message {
        role: "system",
        content: content.to_string(),
    }
}

fn user(content: String) -> Message {
    Message {
        role: "user",
        content,
    }
}

/// Plain-text rendering of a record for prompts.
fn describe_record(record: &CompanyRecord) -> String {
    let mut out = format!(
        "Company: {}\nIndustry: {}\nDescription: {}\n",
        record.name, record.industry, record.description
    );
    if !record.products.is_empty() {
        out.push_str(&format!("Products: {}\n", record.products.join(", ")));
    }
    if !record.team.is_empty() {
        let team: Vec<String> = record
            .team
            .iter()
            .map(|m| format!("{} ({})", m.name, m.role))
            .collect();
        out.push_str(&format!("Team: {}\n", team.join(", ")));
    }
    for (key, value) in &record.metrics {
        out.push_str(&format!("Metric {key}: {value}\n"));
    }
    for item in &record.news {
        out.push_str(&format!("News: {} ({}, {})\n", item.headline, item.source, item.date));
    }
    out
}

impl Analyzer for OpenAiAnalyzer {
    async fn analyze(&self, record: &CompanyRecord) -> Result<AnalysisResult, AppError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![system(ANALYSIS_SYSTEM_PROMPT), user(describe_record(record))],
            response_format: Some(ResponseFormat {
                format_type: "json_object",
            }),
            temperature: None,
            max_tokens: None,
        };

        let content = self.complete(&request).await?;
        serde_json::from_str(&content).map_err(|e| {
            AppError::InvalidResponse(format!("LLM returned invalid analysis JSON: {e}. Raw: {content}"))
        })
    }

    async fn generate_profile(&self, record: &CompanyRecord) -> Result<String, AppError> {
        let prompt = format!(
            "Write a company profile covering what the company does, its products, \
             leadership, recent developments and key metrics.\n\n{}",
            describe_record(record)
        );
        let request = ChatRequest {
            model: &self.model,
            messages: vec![system(PROFILE_SYSTEM_PROMPT), user(prompt)],
            response_format: None,
            temperature: Some(PROFILE_TEMPERATURE),
            max_tokens: Some(PROFILE_MAX_TOKENS),
        };

        self.complete(&request).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use axum::Json;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use prospector_core::models::{MetricValue, TeamMember};
    use serde_json::{Value, json};

    use super::*;
    use crate::test_server::serve;

    fn record() -> CompanyRecord {
        CompanyRecord {
            name: "Acme".into(),
            description: "Industrial robotics".into(),
            industry: "Robotics".into(),
            products: vec!["ArmOne".into()],
            team: vec![TeamMember {
                name: "Ada Park".into(),
                role: "CEO".into(),
            }],
            news: vec![],
            social_media: BTreeMap::new(),
            metrics: BTreeMap::from([("employees".into(), MetricValue::Integer(85))]),
        }
    }

    fn reply(content: &str) -> Json<Value> {
        Json(json!({"choices": [{"message": {"role": "assistant", "content": content}}]}))
    }

    /// Echoes back a canned answer depending on whether JSON output was requested.
    async fn completions(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer sk-test") {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": {"message": "Invalid API key"}})),
            );
        }
        let prompt = body["messages"][1]["content"].as_str().unwrap_or_default();
        assert!(prompt.contains("Company: Acme"));
        assert!(prompt.contains("Ada Park (CEO)"));

        if body["response_format"]["type"] == "json_object" {
            (
                StatusCode::OK,
                reply(r#"{"market_position": "Challenger", "opportunities": ["EU"], "risks": [], "competitors": ["Globex"]}"#),
            )
        } else {
            assert_eq!(body["max_tokens"], 1000);
            (StatusCode::OK, reply("Acme builds robot arms."))
        }
    }

    async fn analyzer(api_key: &str) -> OpenAiAnalyzer {
        let app = Router::new().route("/chat/completions", post(completions));
        let base = serve(app).await;
        OpenAiAnalyzer::with_base_url(api_key, DEFAULT_MODEL, &base).unwrap()
    }

    #[tokio::test]
    async fn analyze_parses_json_answer() {
        let analysis = analyzer("sk-test").await.analyze(&record()).await.unwrap();
        assert_eq!(analysis.market_position, "Challenger");
        assert_eq!(analysis.opportunities, ["EU"]);
        assert_eq!(analysis.extra["competitors"], json!(["Globex"]));
    }

    #[tokio::test]
    async fn profile_returns_text() {
        let profile = analyzer("sk-test")
            .await
            .generate_profile(&record())
            .await
            .unwrap();
        assert_eq!(profile, "Acme builds robot arms.");
    }

    #[tokio::test]
    async fn api_error_message_is_surfaced() {
        let err = analyzer("wrong").await.analyze(&record()).await.unwrap_err();
        match err {
            AppError::LlmError {
                message,
                status_code,
                retryable,
            } => {
                assert_eq!(message, "Invalid API key");
                assert_eq!(status_code, 401);
                assert!(!retryable);
            }
            other => panic!("expected LLM error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_analysis_is_invalid_response() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { reply("Acme is doing great!") }),
        );
        let base = serve(app).await;
        let analyzer = OpenAiAnalyzer::with_base_url("sk-test", DEFAULT_MODEL, &base).unwrap();

        let err = analyzer.analyze(&record()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn rate_limit_maps_to_rate_limit_exceeded() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { StatusCode::TOO_MANY_REQUESTS }),
        );
        let base = serve(app).await;
        let analyzer = OpenAiAnalyzer::with_base_url("sk-test", DEFAULT_MODEL, &base).unwrap();

        let err = analyzer.generate_profile(&record()).await.unwrap_err();
        assert!(matches!(err, AppError::RateLimitExceeded));
    }
}
