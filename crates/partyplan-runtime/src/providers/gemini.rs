//! Gemini generative-language provider.
//!
//! Calls `models/{model}:generateContent` with a response schema so the
//! reply comes back as JSON text. The key travels in the `x-goog-api-key`
//! header, never in the URL, so it cannot leak through request logs.

use async_trait::async_trait;
use partyplan_core::OutboundPayload;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

use super::secrets::{ApiCredential, CredentialSource};
use super::{CompletionProvider, ProviderError};
use crate::config::RelayConfig;

/// Environment variable name for the Gemini API key.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Longest slice of a non-JSON error body kept in error messages.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Gemini provider.
///
/// Owns its HTTP client; build one per relay and share it through an `Arc`.
pub struct GeminiProvider {
    credential: ApiCredential,
    base_url: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GeminiProvider {
    /// Create a provider with an explicit credential.
    pub fn new(credential: ApiCredential, config: &RelayConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            credential,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout: config.request_timeout,
            client,
        })
    }

    /// Create from configuration, falling back to `GEMINI_API_KEY`.
    pub fn from_config(config: &RelayConfig) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_config_or_env(
            config.api_key.as_deref(),
            GEMINI_API_KEY_ENV,
            "Gemini API key",
        )?;
        Self::new(credential, config)
    }

    /// Full URL of the generateContent endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Where the API key was loaded from.
    pub fn credential_source(&self) -> CredentialSource {
        self.credential.source()
    }

    fn transport_error(&self, error: reqwest::Error) -> ProviderError {
        if error.is_timeout() {
            ProviderError::Timeout(self.timeout)
        } else {
            ProviderError::Transport(error.to_string())
        }
    }
}

/// generateContent request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    system_instruction: Content<'a>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: JsonValue,
    temperature: f32,
}

impl<'a> GenerateContentRequest<'a> {
    fn from_payload(payload: &'a OutboundPayload) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part {
                    text: &payload.user_prompt,
                }],
            }],
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: &payload.system_instruction,
                }],
            },
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: payload.shape.descriptor(),
                temperature: payload.temperature,
            },
        }
    }
}

/// generateContent response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, with its parts concatenated.
    fn into_text(self) -> Result<String, ProviderError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ProviderError::MalformedBody(format!(
                "prompt was blocked: {}",
                reason
            )));
        }

        let candidate = self.candidates.into_iter().next().ok_or_else(|| {
            ProviderError::MalformedBody("response contained no candidates".to_string())
        })?;

        let text: String = candidate
            .content
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::MalformedBody(format!(
                "candidate contained no text (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

/// Upstream error message from a non-success body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error: ErrorDetail {
                message,
                status: Some(status),
            },
        }) => format!("{} ({})", message, status),
        Ok(envelope) => envelope.error.message,
        Err(_) => body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect(),
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn generate(&self, payload: &OutboundPayload) -> Result<String, ProviderError> {
        let request = GenerateContentRequest::from_payload(payload);

        // SECURITY: Only expose the credential here, at the point of use
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.credential.expose())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited { retry_after });
        }

        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        serde_json::from_str::<GenerateContentResponse>(&body)
            .map_err(|e| ProviderError::MalformedBody(e.to_string()))?
            .into_text()
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::relay::{Relay, RelayError, UpstreamFault};
    use partyplan_core::{build_payload, PlanningKind, PlanningRequest};
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ENDPOINT_PATH: &str = "/models/test-model:generateContent";

    fn menu_payload() -> OutboundPayload {
        let body = json!({ "guests": 10, "mainCourses": "pasta" });
        build_payload(&PlanningRequest::validate(PlanningKind::Menu, &body).unwrap())
    }

    fn provider_for(server: &MockServer, request_timeout: Duration) -> GeminiProvider {
        let config = RelayConfig {
            base_url: server.uri(),
            model: "test-model".to_string(),
            request_timeout,
            ..Default::default()
        };
        let credential = ApiCredential::new("test-key", CredentialSource::Programmatic, "Gemini API key");
        GeminiProvider::new(credential, &config).unwrap()
    }

    fn candidate_body(text: &str) -> JsonValue {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        })
    }

    #[test]
    fn test_request_wire_format() {
        let payload = menu_payload();
        let wire = serde_json::to_value(GenerateContentRequest::from_payload(&payload)).unwrap();

        assert_eq!(wire["contents"][0]["role"], "user");
        assert_eq!(wire["contents"][0]["parts"][0]["text"], payload.user_prompt.as_str());
        assert_eq!(
            wire["systemInstruction"]["parts"][0]["text"],
            payload.system_instruction.as_str()
        );
        assert!(wire["systemInstruction"].get("role").is_none());
        assert_eq!(wire["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(wire["generationConfig"]["responseSchema"], payload.shape.descriptor());
    }

    #[test]
    fn test_text_parts_are_concatenated() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"plan\":[]," }, { "text": "\"summary\":\"\"}" }] }
            }]
        }))
        .unwrap();
        assert_eq!(response.into_text().unwrap(), r#"{"plan":[],"summary":""}"#);
    }

    #[test]
    fn test_missing_candidates_is_malformed() {
        let response: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(response.into_text(), Err(ProviderError::MalformedBody(_))));

        let blocked: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        let err = blocked.into_text().unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"error":{"code":400,"message":"Invalid JSON payload received.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            error_message(body),
            "Invalid JSON payload received. (INVALID_ARGUMENT)"
        );
        assert_eq!(error_message("  upstream exploded \n"), "upstream exploded");
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let config = RelayConfig::default();
        let credential =
            ApiCredential::new("AIza-super-secret", CredentialSource::Programmatic, "Gemini API key");
        let provider = GeminiProvider::new(credential, &config).unwrap();

        let debug = format!("{:?}", provider);
        assert!(!debug.contains("AIza-super-secret"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!provider.endpoint().contains("AIza-super-secret"));
    }

    #[tokio::test]
    async fn test_generate_returns_candidate_text() {
        let server = MockServer::start().await;
        let plan = r#"{"plan":[{"item":"pasta","quantity":"5 lbs","category":"Main Course"}],"summary":"Assumed 0.5 lb per guest."}"#;

        Mock::given(method("POST"))
            .and(path(ENDPOINT_PATH))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate_body(plan)))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server, Duration::from_secs(5));
        let text = provider.generate(&menu_payload()).await.unwrap();
        assert_eq!(text, plan);
    }

    #[tokio::test]
    async fn test_bad_request_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": 400, "message": "Unknown name \"tools\"", "status": "INVALID_ARGUMENT" }
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server, Duration::from_secs(5));
        let err = provider.generate(&menu_payload()).await.unwrap_err();

        match err {
            ProviderError::Api { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("INVALID_ARGUMENT"));
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_reads_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT_PATH))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "7")
                    .set_body_json(json!({ "error": { "code": 429, "message": "quota" } })),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server, Duration::from_secs(5));
        let err = provider.generate(&menu_payload()).await.unwrap_err();

        assert!(matches!(
            err,
            ProviderError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(7)
        ));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
            .mount(&server)
            .await;

        let provider = provider_for(&server, Duration::from_secs(5));
        let err = provider.generate(&menu_payload()).await.unwrap_err();

        assert_eq!(err.status(), Some(503));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(candidate_body("[]"))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server, Duration::from_millis(100));
        let err = provider.generate(&menu_payload()).await.unwrap_err();

        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_non_json_success_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy page</html>"))
            .mount(&server)
            .await;

        let provider = provider_for(&server, Duration::from_secs(5));
        let err = provider.generate(&menu_payload()).await.unwrap_err();

        assert!(matches!(err, ProviderError::MalformedBody(_)));
    }

    fn fast_retry_config(server: &MockServer) -> RelayConfig {
        RelayConfig {
            base_url: server.uri(),
            model: "test-model".to_string(),
            request_timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(20),
                max_delay: Duration::from_millis(100),
            },
            ..Default::default()
        }
    }

    fn relay_for(server: &MockServer) -> Relay {
        let config = fast_retry_config(server);
        let credential =
            ApiCredential::new("test-key", CredentialSource::Programmatic, "Gemini API key");
        let provider = GeminiProvider::new(credential, &config).unwrap();
        Relay::new(Arc::new(provider), config)
    }

    #[test]
    fn test_reports_model_and_credential_source() {
        let config = RelayConfig {
            model: "gemini-2.0-flash".to_string(),
            api_key: Some("from-config".to_string()),
            ..Default::default()
        };
        let provider = GeminiProvider::from_config(&config).unwrap();

        assert_eq!(provider.model(), "gemini-2.0-flash");
        assert_eq!(provider.credential_source(), CredentialSource::Config);
        assert!(provider.endpoint().ends_with("/models/gemini-2.0-flash:generateContent"));
    }

    #[tokio::test]
    async fn test_relay_recovers_after_two_unavailable_replies() {
        let server = MockServer::start().await;
        let plan = r#"{"plan":[{"item":"pasta","quantity":"5 lbs","category":"Main Course"}],"summary":"Assumed 0.5 lb per guest."}"#;

        Mock::given(method("POST"))
            .and(path(ENDPOINT_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "error": { "code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE" }
            })))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate_body(plan)))
            .expect(1)
            .mount(&server)
            .await;

        let body = json!({ "guests": 10, "mainCourses": "pasta" });
        let value = relay_for(&server).plan(PlanningKind::Menu, &body).await.unwrap();

        assert_eq!(value, serde_json::from_str::<JsonValue>(plan).unwrap());
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_relay_stops_after_upstream_bad_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": 400, "message": "Invalid value at 'generation_config'", "status": "INVALID_ARGUMENT" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let body = json!({ "guests": 10, "mainCourses": "pasta" });
        let err = relay_for(&server).plan(PlanningKind::Menu, &body).await.unwrap_err();

        assert!(matches!(
            err,
            RelayError::Upstream {
                fault: UpstreamFault::RejectedRequest,
                ..
            }
        ));
        assert!(err.to_string().contains("INVALID_ARGUMENT"));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_relay_exhausts_budget_on_persistent_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
            .expect(3)
            .mount(&server)
            .await;

        let body = json!({ "guests": 10, "mainCourses": "pasta" });
        let err = relay_for(&server).plan(PlanningKind::Menu, &body).await.unwrap_err();

        match err {
            RelayError::Transient { attempts, cause } => {
                assert_eq!(attempts, 3);
                assert_eq!(cause.status(), Some(500));
            }
            other => panic!("Expected Transient, got {:?}", other),
        }
    }
}
