use std::fmt;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, instrument};

use crate::config::GeminiArgs;
use crate::constants;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("GOOGLE_API_KEY is not set")]
    MissingApiKey,
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("Failed to send request to Gemini API at {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Gemini API request to {url} timed out after {}s", .timeout.as_secs_f64())]
    Timeout { url: String, timeout: Duration },
    #[error("Gemini API request failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("Failed to parse JSON response from Gemini API: {0}")]
    Decode(#[source] reqwest::Error),
}

// Structures matching Gemini's generateContent endpoint

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: String,
    pub temperature: f64,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
    #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
    SexuallyExplicit,
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarmBlockThreshold {
    #[serde(rename = "BLOCK_MEDIUM_AND_ABOVE")]
    BlockMediumAndAbove,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
    pub safety_settings: Vec<SafetySetting>,
}

impl GenerateContentRequest {
    /// Single user turn with the fixed generation and safety settings.
    pub fn for_prompt(prompt: &str) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: constants::RESPONSE_MIME_TYPE.to_string(),
                temperature: constants::TEMPERATURE,
            },
            safety_settings: constants::SAFETY_SETTINGS.clone(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
    #[serde(default)]
    pub block_reason_message: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect();
        (!text.is_empty()).then_some(text)
    }

    fn block_reason(&self) -> Option<String> {
        if let Some(feedback) = &self.prompt_feedback {
            if let Some(reason) = &feedback.block_reason {
                let mut detail = format!("Content blocked by API: {}", reason);
                if let Some(message) = &feedback.block_reason_message {
                    detail.push_str(&format!(" - {}", message));
                }
                return Some(detail);
            }
        }
        match self
            .candidates
            .first()
            .and_then(|candidate| candidate.finish_reason.as_deref())
        {
            Some(reason) if reason != "STOP" => {
                Some(format!("Generation finished with reason: {}", reason))
            }
            _ => None,
        }
    }
}

/// The known shapes of a generateContent reply.
///
/// Variants are tried in order; anything that is not a JSON object ends up in
/// `Unrecognized`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ProviderEnvelope {
    /// Pre-extracted text, `{"text": "..."}`.
    Text { text: String },
    /// SDK-style wrapper, `{"response": {"candidates": [...]}}`.
    Wrapped { response: GenerateContentResponse },
    /// Plain REST body, `{"candidates": [...], "promptFeedback": {...}}`.
    Direct(GenerateContentResponse),
    Unrecognized(serde_json::Value),
}

impl ProviderEnvelope {
    pub fn text(&self) -> Option<String> {
        match self {
            Self::Text { text } => (!text.is_empty()).then(|| text.clone()),
            Self::Wrapped { response } | Self::Direct(response) => response.text(),
            Self::Unrecognized(_) => None,
        }
    }

    /// Why generation produced no text, when the provider says so.
    pub fn block_reason(&self) -> Option<String> {
        match self {
            Self::Wrapped { response } | Self::Direct(response) => response.block_reason(),
            Self::Text { .. } | Self::Unrecognized(_) => None,
        }
    }
}

/// Gemini REST client, built once at startup and shared by every request.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GeminiClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey);
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProviderError::Client)?;
        Ok(Self {
            http,
            api_url: api_url.into(),
            api_key,
            model: model.into(),
            timeout,
        })
    }

    pub fn from_args(args: &GeminiArgs) -> Result<Self, ProviderError> {
        Self::new(
            args.api_url.clone(),
            args.api_key.clone(),
            args.model.clone(),
            args.timeout(),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_url.trim_end_matches('/'),
            self.model
        )
    }

    #[instrument(skip(self, prompt), fields(model = %self.model))]
    pub async fn generate(&self, prompt: &str) -> Result<ProviderEnvelope, ProviderError> {
        let url = self.endpoint();
        let request_payload = GenerateContentRequest::for_prompt(prompt);

        debug!("Attempting to call Gemini API...");
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_payload)
            .send()
            .await
            .map_err(|source| {
                if source.is_timeout() {
                    error!(timeout = ?self.timeout, "Gemini API request timed out");
                    ProviderError::Timeout {
                        url: url.clone(),
                        timeout: self.timeout,
                    }
                } else {
                    ProviderError::Request {
                        url: url.clone(),
                        source,
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %body, "Gemini API request failed");
            return Err(ProviderError::Status { status, body });
        }

        let envelope = response
            .json::<ProviderEnvelope>()
            .await
            .map_err(ProviderError::Decode)?;
        debug!(result = ?envelope, "Full Gemini API result");
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: serde_json::Value) -> ProviderEnvelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(GenerateContentRequest::for_prompt("hi")).unwrap();

        assert_eq!(
            body["contents"],
            json!([{"role": "user", "parts": [{"text": "hi"}]}])
        );
        assert_eq!(body["generationConfig"]["temperature"], json!(0.7));
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            json!("application/json")
        );
        assert_eq!(
            body["safetySettings"],
            json!([
                {"category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_MEDIUM_AND_ABOVE"},
                {"category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_MEDIUM_AND_ABOVE"},
                {"category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": "BLOCK_MEDIUM_AND_ABOVE"},
                {"category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": "BLOCK_MEDIUM_AND_ABOVE"},
            ])
        );
    }

    #[test]
    fn test_text_from_direct_response() {
        let env = envelope(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"weekly"}, {"text": "Plan\": {}}"}]},
                "finishReason": "STOP"
            }]
        }));
        assert!(matches!(env, ProviderEnvelope::Direct(_)));
        assert_eq!(env.text().as_deref(), Some("{\"weeklyPlan\": {}}"));
        assert_eq!(env.block_reason(), None);
    }

    #[test]
    fn test_text_from_wrapped_and_text_shapes() {
        let wrapped = envelope(json!({
            "response": {"candidates": [{"content": {"parts": [{"text": "abc"}]}}]}
        }));
        assert!(matches!(wrapped, ProviderEnvelope::Wrapped { .. }));
        assert_eq!(wrapped.text().as_deref(), Some("abc"));

        let text = envelope(json!({"text": "xyz"}));
        assert_eq!(text, ProviderEnvelope::Text { text: "xyz".to_string() });
        assert_eq!(text.text().as_deref(), Some("xyz"));
    }

    #[test]
    fn test_prompt_block_reason() {
        let env = envelope(json!({
            "promptFeedback": {"blockReason": "SAFETY", "blockReasonMessage": "Harassment"}
        }));
        assert_eq!(env.text(), None);
        assert_eq!(
            env.block_reason().as_deref(),
            Some("Content blocked by API: SAFETY - Harassment")
        );
    }

    #[test]
    fn test_finish_reason_without_text() {
        let env = envelope(json!({"candidates": [{"finishReason": "SAFETY"}]}));
        assert_eq!(env.text(), None);
        assert_eq!(
            env.block_reason().as_deref(),
            Some("Generation finished with reason: SAFETY")
        );

        let stopped = envelope(json!({"candidates": [{"finishReason": "STOP"}]}));
        assert_eq!(stopped.block_reason(), None);
    }

    #[test]
    fn test_unrecognized_shapes() {
        let env = envelope(json!("just a string"));
        assert!(matches!(env, ProviderEnvelope::Unrecognized(_)));
        assert_eq!(env.text(), None);
        assert_eq!(env.block_reason(), None);

        let empty = envelope(json!({}));
        assert_eq!(empty.text(), None);
        assert_eq!(empty.block_reason(), None);
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let result = GeminiClient::new("http://localhost", "  ", "m", Duration::from_secs(1));
        assert!(matches!(result, Err(ProviderError::MissingApiKey)));
    }

    #[test]
    fn test_debug_hides_api_key() {
        let client =
            GeminiClient::new("http://localhost:1", "secret-key", "gemini-x", Duration::from_secs(1))
                .unwrap();
        let printed = format!("{:?}", client);
        assert!(!printed.contains("secret-key"), "{printed}");
        assert!(printed.contains("gemini-x"));
    }

    #[test]
    fn test_timeout_error_message() {
        let err = ProviderError::Timeout {
            url: "http://localhost:1/x".to_string(),
            timeout: Duration::from_millis(250),
        };
        assert_eq!(
            err.to_string(),
            "Gemini API request to http://localhost:1/x timed out after 0.25s"
        );
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client =
            GeminiClient::new("http://localhost:1/", "key", "gemini-x", Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            client.endpoint(),
            "http://localhost:1/v1beta/models/gemini-x:generateContent"
        );
    }
}
