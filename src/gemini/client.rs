use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::debug;

use super::error::GeminiError;
use super::types::{ErrorEnvelope, GenerateRequest, GenerateResponse};

const API_URL: &str = "https://generativelanguage.googleapis.com";

const RETRY_INFO_TYPE: &str = "type.googleapis.com/google.rpc.RetryInfo";

/// The outbound call boundary: one request in, generated text or a failure out.
///
/// The dispatcher only sees this trait, so tests substitute scripted generators.
#[allow(async_fn_in_trait)]
pub trait ContentGenerator {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, GeminiError>;
}

pub struct GeminiClient {
    api_key: String,
    model: String,
    client: Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Result<Self, GeminiError> {
        Self::with_base_url(api_key, model, API_URL.to_string())
    }

    /// Create a client pointing at a custom base URL (useful for testing).
    pub fn with_base_url(
        api_key: String,
        model: String,
        base_url: String,
    ) -> Result<Self, GeminiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            api_key,
            model,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

impl ContentGenerator for GeminiClient {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, GeminiError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(req)
            .send()
            .await?;

        let status = response.status();
        debug!(model = %self.model, status = status.as_u16(), "generateContent responded");

        if !status.is_success() {
            let header_delay = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(classify_failure(status, &body, header_delay));
        }

        let body = response.text().await?;
        let parsed = serde_json::from_str::<GenerateResponse>(&body)
            .map_err(|e| GeminiError::Decode(e.to_string()))?;

        let usage = parsed.usage();
        debug!(
            model = %self.model,
            finish_reason = parsed.finish_reason().unwrap_or("none"),
            prompt_tokens = usage.prompt_token_count,
            output_tokens = usage.candidates_token_count,
            total_tokens = usage.total_token_count,
            "generation finished"
        );
        Ok(parsed)
    }
}

/// Maps a non-success response onto [`GeminiError`].
///
/// A `RetryInfo` detail in the body wins over a `Retry-After` header.
fn classify_failure(status: StatusCode, body: &str, header_delay: Option<Duration>) -> GeminiError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();

    let message = envelope
        .as_ref()
        .map(|e| e.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.to_string());

    let exhausted = envelope
        .as_ref()
        .is_some_and(|e| e.error.status == "RESOURCE_EXHAUSTED");

    if status == StatusCode::TOO_MANY_REQUESTS || exhausted {
        let body_delay = envelope.as_ref().and_then(|e| {
            e.error
                .details
                .iter()
                .filter(|d| d.type_url == RETRY_INFO_TYPE)
                .find_map(|d| d.retry_delay.as_deref().and_then(parse_retry_delay))
        });
        return GeminiError::QuotaExceeded {
            retry_after: body_delay.or(header_delay),
            message,
        };
    }

    GeminiError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Parses a protobuf JSON duration such as `"17s"` or `"0.5s"`.
fn parse_retry_delay(raw: &str) -> Option<Duration> {
    let secs = raw.trim().strip_suffix('s')?.parse::<f64>().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}
