//! # Model-Based Receipt Parser
//!
//! Primary structured parser. The OCR text is sent to a generative model
//! with a strict JSON contract; the reply is cleaned into a
//! [`ModelCandidate`] and classified as a [`PrimaryOutcome`].
//!
//! Nothing in here returns an error to the pipeline. Network failures,
//! refusals, malformed replies and an open circuit breaker all become
//! `PrimaryOutcome::Failed`, which the pipeline answers with the fallback
//! parser.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::circuit_breaker::CircuitBreaker;
use crate::draft::{
    clamp_confidence, is_unknown_merchant, sanitize_amount, truncate_merchant, ParseStrategy,
    ReceiptCategory, ReceiptDraft, UNKNOWN_MERCHANT,
};
use crate::errors::error_logging;
use crate::fallback_parser;
use crate::observability;
use crate::receipt_config::ModelConfig;

/// Confidence assumed when the model omits one
pub const DEFAULT_MODEL_CONFIDENCE: f64 = 0.3;

/// Reason reported when no model client is configured
pub const DISABLED_REASON: &str = "primary parser disabled";

/// Maximum number of characters of an HTTP error body kept in errors
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Boxed future returned by [`ModelClient::generate`]
pub type ModelFuture<'a> = Pin<Box<dyn Future<Output = Result<String, ModelClientError>> + Send + 'a>>;

/// Errors raised while talking to the model service
#[derive(Debug, Clone, PartialEq)]
pub enum ModelClientError {
    /// The client is missing required settings
    NotConfigured(String),
    /// The service could not be reached
    Connection(String),
    /// The request did not finish in time
    Timeout(String),
    /// The service answered with a non-success status
    Http { status: u16, body: String },
    /// The response envelope could not be decoded
    ResponseParsing(String),
    /// The response carried no text
    EmptyResponse,
}

impl std::fmt::Display for ModelClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelClientError::NotConfigured(msg) => write!(f, "model client not configured: {}", msg),
            ModelClientError::Connection(msg) => write!(f, "cannot reach model service: {}", msg),
            ModelClientError::Timeout(msg) => write!(f, "model request timed out: {}", msg),
            ModelClientError::Http { status, body } => {
                write!(f, "model service returned HTTP {}: {}", status, body)
            }
            ModelClientError::ResponseParsing(msg) => {
                write!(f, "cannot decode model response: {}", msg)
            }
            ModelClientError::EmptyResponse => write!(f, "model response contained no text"),
        }
    }
}

impl std::error::Error for ModelClientError {}

/// A remote text-generation model.
///
/// One call, one prompt, one reply. Implementations must not retry.
pub trait ModelClient: Send + Sync {
    /// Send `prompt` and return the raw reply text
    fn generate<'a>(&'a self, prompt: &'a str) -> ModelFuture<'a>;

    /// Endpoint used in log records
    fn endpoint(&self) -> Option<&str> {
        None
    }

    /// Model identifier used in log records
    fn model(&self) -> Option<&str> {
        None
    }
}

/// Client for the Gemini `generateContent` HTTP API
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .filter_map(|part| part.text)
            .find(|text| !text.trim().is_empty())
    }
}

impl GeminiClient {
    /// Build a client from the model settings
    ///
    /// # Errors
    ///
    /// `NotConfigured` when no API key is set or the HTTP client cannot be built.
    pub fn new(config: &ModelConfig) -> Result<Self, ModelClientError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ModelClientError::NotConfigured("API key is not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ModelClientError::NotConfigured(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.to_string(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn request_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    fn map_send_error(&self, error: reqwest::Error) -> ModelClientError {
        if error.is_timeout() {
            ModelClientError::Timeout(format!("no reply after {}s", self.timeout_secs))
        } else if error.is_connect() {
            ModelClientError::Connection(self.endpoint.clone())
        } else {
            ModelClientError::Connection(error.to_string())
        }
    }
}

impl ModelClient for GeminiClient {
    fn generate<'a>(&'a self, prompt: &'a str) -> ModelFuture<'a> {
        Box::pin(async move {
            let body = GenerateRequest {
                contents: vec![RequestContent {
                    parts: vec![RequestPart { text: prompt }],
                }],
                generation_config: GenerationConfig { temperature: 0.1 },
            };

            let response = self
                .client
                .post(self.request_url())
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| self.map_send_error(e))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ModelClientError::Http {
                    status: status.as_u16(),
                    body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
                });
            }

            let parsed: GenerateResponse = response
                .json()
                .await
                .map_err(|e| ModelClientError::ResponseParsing(e.to_string()))?;

            parsed.first_text().ok_or(ModelClientError::EmptyResponse)
        })
    }

    fn endpoint(&self) -> Option<&str> {
        Some(&self.endpoint)
    }

    fn model(&self) -> Option<&str> {
        Some(&self.model)
    }
}

/// Cleaned model reply. Every field already satisfies the draft invariants.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCandidate {
    pub merchant: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub category: ReceiptCategory,
    pub confidence: f64,
}

impl ModelCandidate {
    /// Turn the candidate into a primary draft carrying the OCR text
    pub fn into_draft(self, extracted_text: String) -> ReceiptDraft {
        ReceiptDraft {
            merchant: self.merchant,
            amount: self.amount,
            date: self.date,
            category: self.category,
            extracted_text,
            confidence: self.confidence,
            parsed_with: ParseStrategy::Primary,
        }
    }
}

/// Result of one primary parse attempt
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryOutcome {
    /// Usable structured result
    Parsed(ModelCandidate),
    /// Well-formed reply that found no merchant
    Degenerate(ModelCandidate),
    /// No usable reply, with the reason
    Failed(String),
}

impl PrimaryOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PrimaryOutcome::Parsed(_) => "parsed",
            PrimaryOutcome::Degenerate(_) => "degenerate",
            PrimaryOutcome::Failed(_) => "failed",
        }
    }
}

/// Build the extraction prompt for `text`
pub fn build_prompt(text: &str) -> String {
    let categories = ReceiptCategory::ALL
        .iter()
        .map(|category| format!("\"{}\"", category.label()))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You extract transaction details from receipt text produced by OCR.\n\
         Reply with exactly one JSON object and nothing else, in this shape:\n\
         {{\"merchant\": string, \"amount\": number, \"date\": \"YYYY-MM-DD\", \"category\": string, \"confidence\": number}}\n\
         Rules:\n\
         - merchant: the store or business name as printed\n\
         - amount: the final total paid, as a plain number without currency symbols\n\
         - date: the purchase date in YYYY-MM-DD format\n\
         - category: one of {categories}\n\
         - confidence: how sure you are of the result, between 0 and 1\n\
         If a field is unknown use: merchant=\"{unknown}\", amount=0, category=\"Other\", confidence=0.3, and omit the date.\n\
         \n\
         Receipt text:\n\
         {text}",
        categories = categories,
        unknown = UNKNOWN_MERCHANT,
        text = text,
    )
}

/// Cut a model reply down to its JSON object.
///
/// A fenced code block is unwrapped first; then everything before the first
/// `{` and after the last `}` is dropped. `None` when no object is present.
pub fn strip_response_markup(raw: &str) -> Option<&str> {
    let mut body = raw.trim();

    if let Some(fence_start) = body.find("```") {
        let after_fence = &body[fence_start + 3..];
        let after_tag = after_fence
            .strip_prefix("json")
            .or_else(|| after_fence.strip_prefix("JSON"))
            .unwrap_or(after_fence);
        body = match after_tag.find("```") {
            Some(fence_end) => &after_tag[..fence_end],
            None => after_tag,
        };
    }

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start < end).then(|| &body[start..=end])
}

/// Lenient view of the reply; every field may be missing or mistyped
#[derive(Debug, Default, Deserialize)]
struct RawCandidate {
    #[serde(default)]
    merchant: Option<Value>,
    #[serde(default)]
    amount: Option<Value>,
    #[serde(default)]
    date: Option<Value>,
    #[serde(default)]
    category: Option<Value>,
    #[serde(default)]
    confidence: Option<Value>,
}

/// Parse and clean a raw model reply
pub fn interpret_model_response(raw: &str, today: NaiveDate) -> PrimaryOutcome {
    let Some(json) = strip_response_markup(raw) else {
        return PrimaryOutcome::Failed("no JSON object in model response".to_string());
    };

    let parsed: RawCandidate = match serde_json::from_str(json) {
        Ok(parsed) => parsed,
        Err(e) => return PrimaryOutcome::Failed(format!("malformed JSON in model response: {}", e)),
    };

    let candidate = clean_candidate(parsed, today);
    if is_unknown_merchant(&candidate.merchant) {
        PrimaryOutcome::Degenerate(candidate)
    } else {
        PrimaryOutcome::Parsed(candidate)
    }
}

fn clean_candidate(raw: RawCandidate, today: NaiveDate) -> ModelCandidate {
    let merchant = match raw.merchant {
        Some(Value::String(name)) if !name.trim().is_empty() => truncate_merchant(&name),
        _ => UNKNOWN_MERCHANT.to_string(),
    };

    let amount = raw.amount.as_ref().and_then(value_as_number).map(sanitize_amount).unwrap_or(0.0);

    let date = match raw.date {
        Some(Value::String(date)) => resolve_date(&date).unwrap_or(today),
        _ => today,
    };

    let category = match raw.category {
        Some(Value::String(label)) => ReceiptCategory::from_label(&label),
        _ => ReceiptCategory::Other,
    };

    let confidence = raw
        .confidence
        .as_ref()
        .and_then(value_as_number)
        .map(clamp_confidence)
        .unwrap_or(DEFAULT_MODEL_CONFIDENCE);

    ModelCandidate {
        merchant,
        amount,
        date,
        category,
        confidence,
    }
}

/// Numbers pass through; numeric strings are parsed with separators and
/// currency symbols removed.
fn value_as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let cleaned: String = text
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse().ok()
        }
        _ => None,
    }
}

/// ISO first, then the same shapes the fallback parser understands
fn resolve_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .or_else(|| fallback_parser::extract_date(raw))
}

/// The primary parser: a model client behind a circuit breaker
pub struct PrimaryParser {
    client: Option<Arc<dyn ModelClient>>,
    breaker: CircuitBreaker,
}

impl PrimaryParser {
    pub fn new(client: Arc<dyn ModelClient>, breaker: CircuitBreaker) -> Self {
        Self {
            client: Some(client),
            breaker,
        }
    }

    /// A parser that always reports [`DISABLED_REASON`]
    pub fn disabled() -> Self {
        Self {
            client: None,
            breaker: CircuitBreaker::from_config(&ModelConfig::default()),
        }
    }

    /// Build from settings; disabled when no API key is configured
    ///
    /// # Errors
    ///
    /// Returns the client construction error when a key is set but the HTTP
    /// client cannot be created.
    pub fn from_config(config: &ModelConfig) -> Result<Self, ModelClientError> {
        if !config.is_enabled() {
            info!("No model API key configured, primary receipt parser disabled");
            return Ok(Self::disabled());
        }

        let client = GeminiClient::new(config)?;
        info!(model = %config.model, "Primary receipt parser enabled");
        Ok(Self::new(Arc::new(client), CircuitBreaker::from_config(config)))
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run one parse attempt over `text`
    pub async fn parse(&self, text: &str, today: NaiveDate) -> PrimaryOutcome {
        let Some(client) = &self.client else {
            return PrimaryOutcome::Failed(DISABLED_REASON.to_string());
        };

        if text.trim().is_empty() {
            return PrimaryOutcome::Failed("no text to parse".to_string());
        }

        if self.breaker.is_open() {
            debug!("Circuit breaker open, skipping model call");
            return PrimaryOutcome::Failed("circuit breaker open".to_string());
        }

        let prompt = build_prompt(text);
        match client.generate(&prompt).await {
            Ok(reply) => {
                self.breaker.record_success();
                observability::update_circuit_breaker_state(false);
                let outcome = interpret_model_response(&reply, today);
                debug!(outcome = outcome.label(), "Model reply interpreted");
                outcome
            }
            Err(e) => {
                self.breaker.record_failure();
                observability::update_circuit_breaker_state(self.breaker.is_open());
                error_logging::log_model_error(&e, "generate", client.endpoint(), client.model());
                PrimaryOutcome::Failed(e.to_string())
            }
        }
    }
}
