// Google Gemini API provider implementation
//
// Gemini carries image input as inline_data parts and exposes an explicit
// thinking budget, which the higher-thinking tier uses.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::types::{
    Capability, CompletionOptions, CompletionResponse, ErrorKind, ProviderError,
};
use super::{drive_request, log_call, LlmProvider};
use crate::config::pricing::PricingTable;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const CONNECT_TIMEOUT_SECS: u64 = 10;
const THINKING_BUDGET_TOKENS: i32 = 4096;

/// Google Gemini API provider
#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
    pricing: PricingTable,
}

impl GeminiProvider {
    pub fn new(api_key: String, pricing: PricingTable) -> Result<Self> {
        // No client-wide timeout: per-call deadlines are enforced by the
        // liveness loop in drive_request.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            default_model: "gemini-2.5-flash".to_string(),
            pricing,
        })
    }

    /// Create with custom default model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Override the API base URL (tests point this at a local mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn resolve_model(&self, opts: &CompletionOptions) -> String {
        if opts.model.is_empty() {
            self.default_model.clone()
        } else {
            opts.model.clone()
        }
    }

    fn build_request(&self, parts: Vec<GeminiPart>, opts: &CompletionOptions) -> GeminiRequest {
        let thinking_config = if opts.thinking {
            Some(GeminiThinkingConfig {
                thinking_budget: THINKING_BUDGET_TOKENS,
            })
        } else {
            None
        };

        GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts,
            }],
            generation_config: Some(GeminiGenerationConfig {
                temperature: opts.temperature,
                max_output_tokens: Some(opts.max_tokens as i32),
                thinking_config,
            }),
        }
    }

    async fn execute(
        &self,
        body: GeminiRequest,
        opts: &CompletionOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        let model = self.resolve_model(opts);
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let start = Instant::now();
        let result = self.execute_inner(&url, &body, &model, opts, start).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        log_call("gemini", &model, &result, latency_ms);
        result
    }

    async fn execute_inner(
        &self,
        url: &str,
        body: &GeminiRequest,
        model: &str,
        opts: &CompletionOptions,
        start: Instant,
    ) -> Result<CompletionResponse, ProviderError> {
        tracing::debug!(model, "sending request to Gemini API");

        let send = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .json(body)
            .send();

        let response = drive_request(send, opts).await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &error_body));
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::new(ErrorKind::InvalidResponse, e.to_string()))?;

        let candidate = gemini_response.candidates.into_iter().next().ok_or_else(|| {
            ProviderError::new(
                ErrorKind::InvalidResponse,
                "Gemini returned no candidates in response",
            )
        })?;

        // Only text parts carry the payload; other part kinds are skipped.
        let content = candidate
            .content
            .parts
            .iter()
            .filter_map(|part| match part {
                GeminiPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        let usage = gemini_response.usage_metadata.unwrap_or_default();
        let input_tokens = usage.prompt_token_count;
        let output_tokens = usage.candidates_token_count;

        Ok(CompletionResponse {
            content,
            model: model.to_string(),
            input_tokens,
            output_tokens,
            cost_usd: self.pricing.cost_usd(model, input_tokens, output_tokens),
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(
        &self,
        prompt: &str,
        opts: &CompletionOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        let parts = vec![GeminiPart::Text {
            text: prompt.to_string(),
        }];
        self.execute(self.build_request(parts, opts), opts).await
    }

    async fn complete_with_image(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
        opts: &CompletionOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        let parts = vec![
            GeminiPart::Text {
                text: prompt.to_string(),
            },
            GeminiPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: mime_type.to_string(),
                    data: base64::engine::general_purpose::STANDARD.encode(image),
                },
            },
        ];
        self.execute(self.build_request(parts, opts), opts).await
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Vision => true,
            Capability::ExtendedThinking => true,
        }
    }
}

// Gemini API types

#[derive(Debug, Clone, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiInlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<i32>,
    #[serde(rename = "thinkingConfig", skip_serializing_if = "Option::is_none")]
    thinking_config: Option<GeminiThinkingConfig>,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiThinkingConfig {
    #[serde(rename = "thinkingBudget")]
    thinking_budget: i32,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GeminiUsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
}
