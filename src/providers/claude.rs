// Anthropic Claude API provider implementation
//
// Speaks the messages API. Images travel as base64 source blocks; the
// higher-thinking tier maps onto the extended-thinking budget.

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

const CLAUDE_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const CONNECT_TIMEOUT_SECS: u64 = 10;
const THINKING_BUDGET_TOKENS: u32 = 4096;

/// Anthropic Claude API provider
#[derive(Clone)]
pub struct ClaudeProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
    pricing: PricingTable,
}

impl ClaudeProvider {
    pub fn new(api_key: String, pricing: PricingTable) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: CLAUDE_BASE_URL.to_string(),
            default_model: "claude-sonnet-4-20250514".to_string(),
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

    fn build_request(
        &self,
        content: Vec<ClaudeContentBlock>,
        opts: &CompletionOptions,
    ) -> ClaudeRequest {
        // Extended thinking requires the budget to fit under max_tokens.
        let (max_tokens, thinking) = if opts.thinking {
            (
                opts.max_tokens.max(THINKING_BUDGET_TOKENS + 1024),
                Some(ClaudeThinking {
                    thinking_type: "enabled".to_string(),
                    budget_tokens: THINKING_BUDGET_TOKENS,
                }),
            )
        } else {
            (opts.max_tokens, None)
        };

        ClaudeRequest {
            model: self.resolve_model(opts),
            max_tokens,
            messages: vec![ClaudeMessage {
                role: "user".to_string(),
                content,
            }],
            temperature: if opts.thinking { None } else { opts.temperature },
            thinking,
        }
    }

    async fn execute(
        &self,
        body: ClaudeRequest,
        opts: &CompletionOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        let model = body.model.clone();
        let url = format!("{}/v1/messages", self.base_url);

        let start = Instant::now();
        let result = self.execute_inner(&url, &body, &model, start, opts).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        log_call("claude", &model, &result, latency_ms);
        result
    }

    async fn execute_inner(
        &self,
        url: &str,
        body: &ClaudeRequest,
        model: &str,
        start: Instant,
        opts: &CompletionOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        tracing::debug!(model, "sending request to Claude API");

        let send = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send();

        let response = drive_request(send, opts).await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &error_body));
        }

        let message: ClaudeResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::new(ErrorKind::InvalidResponse, e.to_string()))?;

        // Thinking blocks precede the text block; only text carries the payload.
        let content = message
            .content
            .iter()
            .filter_map(|block| match block {
                ClaudeResponseBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        let input_tokens = message.usage.input_tokens;
        let output_tokens = message.usage.output_tokens;

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
impl LlmProvider for ClaudeProvider {
    async fn complete(
        &self,
        prompt: &str,
        opts: &CompletionOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        let content = vec![ClaudeContentBlock::Text {
            text: prompt.to_string(),
        }];
        self.execute(self.build_request(content, opts), opts).await
    }

    async fn complete_with_image(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
        opts: &CompletionOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        let content = vec![
            ClaudeContentBlock::Image {
                source: ClaudeImageSource {
                    source_type: "base64".to_string(),
                    media_type: mime_type.to_string(),
                    data: base64::engine::general_purpose::STANDARD.encode(image),
                },
            },
            ClaudeContentBlock::Text {
                text: prompt.to_string(),
            },
        ];
        self.execute(self.build_request(content, opts), opts).await
    }

    fn name(&self) -> &str {
        "claude"
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

// Claude API types

#[derive(Debug, Clone, Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ClaudeThinking>,
}

#[derive(Debug, Clone, Serialize)]
struct ClaudeMessage {
    role: String,
    content: Vec<ClaudeContentBlock>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ClaudeContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image { source: ClaudeImageSource },
}

#[derive(Debug, Clone, Serialize)]
struct ClaudeImageSource {
    #[serde(rename = "type")]
    source_type: String,
    media_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize)]
struct ClaudeThinking {
    #[serde(rename = "type")]
    thinking_type: String,
    budget_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeResponseBlock>,
    usage: ClaudeUsage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ClaudeResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "thinking")]
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
struct ClaudeUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}
