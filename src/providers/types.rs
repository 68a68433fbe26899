// Unified request/response types and error taxonomy for LLM provider adapters
//
// Every vendor adapter (Gemini, Claude) converts to and from these types so
// the escalation controller never sees vendor-specific shapes.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Typed failure classification for a provider call.
///
/// Retryability is derived solely from the kind: auth and request-shape
/// errors are never retried because retrying cannot help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NetworkError,
    RateLimit,
    Overloaded,
    ServerError,
    Timeout,
    AuthError,
    InvalidRequest,
    InvalidResponse,
    UnknownError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NetworkError => "network_error",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Overloaded => "overloaded",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::AuthError => "auth_error",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::UnknownError => "unknown_error",
        }
    }

    /// Whether a call failing with this kind may be worth re-issuing.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkError
                | ErrorKind::RateLimit
                | ErrorKind::Overloaded
                | ErrorKind::ServerError
                | ErrorKind::Timeout
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed provider failure: a classification plus a human-readable message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classify a non-success HTTP status plus (truncated) response body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = classify_status(status);
        let mut message = format!("HTTP {}", status);
        if !body.is_empty() {
            let snippet: String = body.chars().take(300).collect();
            message.push_str(": ");
            message.push_str(&snippet);
        }
        Self { kind, message }
    }

    /// Classify a transport-level failure from reqwest.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        let text = err.to_string();
        let kind = if err.is_timeout() || text.to_lowercase().contains("timeout") {
            ErrorKind::Timeout
        } else {
            ErrorKind::NetworkError
        };
        Self {
            kind,
            message: text,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Map an HTTP status code to an error kind.
///
/// 529 is the vendor-specific "overloaded" status (Anthropic) and is
/// classified ahead of the generic 5xx bucket.
pub fn classify_status(status: u16) -> ErrorKind {
    match status {
        400 | 404 | 413 | 422 => ErrorKind::InvalidRequest,
        401 | 403 => ErrorKind::AuthError,
        408 => ErrorKind::Timeout,
        429 => ErrorKind::RateLimit,
        529 => ErrorKind::Overloaded,
        500..=599 => ErrorKind::ServerError,
        _ => ErrorKind::UnknownError,
    }
}

/// Capabilities the controller may require from a tier's provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Accepts image input (label photographs).
    Vision,
    /// Supports an extended-thinking / reasoning budget.
    ExtendedThinking,
}

/// Per-call options passed into an adapter.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    /// Model name; empty string means the adapter's default model.
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    /// Hard deadline for the whole vendor call.
    pub timeout: Duration,
    /// Request an extended-thinking pass where the provider supports it.
    pub thinking: bool,
    /// Cancelled when the calling HTTP client disconnects; the adapter's
    /// liveness loop observes it within about one second.
    pub cancel: CancellationToken,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_tokens: 1024,
            temperature: None,
            timeout: Duration::from_secs(30),
            thinking: false,
            cancel: CancellationToken::new(),
        }
    }
}

impl CompletionOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_thinking(mut self, thinking: bool) -> Self {
        self.thinking = thinking;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A successful completion, normalized across vendors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Concatenated text content from all text parts of the response.
    pub content: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Computed from the per-model pricing table at call time.
    pub cost_usd: f64,
    pub latency_ms: u64,
}
