// Multi-provider LLM support
//
// This module provides an abstraction layer over the LLM vendors used by the
// identification ladder (Gemini, Claude). Each tier binds to one provider and
// model; the escalation controller only ever talks to the trait, never to a
// concrete vendor.

use async_trait::async_trait;
use std::time::{Duration, Instant};

pub mod types;

// Provider implementations
pub mod claude;
pub mod gemini;

// Provider factory
pub mod factory;

// Re-export commonly used types
pub use claude::ClaudeProvider;
pub use factory::{create_provider, create_providers};
pub use gemini::GeminiProvider;
pub use types::{
    classify_status, Capability, CompletionOptions, CompletionResponse, ErrorKind, ProviderError,
};

/// Trait for LLM providers
///
/// All vendor adapters implement this trait, providing a uniform contract for
/// text and image completions with typed failures.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a text prompt and get the full completion.
    async fn complete(
        &self,
        prompt: &str,
        opts: &CompletionOptions,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Send a prompt plus an image (label photograph) and get the completion.
    async fn complete_with_image(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
        opts: &CompletionOptions,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Get the provider name (e.g. "gemini", "claude").
    fn name(&self) -> &str;

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;

    /// Capability check; the controller gates tier selection on this instead
    /// of branching on vendor identity.
    fn supports(&self, capability: Capability) -> bool;
}

/// Drive a vendor HTTP request under a liveness-polling loop.
///
/// The in-flight send is raced against one-second ticks; each tick checks the
/// cancellation token (client disconnect) and the per-call deadline. This is
/// what lets a long vendor call abort within roughly a second of the caller
/// going away instead of blocking until the transport gives up.
pub(crate) async fn drive_request<F>(
    fut: F,
    opts: &CompletionOptions,
) -> Result<reqwest::Response, ProviderError>
where
    F: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let deadline = Instant::now() + opts.timeout;
    tokio::pin!(fut);

    loop {
        tokio::select! {
            res = &mut fut => {
                return res.map_err(|e| ProviderError::from_transport(&e));
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                if opts.cancel.is_cancelled() {
                    return Err(ProviderError::new(
                        ErrorKind::NetworkError,
                        "client disconnected, aborting vendor call",
                    ));
                }
                if Instant::now() >= deadline {
                    return Err(ProviderError::new(
                        ErrorKind::Timeout,
                        format!("no response within {:?}", opts.timeout),
                    ));
                }
            }
        }
    }
}

/// Log one provider call, success or failure. Called by every adapter on
/// every attempt so usage analytics and server logs always line up.
pub(crate) fn log_call(
    provider: &str,
    model: &str,
    result: &Result<CompletionResponse, ProviderError>,
    latency_ms: u64,
) {
    match result {
        Ok(resp) => {
            tracing::info!(
                provider,
                model,
                input_tokens = resp.input_tokens,
                output_tokens = resp.output_tokens,
                cost_usd = resp.cost_usd,
                latency_ms,
                "provider call completed"
            );
        }
        Err(err) => {
            tracing::warn!(
                provider,
                model,
                error_kind = err.kind.as_str(),
                latency_ms,
                "provider call failed: {}",
                err.message
            );
        }
    }
}
