// Provider entries — one per configured LLM vendor credential.

use serde::{Deserialize, Serialize};

/// A single provider entry in the config file.
///
/// Serializes with a `type` tag, e.g.:
/// ```toml
/// [[providers]]
/// type = "gemini"
/// api_key = "AIza..."
///
/// [[providers]]
/// type = "claude"
/// api_key = "sk-ant-..."
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderEntry {
    Gemini {
        api_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Claude {
        api_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl ProviderEntry {
    /// Human-readable name for logs.
    pub fn display_name(&self) -> &str {
        match self {
            Self::Gemini { name, .. } => name.as_deref().unwrap_or("Gemini"),
            Self::Claude { name, .. } => name.as_deref().unwrap_or("Claude"),
        }
    }

    /// Short provider-type tag (e.g. "gemini", "claude") — the key tiers use
    /// to reference a provider.
    pub fn provider_type(&self) -> &'static str {
        match self {
            Self::Gemini { .. } => "gemini",
            Self::Claude { .. } => "claude",
        }
    }

    pub fn api_key(&self) -> &str {
        match self {
            Self::Gemini { api_key, .. } => api_key,
            Self::Claude { api_key, .. } => api_key,
        }
    }

    /// Optional default-model override.
    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Gemini { model, .. } => model.as_deref(),
            Self::Claude { model, .. } => model.as_deref(),
        }
    }
}
