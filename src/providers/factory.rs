// Provider factory — builds adapters from config entries.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

use super::claude::ClaudeProvider;
use super::gemini::GeminiProvider;
use super::LlmProvider;
use crate::config::pricing::PricingTable;
use crate::config::provider::ProviderEntry;

/// Create one provider adapter from a config entry.
pub fn create_provider(
    entry: &ProviderEntry,
    pricing: &PricingTable,
) -> Result<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match entry {
        ProviderEntry::Gemini { api_key, model, .. } => {
            let mut p = GeminiProvider::new(api_key.clone(), pricing.clone())?;
            if let Some(model) = model {
                p = p.with_model(model.clone());
            }
            Arc::new(p)
        }
        ProviderEntry::Claude {
            api_key,
            model,
            base_url,
            ..
        } => {
            let mut p = ClaudeProvider::new(api_key.clone(), pricing.clone())?;
            if let Some(model) = model {
                p = p.with_model(model.clone());
            }
            if let Some(base_url) = base_url {
                p = p.with_base_url(base_url.clone());
            }
            Arc::new(p)
        }
    };

    tracing::info!(
        provider = entry.provider_type(),
        name = entry.display_name(),
        "configured provider"
    );
    Ok(provider)
}

/// Create all configured providers, keyed by provider-type tag. A later
/// duplicate entry of the same type replaces the earlier one.
pub fn create_providers(
    entries: &[ProviderEntry],
    pricing: &PricingTable,
) -> Result<HashMap<String, Arc<dyn LlmProvider>>> {
    let mut providers = HashMap::new();
    for entry in entries {
        providers.insert(
            entry.provider_type().to_string(),
            create_provider(entry, pricing)?,
        );
    }
    Ok(providers)
}
