// Configuration loader
// Loads from ~/.sommelier/config.toml, falling back to environment variables.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::pricing::{ModelPricing, PricingTable};
use super::provider::ProviderEntry;
use super::settings::{
    data_dir, CacheConfig, Config, EscalationConfig, ServerConfig, TierEntry,
};

/// Load configuration from the config file or environment.
pub fn load_config() -> Result<Config> {
    let config_path = data_dir().join("config.toml");
    if let Some(config) = try_load_from_file(&config_path)? {
        return Ok(config);
    }

    // Fall back to environment variables
    let mut providers = Vec::new();
    if let Ok(api_key) = std::env::var("GEMINI_API_KEY") {
        if !api_key.is_empty() {
            providers.push(ProviderEntry::Gemini {
                api_key,
                model: None,
                name: Some("Gemini (Environment)".to_string()),
            });
        }
    }
    if let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") {
        if !api_key.is_empty() {
            providers.push(ProviderEntry::Claude {
                api_key,
                model: None,
                base_url: None,
                name: Some("Claude (Environment)".to_string()),
            });
        }
    }
    if !providers.is_empty() {
        let config = Config::with_providers(providers);
        config.validate().context("Configuration validation failed")?;
        return Ok(config);
    }

    bail!(
        "No configuration found. Create {} with at least one provider:\n\n\
        [[providers]]\n\
        type = \"gemini\"\n\
        api_key = \"AIza...\"\n\n\
        Alternatively, set GEMINI_API_KEY and/or ANTHROPIC_API_KEY.",
        config_path.display()
    );
}

/// Parse a config file if it exists. Exposed for tests.
pub fn try_load_from_file(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    #[derive(serde::Deserialize)]
    struct TomlConfig {
        #[serde(default)]
        providers: Vec<ProviderEntry>,
        #[serde(default)]
        tiers: Vec<TierEntry>,
        #[serde(default)]
        escalation: Option<EscalationConfig>,
        #[serde(default)]
        cache: Option<CacheConfig>,
        #[serde(default)]
        usage_dir: Option<std::path::PathBuf>,
        #[serde(default)]
        server: Option<ServerConfig>,
        #[serde(default)]
        pricing: HashMap<String, ModelPricing>,
    }

    let toml_config: TomlConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    if toml_config.providers.is_empty() {
        bail!(
            "Config {} has no [[providers]] entries; at least one is required.",
            path.display()
        );
    }

    let mut config = Config::with_providers(toml_config.providers);

    // Apply overrides on top of the derived defaults
    if !toml_config.tiers.is_empty() {
        config.tiers = toml_config.tiers;
    }
    if let Some(escalation) = toml_config.escalation {
        config.escalation = escalation;
    }
    if let Some(cache) = toml_config.cache {
        config.cache = cache;
    }
    if let Some(usage_dir) = toml_config.usage_dir {
        config.usage_dir = usage_dir;
    }
    if let Some(server) = toml_config.server {
        config.server = server;
    }
    if !toml_config.pricing.is_empty() {
        config.pricing = PricingTable::builtin().with_overrides(toml_config.pricing);
    }

    config.validate().context("Configuration validation failed")?;

    Ok(Some(config))
}
