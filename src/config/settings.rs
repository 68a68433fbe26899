// Configuration structs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::constants;
use super::pricing::PricingTable;
use super::provider::ProviderEntry;
use crate::identify::Tier;

/// Escalation thresholds, loaded once and passed into the controller at
/// construction. Uniform across automatic tiers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EscalationConfig {
    #[serde(default = "default_auto_populate")]
    pub auto_populate_threshold: u8,
    #[serde(default = "default_suggest")]
    pub suggest_threshold: u8,
}

fn default_auto_populate() -> u8 {
    constants::DEFAULT_AUTO_POPULATE_THRESHOLD
}

fn default_suggest() -> u8 {
    constants::DEFAULT_SUGGEST_THRESHOLD
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            auto_populate_threshold: constants::DEFAULT_AUTO_POPULATE_THRESHOLD,
            suggest_threshold: constants::DEFAULT_SUGGEST_THRESHOLD,
        }
    }
}

/// One rung of the ladder: which provider/model answers this tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierEntry {
    pub tier: Tier,
    /// Provider-type tag ("gemini", "claude") referencing a `[[providers]]`
    /// entry.
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_tier_timeout")]
    pub timeout_secs: u64,
    /// Request an extended-thinking pass (the tier1_5 "higher thinking" rung).
    #[serde(default)]
    pub thinking: bool,
}

fn default_tier_timeout() -> u64 {
    constants::DEFAULT_TEXT_TIMEOUT_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub dir: PathBuf,
    #[serde(default = "default_ttl_days")]
    pub ttl_days: i64,
}

fn default_ttl_days() -> i64 {
    constants::DEFAULT_CACHE_TTL_DAYS
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: data_dir().join("cache"),
            ttl_days: constants::DEFAULT_CACHE_TTL_DAYS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g. "127.0.0.1:8310")
    pub bind_address: String,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: constants::DEFAULT_HTTP_ADDR.to_string(),
            max_body_bytes: constants::DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Full application configuration, immutable after load.
#[derive(Debug, Clone)]
pub struct Config {
    pub providers: Vec<ProviderEntry>,
    /// Ladder rungs in ascending tier order.
    pub tiers: Vec<TierEntry>,
    pub escalation: EscalationConfig,
    pub cache: CacheConfig,
    /// Directory for usage/outcome JSONL records.
    pub usage_dir: PathBuf,
    pub server: ServerConfig,
    pub pricing: PricingTable,
}

/// Base data directory (`~/.sommelier`); falls back to the current directory
/// when the home directory cannot be determined.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(constants::CONFIG_DIR))
        .unwrap_or_else(|| PathBuf::from(constants::CONFIG_DIR))
}

impl Config {
    /// Build a config from provider entries with a default tier ladder:
    /// cheap Gemini pass, Gemini thinking pass, Claude pass, and a
    /// user-triggered Claude Opus pass when Claude is configured.
    pub fn with_providers(providers: Vec<ProviderEntry>) -> Self {
        let has_gemini = providers.iter().any(|p| p.provider_type() == "gemini");
        let has_claude = providers.iter().any(|p| p.provider_type() == "claude");

        // Whichever vendor exists backs the rungs the other would have taken.
        let cheap = if has_gemini { "gemini" } else { "claude" };
        let strong = if has_claude { "claude" } else { "gemini" };

        let tiers = vec![
            TierEntry {
                tier: Tier::Tier1,
                provider: cheap.to_string(),
                model: None,
                timeout_secs: constants::DEFAULT_TEXT_TIMEOUT_SECS,
                thinking: false,
            },
            TierEntry {
                tier: Tier::Tier1_5,
                provider: cheap.to_string(),
                model: None,
                timeout_secs: constants::DEFAULT_THINKING_TIMEOUT_SECS,
                thinking: true,
            },
            TierEntry {
                tier: Tier::Tier2,
                provider: strong.to_string(),
                model: None,
                timeout_secs: constants::DEFAULT_THINKING_TIMEOUT_SECS,
                thinking: false,
            },
            TierEntry {
                tier: Tier::Tier3,
                provider: strong.to_string(),
                model: if has_claude {
                    Some("claude-opus-4-20250514".to_string())
                } else {
                    Some("gemini-2.5-pro".to_string())
                },
                timeout_secs: constants::DEFAULT_TIER3_TIMEOUT_SECS,
                thinking: true,
            },
        ];

        Self {
            providers,
            tiers,
            escalation: EscalationConfig::default(),
            cache: CacheConfig::default(),
            usage_dir: data_dir().join("usage"),
            server: ServerConfig::default(),
            pricing: PricingTable::builtin(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.providers.is_empty() {
            anyhow::bail!("no providers configured");
        }
        if !self.tiers.iter().any(|t| t.tier == Tier::Tier1) {
            anyhow::bail!("tier ladder must include tier1");
        }
        let mut last: Option<Tier> = None;
        for entry in &self.tiers {
            if let Some(prev) = last {
                if entry.tier <= prev {
                    anyhow::bail!(
                        "tier ladder must be in strictly ascending order ({} after {})",
                        entry.tier,
                        prev
                    );
                }
            }
            last = Some(entry.tier);

            if !self
                .providers
                .iter()
                .any(|p| p.provider_type() == entry.provider)
            {
                anyhow::bail!(
                    "tier {} references unconfigured provider '{}'",
                    entry.tier,
                    entry.provider
                );
            }
            if entry.timeout_secs == 0 {
                anyhow::bail!("tier {} has a zero timeout", entry.tier);
            }
        }

        let esc = &self.escalation;
        if esc.suggest_threshold > esc.auto_populate_threshold {
            anyhow::bail!(
                "suggest threshold ({}) must not exceed auto-populate threshold ({})",
                esc.suggest_threshold,
                esc.auto_populate_threshold
            );
        }
        if esc.auto_populate_threshold > 100 {
            anyhow::bail!("auto-populate threshold must be within 0-100");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gemini_entry() -> ProviderEntry {
        ProviderEntry::Gemini {
            api_key: "AIza-test".to_string(),
            model: None,
            name: None,
        }
    }

    fn claude_entry() -> ProviderEntry {
        ProviderEntry::Claude {
            api_key: "sk-ant-test".to_string(),
            model: None,
            base_url: None,
            name: None,
        }
    }

    #[test]
    fn test_default_ladder_both_vendors() {
        let config = Config::with_providers(vec![gemini_entry(), claude_entry()]);
        assert_eq!(config.tiers.len(), 4);
        assert_eq!(config.tiers[0].provider, "gemini");
        assert_eq!(config.tiers[2].provider, "claude");
        assert!(config.tiers[1].thinking);
        config.validate().unwrap();
    }

    #[test]
    fn test_single_vendor_fills_all_rungs() {
        let config = Config::with_providers(vec![claude_entry()]);
        assert!(config.tiers.iter().all(|t| t.provider == "claude"));
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_unknown_provider() {
        let mut config = Config::with_providers(vec![gemini_entry()]);
        config.tiers[2].provider = "claude".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unordered_ladder() {
        let mut config = Config::with_providers(vec![gemini_entry()]);
        config.tiers.swap(0, 2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut config = Config::with_providers(vec![gemini_entry()]);
        config.escalation.suggest_threshold = 90;
        config.escalation.auto_populate_threshold = 80;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_thresholds() {
        let esc = EscalationConfig::default();
        assert_eq!(esc.auto_populate_threshold, 85);
        assert_eq!(esc.suggest_threshold, 70);
    }
}
