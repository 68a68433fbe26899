// Configuration: settings structs, TOML loader, provider entries, pricing.

pub mod constants;
pub mod loader;
pub mod pricing;
pub mod provider;
pub mod settings;

pub use loader::load_config;
pub use pricing::{ModelPricing, PricingTable};
pub use provider::ProviderEntry;
pub use settings::{CacheConfig, Config, EscalationConfig, ServerConfig, TierEntry};
