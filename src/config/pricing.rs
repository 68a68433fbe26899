// Per-model pricing table for cost computation
//
// Costs are dollars per million tokens, split by input/output. Unknown models
// fall back to the default tier's pricing so a new model name never produces
// a zero-cost attempt.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Dollars per million input tokens.
    pub input_per_mtok: f64,
    /// Dollars per million output tokens.
    pub output_per_mtok: f64,
}

#[derive(Debug, Clone)]
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
    default: ModelPricing,
}

impl PricingTable {
    /// Built-in table covering the models the default tier ladder uses.
    pub fn builtin() -> Self {
        let mut models = HashMap::new();
        models.insert(
            "gemini-2.0-flash".to_string(),
            ModelPricing {
                input_per_mtok: 0.10,
                output_per_mtok: 0.40,
            },
        );
        models.insert(
            "gemini-2.5-flash".to_string(),
            ModelPricing {
                input_per_mtok: 0.30,
                output_per_mtok: 2.50,
            },
        );
        models.insert(
            "gemini-2.5-pro".to_string(),
            ModelPricing {
                input_per_mtok: 1.25,
                output_per_mtok: 10.00,
            },
        );
        models.insert(
            "claude-3-5-haiku".to_string(),
            ModelPricing {
                input_per_mtok: 0.80,
                output_per_mtok: 4.00,
            },
        );
        models.insert(
            "claude-sonnet-4".to_string(),
            ModelPricing {
                input_per_mtok: 3.00,
                output_per_mtok: 15.00,
            },
        );
        models.insert(
            "claude-opus-4".to_string(),
            ModelPricing {
                input_per_mtok: 15.00,
                output_per_mtok: 75.00,
            },
        );

        Self {
            models,
            // Default tier (tier1) pricing — applied to unknown models.
            default: ModelPricing {
                input_per_mtok: 0.30,
                output_per_mtok: 2.50,
            },
        }
    }

    /// Apply config-file overrides on top of the built-in table.
    pub fn with_overrides(mut self, overrides: HashMap<String, ModelPricing>) -> Self {
        self.models.extend(overrides);
        self
    }

    /// Pricing for a model: exact match first, then longest prefix match
    /// (model names carry date suffixes like "claude-sonnet-4-20250514"),
    /// then the default.
    pub fn pricing_for(&self, model: &str) -> ModelPricing {
        if let Some(p) = self.models.get(model) {
            return *p;
        }
        let mut best: Option<(&str, ModelPricing)> = None;
        for (key, p) in &self.models {
            if model.starts_with(key.as_str()) {
                match best {
                    Some((prev, _)) if prev.len() >= key.len() => {}
                    _ => best = Some((key, *p)),
                }
            }
        }
        best.map(|(_, p)| p).unwrap_or(self.default)
    }

    /// Dollar cost of one call.
    pub fn cost_usd(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        let p = self.pricing_for(model);
        (input_tokens as f64 * p.input_per_mtok + output_tokens as f64 * p.output_per_mtok)
            / 1_000_000.0
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let table = PricingTable::builtin();
        let cost = table.cost_usd("gemini-2.0-flash", 1_000_000, 1_000_000);
        assert!((cost - 0.50).abs() < 1e-9);
    }

    #[test]
    fn test_prefix_match_dated_model() {
        let table = PricingTable::builtin();
        let p = table.pricing_for("claude-sonnet-4-20250514");
        assert_eq!(p.input_per_mtok, 3.00);
    }

    #[test]
    fn test_unknown_model_uses_default() {
        let table = PricingTable::builtin();
        let p = table.pricing_for("some-future-model");
        assert_eq!(p.input_per_mtok, 0.30);
        assert_eq!(p.output_per_mtok, 2.50);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "gemini-2.5-flash-lite".to_string(),
            ModelPricing {
                input_per_mtok: 0.05,
                output_per_mtok: 0.20,
            },
        );
        let table = PricingTable::builtin().with_overrides(overrides);
        let p = table.pricing_for("gemini-2.5-flash-lite-001");
        assert_eq!(p.input_per_mtok, 0.05);
    }

    #[test]
    fn test_override_replaces_builtin() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "claude-opus-4".to_string(),
            ModelPricing {
                input_per_mtok: 10.0,
                output_per_mtok: 50.0,
            },
        );
        let table = PricingTable::builtin().with_overrides(overrides);
        assert_eq!(table.pricing_for("claude-opus-4").input_per_mtok, 10.0);
    }

    #[test]
    fn test_zero_tokens_zero_cost() {
        let table = PricingTable::builtin();
        assert_eq!(table.cost_usd("claude-opus-4", 0, 0), 0.0);
    }
}
