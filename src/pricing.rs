//! Per-model API prices (USD per million tokens) and cost calculation.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::transcript::TokenCounts;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(default)]
    pub input: f64,
    #[serde(default)]
    pub output: f64,
    #[serde(default)]
    pub cache_read: f64,
    #[serde(default)]
    pub cache_write: f64,
}

impl ModelPricing {
    const fn new(input: f64, output: f64, cache_read: f64, cache_write: f64) -> Self {
        Self {
            input,
            output,
            cache_read,
            cache_write,
        }
    }
}

lazy_static! {
    static ref DEFAULT_PRICING: BTreeMap<&'static str, ModelPricing> = {
        let mut m = BTreeMap::new();
        m.insert("claude-opus-4-5-20251101", ModelPricing::new(5.00, 25.00, 0.50, 6.25));
        m.insert("claude-sonnet-4-20250514", ModelPricing::new(3.00, 15.00, 0.30, 3.75));
        m.insert("claude-3-5-sonnet-20241022", ModelPricing::new(3.00, 15.00, 0.30, 3.75));
        m.insert("claude-3-5-haiku-20241022", ModelPricing::new(0.80, 4.00, 0.08, 1.00));
        m
    };
}

// Family fallbacks for unknown model ids; cache prices follow 0.1x read / 1.25x write.
const OPUS: ModelPricing = ModelPricing::new(15.00, 75.00, 1.50, 18.75);
const SONNET: ModelPricing = ModelPricing::new(3.00, 15.00, 0.30, 3.75);
const HAIKU: ModelPricing = ModelPricing::new(1.00, 5.00, 0.10, 1.25);

pub fn family_pricing(model: &str) -> ModelPricing {
    let lower = model.to_lowercase();
    if lower.contains("opus") {
        OPUS
    } else if lower.contains("haiku") {
        HAIKU
    } else {
        SONNET
    }
}

/// Built-in prices merged with the user's `pricing.json` overrides.
#[derive(Debug, Clone)]
pub struct PricingTable {
    models: BTreeMap<String, ModelPricing>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            models: DEFAULT_PRICING
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }
}

impl PricingTable {
    /// Defaults plus overrides from `path`. A missing or unreadable override
    /// file leaves the defaults in place.
    pub fn load(path: &Path) -> Self {
        let mut table = Self::default();
        let overrides = fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str::<BTreeMap<String, ModelPricing>>(&raw).ok());
        if let Some(overrides) = overrides {
            table.models.extend(overrides);
        }
        table
    }

    /// Exact id, then substring match in either direction, then model family.
    pub fn for_model(&self, model: &str) -> ModelPricing {
        if let Some(p) = self.models.get(model) {
            return *p;
        }
        self.models
            .iter()
            .find(|(key, _)| model.contains(key.as_str()) || key.contains(model))
            .map(|(_, p)| *p)
            .unwrap_or_else(|| family_pricing(model))
    }

    pub fn cost(&self, tokens: &TokenCounts, model: &str) -> f64 {
        let p = self.for_model(model);
        let per_million = |n: u64, price: f64| (n as f64 / 1_000_000.0) * price;
        per_million(tokens.input_tokens, p.input)
            + per_million(tokens.output_tokens, p.output)
            + per_million(tokens.cache_read_tokens, p.cache_read)
            + per_million(tokens.cache_creation_tokens, p.cache_write)
    }
}
