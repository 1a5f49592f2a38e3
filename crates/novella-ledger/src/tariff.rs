//! Fixed-plus-variable pricing of a generation request.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Credits charged per request.
///
/// `required = base(model) + ceil(linked_chars / chars_per_unit) * unit_cost`.
/// The base cost comes from the longest matching model-id prefix in
/// `model_base_costs`, else `base_cost`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tariff {
    pub base_cost: u64,
    pub model_base_costs: BTreeMap<String, u64>,
    pub chars_per_unit: u64,
    pub unit_cost: u64,
}

impl Default for Tariff {
    fn default() -> Self {
        let model_base_costs = [
            ("gemini-2.5-pro", 20),
            ("gemini-3", 20),
            ("claude-opus", 40),
            ("claude-sonnet", 20),
            ("deepseek-reasoner", 8),
            ("gpt-5", 20),
            ("o3", 30),
        ]
        .into_iter()
        .map(|(prefix, cost)| (prefix.to_string(), cost))
        .collect();

        Self {
            base_cost: 10,
            model_base_costs,
            chars_per_unit: 2_000,
            unit_cost: 1,
        }
    }
}

impl Tariff {
    /// Fixed component for `model`.
    pub fn base_cost_for(&self, model: &str) -> u64 {
        let model = model.trim().to_ascii_lowercase();
        let model = model.strip_prefix("models/").unwrap_or(&model);
        self.model_base_costs
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix.to_ascii_lowercase().as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, cost)| *cost)
            .unwrap_or(self.base_cost)
    }

    /// Variable component for attached prior-chapter text.
    pub fn extra_cost(&self, linked_chars: u64) -> u64 {
        if linked_chars == 0 || self.unit_cost == 0 {
            return 0;
        }
        let units = linked_chars.div_ceil(self.chars_per_unit.max(1));
        units.saturating_mul(self.unit_cost)
    }

    pub fn required_amount(&self, model: &str, linked_chars: u64) -> u64 {
        self.base_cost_for(model)
            .saturating_add(self.extra_cost(linked_chars))
    }
}
