//! Model registry: known chat models with pricing and limits.

use crate::{CostInfo, Model};

/// Default endpoint for chat completions
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

struct ModelEntry {
    id: &'static str,
    name: &'static str,
    cost_input: f64,
    cost_output: f64,
    cost_cache_read: f64,
    context_window: u32,
    max_tokens: u32,
}

const MODEL_ENTRIES: &[ModelEntry] = &[
    ModelEntry {
        id: "gpt-4o-mini",
        name: "GPT-4o mini",
        cost_input: 0.15,
        cost_output: 0.6,
        cost_cache_read: 0.075,
        context_window: 128_000,
        max_tokens: 16_384,
    },
    ModelEntry {
        id: "gpt-4o",
        name: "GPT-4o",
        cost_input: 2.5,
        cost_output: 10.0,
        cost_cache_read: 1.25,
        context_window: 128_000,
        max_tokens: 16_384,
    },
    ModelEntry {
        id: "gpt-4.1-mini",
        name: "GPT-4.1 mini",
        cost_input: 0.4,
        cost_output: 1.6,
        cost_cache_read: 0.1,
        context_window: 1_047_576,
        max_tokens: 32_768,
    },
    ModelEntry {
        id: "gpt-4.1",
        name: "GPT-4.1",
        cost_input: 2.0,
        cost_output: 8.0,
        cost_cache_read: 0.5,
        context_window: 1_047_576,
        max_tokens: 32_768,
    },
];

impl ModelEntry {
    fn to_model(&self, base_url: &str) -> Model {
        Model {
            id: self.id.to_string(),
            name: self.name.to_string(),
            base_url: base_url.to_string(),
            cost: CostInfo {
                input: self.cost_input,
                output: self.cost_output,
                cache_read: self.cost_cache_read,
            },
            context_window: self.context_window,
            max_tokens: self.max_tokens,
            headers: Default::default(),
        }
    }
}

/// Look up a known model by ID.
pub fn get_model_by_id(id: &str) -> Option<Model> {
    MODEL_ENTRIES
        .iter()
        .find(|e| e.id == id)
        .map(|e| e.to_model(DEFAULT_BASE_URL))
}

/// Resolve a model ID against an endpoint, constructing a generic definition
/// for IDs the registry does not know (local or proxied models).
pub fn resolve_model(id: &str, base_url: &str) -> Model {
    if let Some(entry) = MODEL_ENTRIES.iter().find(|e| e.id == id) {
        return entry.to_model(base_url);
    }

    Model {
        id: id.to_string(),
        name: id.to_string(),
        base_url: base_url.to_string(),
        cost: CostInfo::default(),
        context_window: 128_000,
        max_tokens: 8192,
        headers: Default::default(),
    }
}

/// Get all registered models.
pub fn get_all_models() -> Vec<Model> {
    MODEL_ENTRIES
        .iter()
        .map(|e| e.to_model(DEFAULT_BASE_URL))
        .collect()
}
