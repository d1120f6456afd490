//! Embedding model registry.
//!
//! Maps a model name to the fixed properties an embedder, chunker, and
//! vector store all need to agree on: vector dimensionality, the token
//! budget a single chunk may not exceed, which provider serves the model,
//! and its public per-token price for cost accounting.

use crate::error::{ConfigurationError, GitCtxError};

/// Which HTTP-compatible provider serves a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
}

impl Provider {
    pub fn base_url(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1/embeddings",
        }
    }
}

/// Static properties of one embedding model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelSpec {
    pub name: &'static str,
    pub dimensions: usize,
    pub max_tokens: usize,
    pub provider: Provider,
    /// USD per 1,000,000 input tokens.
    pub unit_price_per_million: f64,
}

impl ModelSpec {
    /// `cost_usd = (tokens / 1_000_000) * unit_price`.
    pub fn estimate_cost(&self, tokens: u64) -> f64 {
        (tokens as f64 / 1_000_000.0) * self.unit_price_per_million
    }
}

const REGISTRY: &[ModelSpec] = &[
    ModelSpec {
        name: "text-embedding-3-large",
        dimensions: 3072,
        max_tokens: 8191,
        provider: Provider::OpenAi,
        unit_price_per_million: 0.13,
    },
    ModelSpec {
        name: "text-embedding-3-small",
        dimensions: 1536,
        max_tokens: 8191,
        provider: Provider::OpenAi,
        unit_price_per_million: 0.02,
    },
];

/// Look up a model by name. Returns a `ConfigurationError` naming the
/// available models when `name` is unknown, matching the remediation style
/// the original implementation uses for a missing/invalid model choice.
pub fn lookup(name: &str) -> Result<ModelSpec, GitCtxError> {
    REGISTRY
        .iter()
        .copied()
        .find(|m| m.name == name)
        .ok_or_else(|| {
            let available: Vec<&str> = REGISTRY.iter().map(|m| m.name).collect();
            GitCtxError::Configuration(ConfigurationError::UnknownModel {
                name: name.to_string(),
                available: available.join(", "),
            })
        })
}

/// Default embedding model used when no config overrides it.
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_model() {
        let spec = lookup("text-embedding-3-small").unwrap();
        assert_eq!(spec.dimensions, 1536);
        assert_eq!(spec.max_tokens, 8191);
    }

    #[test]
    fn lookup_unknown_model_lists_available() {
        let err = lookup("not-a-model").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("text-embedding-3-small"));
    }

    #[test]
    fn cost_is_linear() {
        let spec = lookup("text-embedding-3-small").unwrap();
        let a = spec.estimate_cost(1000);
        let b = spec.estimate_cost(2000);
        let combined = spec.estimate_cost(3000);
        assert!((a + b - combined).abs() < 1e-9);
    }
}
