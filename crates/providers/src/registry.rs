//! Provider registry.
//!
//! Constructs and holds all configured LLM provider instances. At startup the
//! registry reads the [`LlmConfig`], resolves authentication (env vars, direct
//! keys, keychain), and instantiates the adapter matching each provider kind.

use crate::anthropic::AnthropicProvider;
use crate::lmstudio::LmStudioProvider;
use crate::traits::LlmProvider;
use ed_domain::config::{LlmConfig, ProviderConfig, ProviderKind};
use ed_domain::error::Result;
use std::collections::HashMap;
use std::sync::Arc;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Holds all instantiated LLM providers, keyed by config id.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from the application's [`LlmConfig`].
    ///
    /// Providers that fail to initialize (typically a missing API key) are
    /// logged and skipped rather than aborting startup.
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut registry = Self::new();

        for pc in &config.providers {
            match build_provider(pc) {
                Ok(provider) => {
                    tracing::info!(
                        provider_id = %pc.id,
                        kind = ?pc.kind,
                        "registered LLM provider"
                    );
                    registry.insert(provider);
                }
                Err(e) => {
                    tracing::warn!(
                        provider_id = %pc.id,
                        kind = ?pc.kind,
                        error = %e,
                        "failed to initialize LLM provider, skipping"
                    );
                }
            }
        }

        if registry.is_empty() && !config.providers.is_empty() {
            tracing::warn!("no LLM providers initialized; requests will fail until auth is configured");
        }

        registry
    }

    /// Register a provider under its own id, replacing any previous one.
    pub fn insert(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers
            .insert(provider.provider_id().to_string(), provider);
    }

    /// Look up a provider by its config id.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    pub fn contains(&self, provider_id: &str) -> bool {
        self.providers.contains_key(provider_id)
    }

    /// Iterate over all registered providers.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn LlmProvider>)> {
        self.providers.iter()
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// List all registered provider IDs (sorted).
    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Lowest provider ID in sort order, if any.
    pub fn first(&self) -> Option<String> {
        self.providers.keys().min().cloned()
    }
}

/// Instantiate the adapter for one provider entry.
pub fn build_provider(pc: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    Ok(match pc.kind {
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::from_config(pc)?),
        ProviderKind::LmStudio => Arc::new(LmStudioProvider::from_config(pc)?),
    })
}
