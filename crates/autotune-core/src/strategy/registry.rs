//! Language -> adapter lookup, built once at startup and passed around.

use std::collections::HashMap;

use super::adapter::EcosystemAdapter;
use crate::domain::Language;

/// Maps a detected [`Language`] to the [`EcosystemAdapter`] that replans for it.
#[derive(Debug, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<Language, EcosystemAdapter>,
    fallback: EcosystemAdapter,
}

impl AdapterRegistry {
    /// A registry with no ecosystem adapters: every language falls back to
    /// [`EcosystemAdapter::Generic`].
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
            fallback: EcosystemAdapter::Generic,
        }
    }

    /// Every supported ecosystem mapped to its own adapter.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for language in [
            Language::Node,
            Language::Python,
            Language::Go,
            Language::Jvm,
            Language::Ruby,
            Language::Rust,
            Language::Cpp,
        ] {
            registry.register(language, EcosystemAdapter::for_language(language));
        }
        registry
    }

    pub fn register(&mut self, language: Language, adapter: EcosystemAdapter) -> &mut Self {
        self.adapters.insert(language, adapter);
        self
    }

    pub fn adapter_for(&self, language: Language) -> EcosystemAdapter {
        self.adapters
            .get(&language)
            .copied()
            .unwrap_or(self.fallback)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
