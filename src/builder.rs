//! Builder for configuring model registries

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::cache::{
    CacheConfig, CacheLayer, CacheStore, DirectoryStore, MemoryStore, ReplayPacing,
};
use crate::config::{CacheBackendKind, Config, Secrets};
use crate::providers::openai::FIREWORKS_BASE_URL;
use crate::providers::{
    CachedBackend, DEFAULT_ALIASES, DEFAULT_MODEL_ALIAS, DEFAULT_REASONING_TAG, ModelBackend,
    ModelRegistry, OpenAiBackend, OpenAiConfig, REASONING_ALIAS, REASONING_MODEL,
    ReasoningBackend,
};
use crate::{MimirError, Result};

/// Main entry point for creating model registries.
pub struct Mimir;

impl Mimir {
    /// Create a new builder for configuring a registry.
    pub fn builder() -> MimirBuilder {
        MimirBuilder::new()
    }
}

enum CacheChoice {
    Memory(CacheConfig),
    Directory(PathBuf),
    Store(Arc<dyn CacheStore>),
    Disabled,
}

/// Builder for configuring model registries.
///
/// Every backend is wrapped in a [`CachedBackend`] sharing one
/// [`CacheLayer`] unless caching is disabled with [`no_cache`](Self::no_cache).
/// The cache defaults to an in-memory store.
pub struct MimirBuilder {
    openai_key: Option<String>,
    openai_base_url: Option<String>,
    fireworks_key: Option<String>,
    fireworks_base_url: Option<String>,
    fireworks_timeout_secs: Option<u64>,
    timeout_secs: Option<u64>,
    cache: CacheChoice,
    pacing: ReplayPacing,
    aliases: BTreeMap<String, String>,
    default_alias: Option<String>,
    backends: Vec<(String, Arc<dyn ModelBackend>)>,
}

impl Default for MimirBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MimirBuilder {
    pub fn new() -> Self {
        Self {
            openai_key: None,
            openai_base_url: None,
            fireworks_key: None,
            fireworks_base_url: None,
            fireworks_timeout_secs: None,
            timeout_secs: None,
            cache: CacheChoice::Memory(CacheConfig::default()),
            pacing: ReplayPacing::default(),
            aliases: DEFAULT_ALIASES
                .iter()
                .map(|(alias, model)| ((*alias).to_owned(), (*model).to_owned()))
                .collect(),
            default_alias: None,
            backends: Vec::new(),
        }
    }

    /// Build a builder from loaded configuration and secrets.
    pub fn from_config(config: &Config, secrets: &Secrets) -> Self {
        let mut builder = Self::new().replay_pacing(config.replay.pacing());

        if let Some(key) = secrets.api_key("openai") {
            builder = builder.openai(key);
        }
        if let Some(openai) = &config.providers.openai {
            if let Some(url) = &openai.base_url {
                builder = builder.openai_base_url(url.clone());
            }
            if let Some(secs) = openai.timeout_secs {
                builder = builder.timeout(secs);
            }
        }
        if let Some(key) = secrets.api_key("fireworks") {
            builder = builder.fireworks(key);
        }
        if let Some(fireworks) = &config.providers.fireworks {
            if let Some(url) = &fireworks.base_url {
                builder = builder.fireworks_base_url(url.clone());
            }
            if let Some(secs) = fireworks.timeout_secs {
                builder = builder.fireworks_timeout(secs);
            }
        }

        builder = match config.cache.backend {
            CacheBackendKind::Memory => builder.memory_cache(config.cache.memory_config()),
            CacheBackendKind::Directory => builder.cache_dir(
                config
                    .cache
                    .dir
                    .clone()
                    .unwrap_or_else(DirectoryStore::default_dir),
            ),
            CacheBackendKind::None => builder.no_cache(),
        };

        for (alias, model) in &config.models.aliases {
            builder = builder.model_alias(alias.clone(), model.clone());
        }
        if let Some(default) = &config.models.default {
            builder = builder.default_model(default.clone());
        }
        builder
    }

    /// Configure an OpenAI-compatible provider for every alias.
    pub fn openai(mut self, api_key: impl Into<String>) -> Self {
        self.openai_key = Some(api_key.into());
        self
    }

    /// Use another OpenAI-compatible endpoint.
    pub fn openai_base_url(mut self, url: impl Into<String>) -> Self {
        self.openai_base_url = Some(url.into());
        self
    }

    /// Register the reasoning model under
    /// [`REASONING_ALIAS`](crate::providers::REASONING_ALIAS), with its
    /// `<think>` sections split into reasoning.
    pub fn fireworks(mut self, api_key: impl Into<String>) -> Self {
        self.fireworks_key = Some(api_key.into());
        self
    }

    /// Use another endpoint for the reasoning model.
    pub fn fireworks_base_url(mut self, url: impl Into<String>) -> Self {
        self.fireworks_base_url = Some(url.into());
        self
    }

    /// Timeout for the reasoning model (seconds). Falls back to
    /// [`timeout`](Self::timeout).
    pub fn fireworks_timeout(mut self, secs: u64) -> Self {
        self.fireworks_timeout_secs = Some(secs);
        self
    }

    /// Set default timeout for all requests (seconds).
    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Cache through a caller-supplied store.
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = CacheChoice::Store(store);
        self
    }

    /// Cache in memory with the given bounds (the default).
    pub fn memory_cache(mut self, config: CacheConfig) -> Self {
        self.cache = CacheChoice::Memory(config);
        self
    }

    /// Cache on disk under `dir`.
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache = CacheChoice::Directory(dir.into());
        self
    }

    /// Register backends unwrapped.
    pub fn no_cache(mut self) -> Self {
        self.cache = CacheChoice::Disabled;
        self
    }

    /// Pacing for replayed streams.
    pub fn replay_pacing(mut self, pacing: ReplayPacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Map an alias to an upstream model id on the OpenAI provider.
    pub fn model_alias(mut self, alias: impl Into<String>, model: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), model.into());
        self
    }

    /// Alias returned by [`ModelRegistry::default_model`].
    pub fn default_model(mut self, alias: impl Into<String>) -> Self {
        self.default_alias = Some(alias.into());
        self
    }

    /// Register a custom backend under an alias. Takes precedence over the
    /// provider alias table.
    pub fn backend(mut self, alias: impl Into<String>, backend: Arc<dyn ModelBackend>) -> Self {
        self.backends.push((alias.into(), backend));
        self
    }

    /// Build the registry.
    ///
    /// Fails with [`MimirError::NoProvider`] when nothing was configured and
    /// with [`MimirError::Configuration`] when the default alias is missing.
    pub fn build(self) -> Result<ModelRegistry> {
        let store: Option<Arc<dyn CacheStore>> = match self.cache {
            CacheChoice::Memory(config) => Some(Arc::new(MemoryStore::new(&config))),
            CacheChoice::Directory(dir) => Some(Arc::new(DirectoryStore::new(dir))),
            CacheChoice::Store(store) => Some(store),
            CacheChoice::Disabled => None,
        };
        let layer = store.map(|store| CacheLayer::new(store).with_pacing(self.pacing));
        let wrap = |backend: Arc<dyn ModelBackend>| -> Arc<dyn ModelBackend> {
            match &layer {
                Some(layer) => Arc::new(CachedBackend::new(backend, layer.clone())),
                None => backend,
            }
        };

        let mut registry = ModelRegistry::new();

        if let Some(key) = self.openai_key {
            let mut config = OpenAiConfig::new(key);
            if let Some(url) = self.openai_base_url {
                config = config.base_url(url);
            }
            if let Some(secs) = self.timeout_secs {
                config = config.timeout_secs(secs);
            }
            let http = config.http_client()?;
            for (alias, model) in &self.aliases {
                let backend = OpenAiBackend::with_client(http.clone(), &config, model.clone());
                registry.register(alias.clone(), wrap(Arc::new(backend)));
            }
        }

        if let Some(key) = self.fireworks_key {
            let mut config = OpenAiConfig::new(key)
                .provider("fireworks")
                .base_url(
                    self.fireworks_base_url
                        .unwrap_or_else(|| FIREWORKS_BASE_URL.to_owned()),
                );
            if let Some(secs) = self.fireworks_timeout_secs.or(self.timeout_secs) {
                config = config.timeout_secs(secs);
            }
            let model = OpenAiBackend::new(&config, REASONING_MODEL)?;
            let backend = ReasoningBackend::new(Arc::new(model), DEFAULT_REASONING_TAG);
            registry.register(REASONING_ALIAS, wrap(Arc::new(backend)));
        }

        for (alias, backend) in self.backends {
            registry.register(alias, wrap(backend));
        }

        if registry.is_empty() {
            return Err(MimirError::NoProvider);
        }

        let default = self
            .default_alias
            .unwrap_or_else(|| DEFAULT_MODEL_ALIAS.to_owned());
        registry.set_default(default)?;

        debug!(
            aliases = ?registry.aliases(),
            default = registry.default_alias(),
            cached = layer.is_some(),
            "model registry built"
        );
        Ok(registry)
    }
}
