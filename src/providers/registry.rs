//! Alias registry for language models.
//!
//! Application code asks for a model by role (`"chat-model-large"`,
//! `"title-model"`) rather than by upstream id. The registry maps each alias
//! to a backend, usually a [`CachedBackend`](super::CachedBackend), and is
//! built explicitly by [`MimirBuilder`](crate::MimirBuilder) and passed
//! around like any other value.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::traits::ModelBackend;
use crate::{MimirError, Result};

/// Default alias table: `(alias, upstream model id)`.
pub const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("chat-model-small", "gpt-4o-mini"),
    ("chat-model-large", "gpt-4o"),
    ("title-model", "gpt-4o"),
    ("block-model", "gpt-4o-mini"),
];

/// Alias used when a caller does not name one.
pub const DEFAULT_MODEL_ALIAS: &str = "chat-model-large";

/// Alias of the reasoning model, registered when a Fireworks key is set.
/// Its `<think>` sections are split out by a
/// [`ReasoningBackend`](super::ReasoningBackend).
pub const REASONING_ALIAS: &str = "chat-model-reasoning";

/// Upstream id behind [`REASONING_ALIAS`].
pub const REASONING_MODEL: &str = "accounts/fireworks/models/deepseek-r1";

/// Maps application-level aliases to backends.
pub struct ModelRegistry {
    models: BTreeMap<String, Arc<dyn ModelBackend>>,
    default_alias: String,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self {
            models: BTreeMap::new(),
            default_alias: DEFAULT_MODEL_ALIAS.to_owned(),
        }
    }
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let models: BTreeMap<_, _> = self
            .models
            .iter()
            .map(|(alias, backend)| (alias.as_str(), backend.qualified_id()))
            .collect();
        f.debug_struct("ModelRegistry")
            .field("models", &models)
            .field("default_alias", &self.default_alias)
            .finish()
    }
}

impl ModelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the backend behind an alias.
    pub fn register(&mut self, alias: impl Into<String>, backend: Arc<dyn ModelBackend>) {
        self.models.insert(alias.into(), backend);
    }

    /// Resolve an alias.
    pub fn language_model(&self, alias: &str) -> Result<Arc<dyn ModelBackend>> {
        self.models
            .get(alias)
            .cloned()
            .ok_or_else(|| MimirError::ModelNotFound(alias.to_owned()))
    }

    /// The backend behind the default alias.
    pub fn default_model(&self) -> Result<Arc<dyn ModelBackend>> {
        self.language_model(&self.default_alias)
    }

    /// Resolve `alias`, or the default alias when none is given.
    pub fn resolve(&self, alias: Option<&str>) -> Result<Arc<dyn ModelBackend>> {
        match alias {
            Some(alias) => self.language_model(alias),
            None => self.default_model(),
        }
    }

    pub fn default_alias(&self) -> &str {
        &self.default_alias
    }

    /// Change the default alias. It must already be registered.
    pub fn set_default(&mut self, alias: impl Into<String>) -> Result<()> {
        let alias = alias.into();
        if !self.models.contains_key(&alias) {
            return Err(MimirError::Configuration(format!(
                "default model alias '{alias}' is not registered"
            )));
        }
        self.default_alias = alias;
        Ok(())
    }

    /// Registered aliases, sorted.
    pub fn aliases(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CallParams, GenerateResult, StreamResponse};
    use async_trait::async_trait;

    struct Fixed(&'static str);

    #[async_trait]
    impl ModelBackend for Fixed {
        fn provider(&self) -> &str {
            "fixed"
        }

        fn model_id(&self) -> &str {
            self.0
        }

        async fn generate(&self, _params: &CallParams) -> Result<GenerateResult> {
            Ok(GenerateResult::new(self.0))
        }

        async fn stream(&self, _params: &CallParams) -> Result<StreamResponse> {
            Err(MimirError::InvalidInput("not streaming".into()))
        }
    }

    #[test]
    fn resolves_registered_alias() {
        let mut registry = ModelRegistry::new();
        registry.register("chat-model-large", Arc::new(Fixed("gpt-4o")));

        let model = registry.language_model("chat-model-large").unwrap();
        assert_eq!(model.qualified_id(), "fixed:gpt-4o");
        assert_eq!(registry.default_model().unwrap().model_id(), "gpt-4o");
    }

    #[test]
    fn unknown_alias_is_model_not_found() {
        let registry = ModelRegistry::new();
        assert!(matches!(
            registry.language_model("nope"),
            Err(MimirError::ModelNotFound(alias)) if alias == "nope"
        ));
    }

    #[test]
    fn resolve_falls_back_to_the_default() {
        let mut registry = ModelRegistry::new();
        registry.register("chat-model-large", Arc::new(Fixed("gpt-4o")));
        registry.register("chat-model-small", Arc::new(Fixed("gpt-4o-mini")));
        registry.set_default("chat-model-small").unwrap();

        assert_eq!(registry.resolve(None).unwrap().model_id(), "gpt-4o-mini");
        assert_eq!(
            registry.resolve(Some("chat-model-large")).unwrap().model_id(),
            "gpt-4o"
        );
        assert!(matches!(
            registry.resolve(Some("nope")),
            Err(MimirError::ModelNotFound(_))
        ));
    }

    #[test]
    fn set_default_requires_registration() {
        let mut registry = ModelRegistry::new();
        registry.register("title-model", Arc::new(Fixed("gpt-4o")));
        assert!(registry.set_default("block-model").is_err());
        registry.set_default("title-model").unwrap();
        assert_eq!(registry.default_alias(), "title-model");
    }

    #[test]
    fn aliases_are_sorted() {
        let mut registry = ModelRegistry::new();
        for (alias, model) in DEFAULT_ALIASES {
            registry.register(*alias, Arc::new(Fixed(*model)));
        }
        assert_eq!(
            registry.aliases(),
            vec![
                "block-model",
                "chat-model-large",
                "chat-model-small",
                "title-model"
            ]
        );
    }
}
