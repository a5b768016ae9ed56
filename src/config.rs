//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. An explicit path (e.g. the CLI's `--config`)
//! 2. `~/.mimir/config.toml` (user)
//! 3. `/etc/mimir/config.toml` (system)
//!
//! With no file anywhere the defaults apply; only an explicit path that does
//! not exist is an error.
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.mimir/secrets.toml` (user, must be 0600)
//! 2. `/etc/mimir/secrets.toml` (system, must be 0600)
//!
//! ```toml
//! [cache]
//! backend = "directory"        # "memory" | "directory" | "none"
//! dir = "/var/cache/mimir"
//!
//! [replay]
//! chunk_delay_ms = 0
//!
//! [providers.openai]
//! base_url = "http://localhost:11434/v1"
//! timeout_secs = 60
//!
//! [providers.fireworks]
//! timeout_secs = 300
//!
//! [models]
//! default = "chat-model-small"
//!
//! [models.aliases]
//! chat-model-small = "llama3.1:8b"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::{CacheConfig, ReplayPacing};
use crate::{MimirError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub replay: ReplaySection,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub models: ModelsConfig,
}

/// Which store backs the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Memory,
    Directory,
    None,
}

/// `[cache]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default)]
    pub backend: CacheBackendKind,
    /// Memory store capacity (default: 10,000).
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    /// Memory store TTL in seconds; 0 disables expiry (default: 3600).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Directory store location (default: the platform cache dir).
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::default(),
            max_entries: default_max_entries(),
            ttl_secs: default_ttl_secs(),
            dir: None,
        }
    }
}

fn default_max_entries() -> u64 {
    10_000
}

fn default_ttl_secs() -> u64 {
    3600
}

impl CacheSection {
    /// Settings for a [`MemoryStore`](crate::cache::MemoryStore).
    pub fn memory_config(&self) -> CacheConfig {
        let config = CacheConfig::new().max_entries(self.max_entries);
        if self.ttl_secs == 0 {
            config.no_ttl()
        } else {
            config.ttl(Duration::from_secs(self.ttl_secs))
        }
    }
}

/// `[replay]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplaySection {
    #[serde(default)]
    pub initial_delay_ms: u64,
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
}

impl Default for ReplaySection {
    fn default() -> Self {
        Self {
            initial_delay_ms: 0,
            chunk_delay_ms: default_chunk_delay_ms(),
        }
    }
}

fn default_chunk_delay_ms() -> u64 {
    10
}

impl ReplaySection {
    pub fn pacing(&self) -> ReplayPacing {
        ReplayPacing::default()
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .chunk_delay(Duration::from_millis(self.chunk_delay_ms))
    }
}

/// Provider configurations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: Option<OpenAiSection>,
    /// Endpoint of the reasoning model.
    #[serde(default)]
    pub fireworks: Option<OpenAiSection>,
}

/// `[providers.openai]` or `[providers.fireworks]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiSection {
    /// Endpoint base URL (default: the provider's public API).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Request timeout in seconds (default: 120).
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// `[models]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelsConfig {
    /// Default alias (default: `chat-model-large`).
    #[serde(default)]
    pub default: Option<String>,
    /// Alias → upstream model id, merged over the built-in table.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

/// Secrets configuration (API keys).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub openai: Option<ApiKeySecret>,
    #[serde(default)]
    pub fireworks: Option<ApiKeySecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

/// Provider name → environment variable name mapping.
const PROVIDER_ENV_VARS: &[(&str, &str)] = &[
    ("openai", "OPENAI_API_KEY"),
    ("fireworks", "FIREWORKS_API_KEY"),
];

impl Config {
    /// Load configuration from the standard locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from one file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MimirError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MimirError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(MimirError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".mimir").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/mimir/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Returns empty secrets if no file exists (keys may come from env vars).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".mimir").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/mimir/secrets.toml");
        if system_secrets.exists() {
            return Self::load_from(&system_secrets);
        }

        Ok(Secrets::default())
    }

    /// Load one secrets file, rejecting group- or world-readable files.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            MimirError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MimirError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            MimirError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(MimirError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// API key for a provider, falling back to its environment variable.
    pub fn api_key(&self, provider: &str) -> Option<String> {
        let from_file = match provider {
            "openai" => self.openai.as_ref(),
            "fireworks" => self.fireworks.as_ref(),
            _ => None,
        }
        .map(|s| s.api_key.clone());

        from_file.or_else(|| {
            PROVIDER_ENV_VARS
                .iter()
                .find(|(name, _)| *name == provider)
                .and_then(|(_, env_var)| std::env::var(env_var).ok())
        })
    }
}
