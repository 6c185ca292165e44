//! Configuration Loader
//!
//! Environment-aware loading: a base TOML file, an optional per-environment
//! override file, then `LDN__`-prefixed environment variables.

use super::{ConfigResult, ConfigurationError, LdnConfig};
use config::{Config, Environment, File, FileFormat};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const BASE_FILE: &str = "ldn.toml";
const ENV_PREFIX: &str = "LDN";
const ENV_SEPARATOR: &str = "__";

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: LdnConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::build(config_dir, environment, None)
    }

    /// Like [`Self::load_from_directory_with_env`], but reads `LDN__*` overrides
    /// from `vars` instead of the process environment
    pub fn load_from_directory_with_vars(
        config_dir: Option<PathBuf>,
        environment: &str,
        vars: HashMap<String, String>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::build(config_dir, environment, Some(vars))
    }

    fn build(
        config_dir: Option<PathBuf>,
        environment: &str,
        vars: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);
        let base_file = config_directory.join(BASE_FILE);
        let env_file = config_directory.join(format!("ldn.{environment}.toml"));

        debug!(
            environment = environment,
            directory = %config_directory.display(),
            "Loading LDN configuration"
        );

        let settings = Config::builder()
            .add_source(Self::toml_source(&base_file))
            .add_source(Self::toml_source(&env_file))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(vars),
            )
            .build()
            .map_err(|e| {
                ConfigurationError::load_error(config_directory.display().to_string(), e)
            })?;

        let config: LdnConfig = settings
            .try_deserialize()
            .map_err(ConfigurationError::deserialization_error)?;

        config.validate()?;

        info!(
            environment = environment,
            routes = config.routes.len(),
            persistent_store = config.database.url.is_some(),
            scheduler_enabled = config.scheduler.enabled,
            "⚙️ Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration (embedding, tests)
    pub fn from_config(config: LdnConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: Self::default_config_directory(),
        }))
    }

    fn toml_source(path: &Path) -> File<config::FileSourceFile, FileFormat> {
        File::new(&path.to_string_lossy(), FileFormat::Toml).required(false)
    }

    pub fn config(&self) -> &LdnConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration with the database URL masked, for diagnostics
    pub fn debug_config(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(&self.config).unwrap_or_default();
        if let Some(url) = value
            .pointer_mut("/database/url")
            .filter(|url| url.is_string())
        {
            *url = serde_json::Value::String("[MASKED]".to_string());
        }
        value
    }

    /// Detect current environment from `LDN_ENV`, defaulting to `development`
    pub fn detect_environment() -> String {
        env::var("LDN_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    /// `LDN_CONFIG_DIR` if set, otherwise the first existing candidate
    fn default_config_directory() -> PathBuf {
        if let Ok(dir) = env::var("LDN_CONFIG_DIR") {
            return PathBuf::from(dir);
        }

        let manifest_config = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config");
        [PathBuf::from("config"), manifest_config]
            .into_iter()
            .find(|dir| dir.join(BASE_FILE).is_file())
            .unwrap_or_else(|| PathBuf::from("config"))
    }
}
