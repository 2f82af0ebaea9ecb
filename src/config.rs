use crate::api::{DynamicsClient, PluralizingResolver, ResilienceConfig};
use crate::auth::ClientCredentials;
use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    /// Logical name to entity set overrides for tables that do not pluralize
    #[serde(default)]
    pub entity_mappings: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub default_page_size: Option<u32>,
    pub max_rate_limit_attempts: u32,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_page_size: None,
            max_rate_limit_attempts: 5,
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("dynamics-webapi");
        Ok(config_dir.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(Self::get_config_path()?)
    }

    /// Load `path`, falling back to defaults when it does not exist
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config_path = path.as_ref();
        debug!("Loading config from: {:?}", config_path);

        if !config_path.exists() {
            info!("Config file doesn't exist, using defaults");
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: Config = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        debug!("Loaded config with {} entity mappings", config.entity_mappings.len());
        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let config_path = path.as_ref();
        debug!("Saving config to: {:?}", config_path);

        if let Some(dir) = config_path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {:?}", dir))?;
        }

        let config_content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(config_path, config_content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        info!("Config saved successfully");
        Ok(())
    }

    pub fn get_entity_mapping(&self, entity_name: &str) -> Option<&String> {
        self.entity_mappings.get(entity_name)
    }

    pub fn resilience(&self) -> ResilienceConfig {
        ResilienceConfig::builder()
            .max_attempts(self.settings.max_rate_limit_attempts)
            .build()
    }

    /// Client for the organization in `credentials`, tuned by these settings
    pub fn client(&self, credentials: &ClientCredentials) -> Result<DynamicsClient> {
        let resolver = PluralizingResolver::new().with_overrides(self.entity_mappings.clone());

        let mut builder = DynamicsClient::builder(credentials.base_url(), credentials.to_grant())
            .timeout(Duration::from_secs(self.settings.request_timeout_secs))
            .resilience(self.resilience())
            .resolver(Arc::new(resolver));
        if let Some(size) = self.settings.default_page_size {
            builder = builder.default_page_size(size);
        }

        builder.build().context("Failed to build Dynamics client")
    }
}
