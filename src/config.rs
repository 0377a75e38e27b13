//! Configuration management for the shape registry
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (shapes.toml)
//! - Environment variables (SHAPES__*)
//!
//! ## Example config file (shapes.toml):
//! ```toml
//! [registry]
//! path = "./registry"
//! git_history = true
//! author = "ETL Pipeline"
//!
//! [evolution]
//! max_attempts = 3
//! store_timeout_ms = 5000
//!
//! [evolution.inference]
//! mixed_types = "reject"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::coordinator::EvolutionConfig;
use crate::store::FileStoreOptions;

/// Main configuration for the shape registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapesConfig {
    /// Registry storage settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Evolution and inference settings
    #[serde(default)]
    pub evolution: EvolutionConfig,
}

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Path to the registry root
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,

    /// Mirror every appended snapshot into git history
    #[serde(default = "default_true")]
    pub git_history: bool,

    /// Author for git commits
    #[serde(default)]
    pub author: Option<String>,
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("registry")
}

fn default_true() -> bool {
    true
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
            git_history: true,
            author: None,
        }
    }
}

impl RegistryConfig {
    pub fn store_options(&self) -> FileStoreOptions {
        FileStoreOptions {
            git_history: self.git_history,
            author: self.author.clone(),
        }
    }
}

impl ShapesConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["shapes.toml", ".shapes.toml", "config/shapes.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(project_dirs) =
            directories::ProjectDirs::from("dev", "shapes", "shape-registry")
        {
            let xdg_config = project_dirs.config_dir().join("shapes.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (SHAPES__REGISTRY__PATH, ...)
        builder = builder.add_source(
            Environment::with_prefix("SHAPES")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get the registry path (resolves relative paths)
    pub fn registry_path(&self) -> PathBuf {
        if self.registry.path.is_absolute() {
            self.registry.path.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.registry.path)
        }
    }
}
