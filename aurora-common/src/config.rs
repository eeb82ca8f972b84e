//! Configuration loading and data folder resolution
//!
//! Bootstrap configuration comes from an optional TOML file. Nothing in it is
//! required: a missing or unreadable file degrades to built-in defaults with a
//! warning.
//!
//! # Data folder priority
//!
//! 1. Command-line argument (`--data-folder`)
//! 2. Environment variable (`AURORA_DATA_FOLDER`)
//! 3. TOML config file (`data_folder`)
//! 4. Compiled default (`./data`)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the data folder
pub const DATA_FOLDER_ENV: &str = "AURORA_DATA_FOLDER";

/// Conventional inventory file names
pub const DEFAULT_SAMPLES_FILE: &str = "available_samples.json";
pub const DEFAULT_PROTOCOLS_FILE: &str = "available_protocols.json";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Folder holding the inventory documents
    #[serde(default)]
    pub data_folder: Option<PathBuf>,

    /// Samples inventory file name (relative to the data folder)
    #[serde(default = "default_samples_file")]
    pub samples_file: String,

    /// Protocols inventory file name (relative to the data folder)
    #[serde(default = "default_protocols_file")]
    pub protocols_file: String,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Workflow engine configuration (optional)
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            data_folder: None,
            samples_file: default_samples_file(),
            protocols_file: default_protocols_file(),
            logging: LoggingConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Workflow engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Label of the cycler code registered in the workflow engine
    #[serde(default = "default_code_label")]
    pub code_label: String,

    /// Folder receiving submitted bundles when the local directory engine is used
    #[serde(default)]
    pub workflows_folder: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            code_label: default_code_label(),
            workflows_folder: None,
        }
    }
}

fn default_samples_file() -> String {
    DEFAULT_SAMPLES_FILE.to_string()
}

fn default_protocols_file() -> String {
    DEFAULT_PROTOCOLS_FILE.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_code_label() -> String {
    "tomato@localhost".to_string()
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from an explicit path, or the platform default location
    ///
    /// Never fails: a missing or malformed file is logged and defaults are used.
    pub fn load_or_default(explicit: Option<&Path>) -> Self {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) => path,
                None => {
                    warn!("Could not determine config directory, using defaults");
                    return Self::default();
                }
            },
        };

        if !path.exists() {
            if explicit.is_some() {
                warn!("Config file not found: {}, using defaults", path.display());
            }
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(config) => {
                    info!("Loaded TOML configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("{} ({}), using defaults", e, path.display());
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Read TOML failed: {} ({}), using defaults", e, path.display());
                Self::default()
            }
        }
    }
}

/// Platform config file location: `<config_dir>/aurora/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("aurora").join("config.toml"))
}

/// Compiled default data folder (the `data/` convention)
pub fn default_data_folder() -> PathBuf {
    PathBuf::from("data")
}

/// Resolves the data folder following the documented priority order
#[derive(Debug, Clone, Default)]
pub struct DataFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl DataFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>, config: &TomlConfig) -> Self {
        Self {
            cli_arg,
            toml_value: config.data_folder.clone(),
        }
    }

    /// Resolve the data folder (never fails; falls back to the compiled default)
    pub fn resolve(&self) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(DATA_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        // Priority 3: TOML config file
        if let Some(path) = &self.toml_value {
            return path.clone();
        }

        // Priority 4: compiled default
        default_data_folder()
    }
}

/// Creates the data folder and derives inventory paths inside it
#[derive(Debug, Clone)]
pub struct DataFolderInitializer {
    data_folder: PathBuf,
    samples_file: String,
    protocols_file: String,
}

impl DataFolderInitializer {
    pub fn new(data_folder: PathBuf, config: &TomlConfig) -> Self {
        Self {
            data_folder,
            samples_file: config.samples_file.clone(),
            protocols_file: config.protocols_file.clone(),
        }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.data_folder.exists() {
            std::fs::create_dir_all(&self.data_folder).map_err(|source| Error::DataFolder {
                path: self.data_folder.clone(),
                source,
            })?;
            info!("Created data folder: {}", self.data_folder.display());
        }
        Ok(())
    }

    pub fn data_folder(&self) -> &Path {
        &self.data_folder
    }

    pub fn samples_path(&self) -> PathBuf {
        self.data_folder.join(&self.samples_file)
    }

    pub fn protocols_path(&self) -> PathBuf {
        self.data_folder.join(&self.protocols_file)
    }
}
