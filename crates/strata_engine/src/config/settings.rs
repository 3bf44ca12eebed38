//! # Engine Settings
//!
//! Concrete configuration structures for the engine core. Every struct has
//! sensible defaults and builder-style setters, and missing fields in a
//! config file fall back to those defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{Config, ConfigError};

/// Default resource budget: 64 MiB
pub const DEFAULT_MEMORY_LIMIT: usize = 64 * 1024 * 1024;

/// # Engine Configuration
///
/// Core engine behavior: logging and debug features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log level for the engine (`error`, `warn`, `info`, `debug`, `trace`)
    pub log_level: String,
    /// Whether to enable debug features
    pub debug_mode: bool,
}

impl EngineConfig {
    /// Create a new engine configuration
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            debug_mode: cfg!(debug_assertions),
        }
    }

    /// Set log level
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable debug mode
    #[must_use]
    pub const fn with_debug(mut self, enabled: bool) -> Self {
        self.debug_mode = enabled;
        self
    }

    /// Validate the log level
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.log_level.to_ascii_lowercase().as_str() {
            "off" | "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            other => Err(ConfigError::Invalid(format!("unknown log level '{other}'"))),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Resource Configuration
///
/// Where the resource pack lives and how much memory it may keep resident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Directory or archive path of the pack
    pub pack_path: PathBuf,
    /// Whether `pack_path` is a compressed archive instead of a directory
    pub compressed: bool,
    /// Memory budget in bytes (0 = unlimited)
    pub memory_limit_bytes: usize,
}

impl ResourceConfig {
    /// Create a resource configuration with the default budget
    pub fn new(pack_path: impl Into<PathBuf>) -> Self {
        Self {
            pack_path: pack_path.into(),
            compressed: false,
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT,
        }
    }

    /// Mark the pack as a compressed archive
    #[must_use]
    pub const fn with_compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    /// Set the memory budget in bytes
    #[must_use]
    pub const fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pack_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("pack path cannot be empty".to_string()));
        }
        Ok(())
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self::new("resources")
    }
}

/// # Scene Configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Run the visited-set cycle check when reparenting nodes.
    /// Only honoured in builds with debug assertions.
    pub debug_cycle_check: bool,
}

impl SceneConfig {
    /// Create a scene configuration
    pub const fn new() -> Self {
        Self {
            debug_cycle_check: cfg!(debug_assertions),
        }
    }

    /// Enable or disable the debug cycle check
    #[must_use]
    pub const fn with_cycle_check(mut self, enabled: bool) -> Self {
        self.debug_cycle_check = enabled;
        self
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration that encompasses all engine subsystems.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Engine core configuration
    pub engine: EngineConfig,
    /// Resource pack configuration
    pub resources: ResourceConfig,
    /// Scene graph configuration
    pub scene: SceneConfig,
}

impl ApplicationConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        self.resources.validate()?;
        Ok(())
    }
}

impl Config for ApplicationConfig {}
