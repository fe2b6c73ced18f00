//! Compiler and executor configuration
//!
//! Loaded from a `scrap.toml`; every field is optional and falls back to
//! its default.

use std::path::{Path, PathBuf};

use scrap_runtime::{TermSize, DEFAULT_MAX_MEMORY, DEFAULT_MIN_MEMORY};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding `build.runtime_dir`
pub const RUNTIME_DIR_ENV: &str = "SCRAP_RUNTIME_DIR";

/// Default worker thread stack size (64 MiB)
const DEFAULT_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Errors loading or validating a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Garbage collector limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Initial soft threshold in bytes
    pub min_memory: usize,
    /// Hard cap in bytes
    pub max_memory: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            min_memory: DEFAULT_MIN_MEMORY,
            max_memory: DEFAULT_MAX_MEMORY,
        }
    }
}

/// Worker thread settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    pub stack_size: usize,
    /// Width reported by `cursor_max_x`
    pub term_columns: i64,
    /// Height reported by `cursor_max_y`
    pub term_rows: i64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        let term = TermSize::default();
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            term_columns: term.columns,
            term_rows: term.rows,
        }
    }
}

impl ExecConfig {
    pub fn term_size(&self) -> TermSize {
        TermSize {
            columns: self.term_columns,
            rows: self.term_rows,
        }
    }
}

/// Settings for building standalone executables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Directory holding `libscrap_runtime.a`
    pub runtime_dir: PathBuf,
    /// C compiler driver used to link; discovered when unset
    pub linker: Option<String>,
    pub extra_flags: Vec<String>,
    pub optimize: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            runtime_dir: PathBuf::from("target/release"),
            linker: None,
            extra_flags: Vec::new(),
            optimize: false,
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapConfig {
    pub gc: GcConfig,
    pub exec: ExecConfig,
    pub build: BuildConfig,
}

impl ScrapConfig {
    /// Load, apply environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `SCRAP_RUNTIME_DIR`
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = var(RUNTIME_DIR_ENV).filter(|dir| !dir.is_empty()) {
            self.build.runtime_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gc.min_memory == 0 {
            return Err(ConfigError::Invalid("gc.min_memory must be positive".to_string()));
        }
        if self.gc.min_memory > self.gc.max_memory {
            return Err(ConfigError::Invalid(format!(
                "gc.min_memory ({}) exceeds gc.max_memory ({})",
                self.gc.min_memory, self.gc.max_memory
            )));
        }
        if self.exec.stack_size == 0 {
            return Err(ConfigError::Invalid("exec.stack_size must be positive".to_string()));
        }
        if self.exec.term_columns <= 0 || self.exec.term_rows <= 0 {
            return Err(ConfigError::Invalid("exec terminal size must be positive".to_string()));
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        let config = ScrapConfig::default();
        assert_eq!(config.gc.min_memory, 64 * 1024);
        assert_eq!(config.gc.max_memory, 256 * 1024 * 1024);
        assert_eq!(config.exec.stack_size, 64 * 1024 * 1024);
        assert_eq!(config.build.runtime_dir, PathBuf::from("target/release"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = ScrapConfig::from_toml_str(
            r#"
            [gc]
            min_memory = 1024

            [build]
            linker = "clang"
            extra_flags = ["-static"]
            "#,
        )
        .unwrap();

        assert_eq!(config.gc.min_memory, 1024);
        assert_eq!(config.gc.max_memory, DEFAULT_MAX_MEMORY);
        assert_eq!(config.build.linker.as_deref(), Some("clang"));
        assert_eq!(config.build.extra_flags, vec!["-static".to_string()]);
        assert!(!config.build.optimize);
        assert_eq!(config.exec, ExecConfig::default());
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(ScrapConfig::from_toml_str("").unwrap(), ScrapConfig::default());
    }

    #[test]
    fn parse_errors() {
        let err = ScrapConfig::from_toml_str("[gc]\nmin_memory = \"lots\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validation() {
        let mut config = ScrapConfig::default();
        config.gc.min_memory = config.gc.max_memory + 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ScrapConfig::default();
        config.exec.stack_size = 0;
        assert!(config.validate().is_err());

        let mut config = ScrapConfig::default();
        config.exec.term_rows = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn runtime_dir_override() {
        let mut config = ScrapConfig::default();
        config.apply_overrides(|name| (name == RUNTIME_DIR_ENV).then(|| "/opt/scrap".to_string()));
        assert_eq!(config.build.runtime_dir, PathBuf::from("/opt/scrap"));

        let mut config = ScrapConfig::default();
        config.apply_overrides(|_| Some(String::new()));
        assert_eq!(config.build.runtime_dir, PathBuf::from("target/release"));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[exec]\nstack_size = 1048576").unwrap();

        let config = ScrapConfig::load(file.path()).unwrap();
        assert_eq!(config.exec.stack_size, 1024 * 1024);
        assert_eq!(config.exec.term_size(), TermSize { columns: 80, rows: 24 });
    }

    #[test]
    fn missing_file() {
        let err = ScrapConfig::load("/nonexistent/scrap.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = ScrapConfig::default();
        config.build.optimize = true;
        let text = config.to_toml_string().unwrap();
        assert_eq!(ScrapConfig::from_toml_str(&text).unwrap(), config);
    }
}
