//! Configuration loading and discovery for `spritecss.toml`
//!
//! Provides functions to find, load, and merge configuration.

use super::schema::SpriteConfig;
use crate::retina::RetinaMode;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the configuration file
pub const CONFIG_FILE: &str = "spritecss.toml";

/// Setup error: anything that stops a run before a stylesheet is touched
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse spritecss.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
    /// A filter pattern is not a valid regular expression
    #[error("Invalid filter pattern: {0}")]
    Regex(#[from] regex::Error),
    /// An alias or generator tried to use the reserved directive name
    #[error("'{0}' is reserved for the sprite-prop directive")]
    ReservedName(String),
    /// An alias lists a property no generator handles
    #[error("alias '{alias}' refers to unknown property '{property}'")]
    UnknownProperty { alias: String, property: String },
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override working directory
    pub cwd: Option<PathBuf>,
    /// Override the output path template
    pub output: Option<String>,
    /// Override high-density mode
    pub retina: Option<RetinaMode>,
    /// Enable or disable the built-in compressor
    pub compress: Option<bool>,
}

/// Find spritecss.toml by walking up from the current working directory.
pub fn find_config() -> Option<PathBuf> {
    env::current_dir().ok().and_then(find_config_from)
}

/// Find spritecss.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration from a spritecss.toml file.
///
/// If a path is provided, loads from that file. Otherwise, uses `find_config()`
/// to locate the config file. If no config file is found, returns a default
/// configuration.
///
/// # Example
/// ```ignore
/// let config = load_config(Some(Path::new("site/spritecss.toml")))?;
/// ```
pub fn load_config(path: Option<&Path>) -> Result<SpriteConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(p) => load_config_file(&p),
        None => Ok(SpriteConfig::default()),
    }
}

/// Load configuration from a specific file path.
///
/// A relative `paths.cwd` is anchored at the directory holding the file.
fn load_config_file(path: &Path) -> Result<SpriteConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let mut config: SpriteConfig = toml::from_str(&contents)?;

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    let base = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(base) = base {
        let cwd = config.paths.cwd.take().unwrap_or_default();
        config.paths.cwd = Some(base.join(cwd));
    }

    Ok(config)
}

/// Merge CLI overrides into a configuration.
///
/// CLI arguments take precedence over config file values.
pub fn merge_cli_overrides(config: &mut SpriteConfig, overrides: &CliOverrides) {
    if let Some(ref cwd) = overrides.cwd {
        config.paths.cwd = Some(cwd.clone());
    }

    if let Some(ref output) = overrides.output {
        config.paths.output = output.clone();
    }

    if let Some(mode) = overrides.retina {
        config.retina.mode = mode;
    }

    if let Some(compress) = overrides.compress {
        config.compress.enabled = compress;
    }
}
