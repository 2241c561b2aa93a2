//! Configuration schema types for `spritecss.toml`
//!
//! Defines the structure and validation rules for sprite build configuration.

use crate::atlas::Layout;
use crate::compress::{FailurePolicy, DEFAULT_MAX_COLORS};
use crate::property::{BuiltinProperty, RESERVED_NAME};
use crate::retina::{ResizeFilter, RetinaMode};
use crate::template::{PublicBase, DEFAULT_HASH_LENGTH, DEFAULT_OUTPUT_TEMPLATE, SHEET_EXTENSION};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Prefix marking a filter value as a regular expression
pub const REGEX_PREFIX: &str = "re:";

/// Path settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Working directory; relative values are taken from the process directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Extra directories searched for sprite elements, in order
    #[serde(default)]
    pub include: Vec<PathBuf>,
    /// Output path template for the normal-density sheet
    #[serde(default = "default_output")]
    pub output: String,
    /// Public path template; derived from the output path when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public: Option<String>,
    /// Directory the derived public path is relative to
    #[serde(default)]
    pub public_base: PublicBase,
}

fn default_output() -> String {
    DEFAULT_OUTPUT_TEMPLATE.to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cwd: None,
            include: vec![],
            output: default_output(),
            public: None,
            public_base: PublicBase::default(),
        }
    }
}

/// High-density settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RetinaConfig {
    #[serde(default)]
    pub mode: RetinaMode,
}

/// Built-in packer settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PackingConfig {
    #[serde(default)]
    pub algorithm: Layout,
    /// Padding between elements in pixels
    #[serde(default)]
    pub padding: u32,
}

/// Built-in resizer settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResizeConfig {
    #[serde(default)]
    pub filter: ResizeFilter,
}

/// Built-in compressor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Palette size after quantization
    #[serde(default = "default_max_colors")]
    pub max_colors: usize,
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

fn default_max_colors() -> usize {
    DEFAULT_MAX_COLORS
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_colors: DEFAULT_MAX_COLORS,
            on_failure: FailurePolicy::default(),
        }
    }
}

/// `background-image` fallback style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageStyle {
    #[default]
    Auto,
    Normal,
}

/// `background-size` style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SizeStyle {
    #[default]
    Auto,
    Normal,
}

/// `background-position` style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PositionStyle {
    #[default]
    Pixel,
    Normal,
    Percent,
}

/// Generated style settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StyleConfig {
    #[serde(default)]
    pub background_image: ImageStyle,
    #[serde(default)]
    pub background_size: SizeStyle,
    #[serde(default)]
    pub background_position: PositionStyle,
}

/// Stylesheet and url filters.
///
/// Values match as substrings, or as regular expressions when prefixed with `re:`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FilterConfig {
    /// Only stylesheets whose path matches are processed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,
    /// Stylesheets whose path matches are skipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
    /// Enables background `url(...)` sprites for matching urls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Complete spritecss.toml configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpriteConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub retina: RetinaConfig,
    #[serde(default)]
    pub packing: PackingConfig,
    #[serde(default)]
    pub resize: ResizeConfig,
    #[serde(default)]
    pub compress: CompressConfig,
    #[serde(default)]
    pub style: StyleConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    /// `sprite-<alias>` name to the properties it expands to
    #[serde(default)]
    pub alias: BTreeMap<String, Vec<String>>,
    /// Hex characters used for `[contenthash]`
    #[serde(default = "default_hash_length")]
    pub hash_length: usize,
    /// Skip all processing
    #[serde(default)]
    pub development: bool,
}

fn default_hash_length() -> usize {
    DEFAULT_HASH_LENGTH
}

impl Default for SpriteConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            retina: RetinaConfig::default(),
            packing: PackingConfig::default(),
            resize: ResizeConfig::default(),
            compress: CompressConfig::default(),
            style: StyleConfig::default(),
            filter: FilterConfig::default(),
            alias: BTreeMap::new(),
            hash_length: DEFAULT_HASH_LENGTH,
            development: false,
        }
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "alias.icon")
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "spritecss.toml: '{}' {}", self.field, self.message)
    }
}

fn ends_with_png(template: &str) -> bool {
    template.to_ascii_lowercase().ends_with(SHEET_EXTENSION)
}

impl SpriteConfig {
    /// Validate the configuration and return every problem found
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ConfigValidationError { field: field.to_string(), message })
        };

        if !ends_with_png(&self.paths.output) {
            push("paths.output", format!("must name a {} file", SHEET_EXTENSION));
        }
        if let Some(public) = &self.paths.public {
            if !public.is_empty() && !ends_with_png(public) {
                push("paths.public", format!("must name a {} file", SHEET_EXTENSION));
            }
        }

        if self.hash_length == 0 || self.hash_length > 64 {
            push("hash_length", "must be between 1 and 64".to_string());
        }

        if self.compress.max_colors < 2 {
            push("compress.max_colors", "must be at least 2".to_string());
        }

        // Odd padding would shift elements onto odd offsets in the high-density sheet
        if self.retina.mode.is_enabled() && self.packing.padding % 2 == 1 {
            push("packing.padding", "must be even when retina is enabled".to_string());
        }

        let filters = [
            ("filter.include", &self.filter.include),
            ("filter.exclude", &self.filter.exclude),
            ("filter.url", &self.filter.url),
        ];
        for (name, value) in filters {
            if let Some(pattern) = value.as_deref().and_then(|v| v.strip_prefix(REGEX_PREFIX)) {
                if let Err(e) = regex::Regex::new(pattern) {
                    push(name, format!("is not a valid regular expression: {}", e));
                }
            }
        }

        for (alias, properties) in &self.alias {
            let field = format!("alias.{}", alias);
            if alias == RESERVED_NAME {
                push(&field, format!("'{}' is reserved", RESERVED_NAME));
            }
            if properties.is_empty() {
                push(&field, "must list at least one property".to_string());
            }
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Alias properties that name no built-in property
    pub fn unknown_alias_properties(&self) -> Vec<(String, String)> {
        self.alias
            .iter()
            .flat_map(|(alias, props)| props.iter().map(move |p| (alias, p)))
            .filter(|(_, p)| BuiltinProperty::from_name(p).is_none())
            .map(|(a, p)| (a.clone(), p.clone()))
            .collect()
    }
}
