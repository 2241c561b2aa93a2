//! Immutable run options
//!
//! [`SpriteOptions`] is built once, from a [`SpriteConfig`] or through
//! [`SpriteOptionsBuilder`], and then shared read-only by every stage of every run.

use super::loader::ConfigError;
use super::schema::{ImageStyle, PositionStyle, SizeStyle, SpriteConfig, REGEX_PREFIX};
use crate::atlas::{AtlasConfig, AtlasPacker};
use crate::compose::Packer;
use crate::compress::{Compression, Compressor, FailurePolicy, QuantizeCompressor};
use crate::output::{FsWriter, SheetWriter};
use crate::property::{
    BackgroundImageMode, BackgroundPositionMode, BackgroundSizeMode, GeneratorFn, PropertyRegistry,
};
use crate::resolve::{normalize, PathResolver};
use crate::retina::{ImageResizer, Resizer, RetinaMode};
use crate::template::{PathTemplate, PathTemplates};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Caller supplied match function
pub type PredicateFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// A string test used for stylesheet and url filters
#[derive(Clone)]
pub enum Predicate {
    /// Matches when the subject contains the text
    Substring(String),
    Pattern(Regex),
    Function(PredicateFn),
}

impl Predicate {
    /// Parse a config value: `re:`-prefixed values are regular expressions.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.strip_prefix(REGEX_PREFIX) {
            Some(pattern) => Ok(Predicate::Pattern(Regex::new(pattern)?)),
            None => Ok(Predicate::Substring(value.to_string())),
        }
    }

    pub fn matches(&self, subject: &str) -> bool {
        match self {
            Predicate::Substring(text) => subject.contains(text.as_str()),
            Predicate::Pattern(re) => re.is_match(subject),
            Predicate::Function(f) => f(subject),
        }
    }
}

impl std::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::Substring(text) => f.debug_tuple("Substring").field(text).finish(),
            Predicate::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Predicate::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// Everything a run needs, fixed at setup time
#[derive(Clone)]
pub struct SpriteOptions {
    pub(crate) cwd: PathBuf,
    pub(crate) resolver: PathResolver,
    pub(crate) templates: PathTemplates,
    pub(crate) retina: RetinaMode,
    pub(crate) registry: PropertyRegistry,
    pub(crate) aliases: BTreeMap<String, Vec<String>>,
    pub(crate) include: Option<Predicate>,
    pub(crate) exclude: Option<Predicate>,
    pub(crate) url_filter: Option<Predicate>,
    pub(crate) development: bool,
    pub(crate) packer: Arc<dyn Packer>,
    pub(crate) resizer: Arc<dyn Resizer>,
    pub(crate) compression: Option<Compression>,
    pub(crate) writer: Arc<dyn SheetWriter>,
}

impl std::fmt::Debug for SpriteOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpriteOptions")
            .field("cwd", &self.cwd)
            .field("resolver", &self.resolver)
            .field("templates", &self.templates)
            .field("retina", &self.retina)
            .field("registry", &self.registry)
            .field("aliases", &self.aliases)
            .field("include", &self.include)
            .field("exclude", &self.exclude)
            .field("url_filter", &self.url_filter)
            .field("development", &self.development)
            .field("compression", &self.compression)
            .finish_non_exhaustive()
    }
}

impl SpriteOptions {
    /// Build options from a loaded configuration with the built-in stages.
    pub fn from_config(config: SpriteConfig) -> Result<Self, ConfigError> {
        SpriteOptionsBuilder::from_config(config).build()
    }

    pub fn builder() -> SpriteOptionsBuilder {
        SpriteOptionsBuilder::new()
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn retina(&self) -> RetinaMode {
        self.retina
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn registry(&self) -> &PropertyRegistry {
        &self.registry
    }

    pub fn is_development(&self) -> bool {
        self.development
    }

    /// Whether the stylesheet at `path` passes the include/exclude filters
    pub fn accepts(&self, path: &str) -> bool {
        let included = self.include.as_ref().map_or(true, |p| p.matches(path));
        let excluded = self.exclude.as_ref().is_some_and(|p| p.matches(path));
        included && !excluded
    }
}

/// Step-by-step construction of [`SpriteOptions`], including programmatic hooks
#[derive(Default)]
pub struct SpriteOptionsBuilder {
    config: SpriteConfig,
    output: Option<PathTemplate>,
    public: Option<PathTemplate>,
    image: Option<GeneratorFn>,
    size: Option<GeneratorFn>,
    position: Option<GeneratorFn>,
    generators: Vec<(String, GeneratorFn)>,
    include: Option<Predicate>,
    exclude: Option<Predicate>,
    url_filter: Option<Predicate>,
    packer: Option<Arc<dyn Packer>>,
    resizer: Option<Arc<dyn Resizer>>,
    compressor: Option<Arc<dyn Compressor>>,
    writer: Option<Arc<dyn SheetWriter>>,
}

impl SpriteOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: SpriteConfig) -> Self {
        Self { config, ..Self::default() }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.config.paths.cwd = Some(cwd.into());
        self
    }

    /// Add a directory searched for sprite elements
    pub fn include_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.paths.include.push(dir.into());
        self
    }

    pub fn output(mut self, template: impl Into<PathTemplate>) -> Self {
        self.output = Some(template.into());
        self
    }

    pub fn public(mut self, template: impl Into<PathTemplate>) -> Self {
        self.public = Some(template.into());
        self
    }

    pub fn retina(mut self, mode: RetinaMode) -> Self {
        self.config.retina.mode = mode;
        self
    }

    pub fn hash_length(mut self, length: usize) -> Self {
        self.config.hash_length = length;
        self
    }

    pub fn padding(mut self, padding: u32) -> Self {
        self.config.packing.padding = padding;
        self
    }

    pub fn alias(mut self, name: impl Into<String>, properties: &[&str]) -> Self {
        let properties = properties.iter().map(|p| p.to_string()).collect();
        self.config.alias.insert(name.into(), properties);
        self
    }

    /// Register a custom property generator
    pub fn generator(mut self, name: impl Into<String>, generator: GeneratorFn) -> Self {
        self.generators.push((name.into(), generator));
        self
    }

    pub fn background_image(mut self, generator: GeneratorFn) -> Self {
        self.image = Some(generator);
        self
    }

    pub fn background_size(mut self, generator: GeneratorFn) -> Self {
        self.size = Some(generator);
        self
    }

    pub fn background_position(mut self, generator: GeneratorFn) -> Self {
        self.position = Some(generator);
        self
    }

    pub fn position_style(mut self, style: PositionStyle) -> Self {
        self.config.style.background_position = style;
        self
    }

    pub fn include_stylesheets(mut self, predicate: Predicate) -> Self {
        self.include = Some(predicate);
        self
    }

    pub fn exclude_stylesheets(mut self, predicate: Predicate) -> Self {
        self.exclude = Some(predicate);
        self
    }

    /// Turn `background: url(...)` declarations with matching urls into sprites
    pub fn url_filter(mut self, predicate: Predicate) -> Self {
        self.url_filter = Some(predicate);
        self
    }

    pub fn development(mut self, development: bool) -> Self {
        self.config.development = development;
        self
    }

    pub fn packer(mut self, packer: Arc<dyn Packer>) -> Self {
        self.packer = Some(packer);
        self
    }

    pub fn resizer(mut self, resizer: Arc<dyn Resizer>) -> Self {
        self.resizer = Some(resizer);
        self
    }

    /// Use the built-in compressor
    pub fn compress(mut self, enabled: bool) -> Self {
        self.config.compress.enabled = enabled;
        self
    }

    /// Use a custom compressor; implies compression
    pub fn compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn on_compress_failure(mut self, policy: FailurePolicy) -> Self {
        self.config.compress.on_failure = policy;
        self
    }

    pub fn writer(mut self, writer: Arc<dyn SheetWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Validate everything and produce the options.
    pub fn build(self) -> Result<SpriteOptions, ConfigError> {
        let config = self.config;
        let errors: Vec<String> = config
            .validate()
            .into_iter()
            // A function template is checked when it is resolved
            .filter(|e| !(self.output.is_some() && e.field == "paths.output"))
            .map(|e| e.to_string())
            .collect();
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }

        let process_dir = std::env::current_dir()?;
        let cwd = normalize(&match &config.paths.cwd {
            Some(dir) => process_dir.join(dir),
            None => process_dir,
        });

        let image_mode = match (self.image, config.style.background_image) {
            (Some(f), _) => BackgroundImageMode::Custom(f),
            (None, ImageStyle::Auto) => BackgroundImageMode::Auto,
            (None, ImageStyle::Normal) => BackgroundImageMode::Normal,
        };
        let size_mode = match (self.size, config.style.background_size) {
            (Some(f), _) => BackgroundSizeMode::Custom(f),
            (None, SizeStyle::Auto) => BackgroundSizeMode::Auto,
            (None, SizeStyle::Normal) => BackgroundSizeMode::Normal,
        };
        let position_mode = match (self.position, config.style.background_position) {
            (Some(f), _) => BackgroundPositionMode::Custom(f),
            (None, PositionStyle::Pixel) => BackgroundPositionMode::Pixel,
            (None, PositionStyle::Normal) => BackgroundPositionMode::Normal,
            (None, PositionStyle::Percent) => BackgroundPositionMode::Percent,
        };
        let mut registry = PropertyRegistry::with_modes(image_mode, size_mode, position_mode);
        for (name, generator) in self.generators {
            registry.register(name, generator)?;
        }

        // Reserved alias names are reported by validate()
        for (alias, properties) in &config.alias {
            if let Some(unknown) = properties.iter().find(|p| !registry.contains(p)) {
                return Err(ConfigError::UnknownProperty {
                    alias: alias.clone(),
                    property: unknown.clone(),
                });
            }
        }

        let include = predicate(self.include, &config.filter.include)?;
        let exclude = predicate(self.exclude, &config.filter.exclude)?;
        let url_filter = predicate(self.url_filter, &config.filter.url)?;

        let templates = PathTemplates {
            output: self
                .output
                .unwrap_or_else(|| PathTemplate::Pattern(config.paths.output.clone())),
            public: self.public.or_else(|| {
                config.paths.public.clone().filter(|p| !p.is_empty()).map(PathTemplate::Pattern)
            }),
            public_base: config.paths.public_base,
            hash_length: config.hash_length,
        };

        let compressor: Option<Arc<dyn Compressor>> = match self.compressor {
            Some(custom) => Some(custom),
            None if config.compress.enabled => {
                Some(Arc::new(QuantizeCompressor::new(config.compress.max_colors)))
            }
            None => None,
        };

        Ok(SpriteOptions {
            resolver: PathResolver::new(&cwd, &config.paths.include),
            cwd,
            templates,
            retina: config.retina.mode,
            registry,
            aliases: config.alias,
            include,
            exclude,
            url_filter,
            development: config.development,
            packer: self.packer.unwrap_or_else(|| {
                Arc::new(AtlasPacker::new(AtlasConfig {
                    layout: config.packing.algorithm,
                    padding: config.packing.padding,
                }))
            }),
            resizer: self
                .resizer
                .unwrap_or_else(|| Arc::new(ImageResizer::new(config.resize.filter))),
            compression: compressor.map(|compressor| Compression {
                compressor,
                on_failure: config.compress.on_failure,
            }),
            writer: self.writer.unwrap_or_else(|| Arc::new(FsWriter)),
        })
    }
}

/// A programmatic predicate wins over the config value
fn predicate(
    custom: Option<Predicate>,
    value: &Option<String>,
) -> Result<Option<Predicate>, ConfigError> {
    match custom {
        Some(predicate) => Ok(Some(predicate)),
        None => value.as_deref().map(Predicate::parse).transpose(),
    }
}
