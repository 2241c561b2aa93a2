//! Output and public path templates for sprite sheets
//!
//! Templates understand `[dir]` (alias `[path]`), `[name]`, `[contenthash]` and
//! `[contenthash:N]`. Anything else in brackets is left alone.

use crate::resolve::{normalize, relative, slash, HIGH_DENSITY_MARKER};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Default number of hex characters used for `[contenthash]`
pub const DEFAULT_HASH_LENGTH: usize = 20;

/// Extension every sheet path must carry
pub const SHEET_EXTENSION: &str = ".png";

/// Default output template, relative to the working directory
pub const DEFAULT_OUTPUT_TEMPLATE: &str = "sprites/[dir]/[name].png";

/// Errors raised while turning templates into concrete paths
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TemplateError {
    /// A resolved path does not name a PNG file
    #[error("sprite sheets must be PNG files, got '{path}'")]
    Format { path: String },
    /// No public path could be derived for the sheet
    #[error("unable to resolve a public path for '{output}'")]
    PublicPath { output: String },
    /// An output template function produced nothing
    #[error("output path function returned no path")]
    EmptyOutput,
}

/// Values available to templates and template functions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMeta {
    /// Directory of the stylesheet relative to the working directory
    pub dir: String,
    /// Stylesheet file name up to its first dot
    pub name: String,
    /// Full hex digest of the final high-density buffer
    pub content_hash: String,
    /// Stylesheet path, when the stylesheet came from a file
    pub input: Option<PathBuf>,
    /// Resolved output path; only set when resolving the public path
    pub output: Option<String>,
}

impl TemplateMeta {
    pub fn new(cwd: &Path, input: Option<&Path>, content_hash: impl Into<String>) -> Self {
        let input = input.map(|i| normalize(&cwd.join(i)));
        let (dir, name) = match &input {
            Some(path) => {
                let dir = path.parent().map(|p| slash(&relative(cwd, p))).unwrap_or_default();
                let file = path.file_name().map(|f| f.to_string_lossy().into_owned());
                let name = file
                    .as_deref()
                    .and_then(|f| f.split('.').next())
                    .filter(|n| !n.is_empty())
                    .unwrap_or("sprite")
                    .to_string();
                (dir, name)
            }
            None => (String::new(), "sprite".to_string()),
        };
        Self { dir, name, content_hash: content_hash.into(), input, output: None }
    }
}

/// User function producing a template (or a finished path) from metadata.
///
/// Returning `None` or an empty string falls back to the default where one exists.
pub type TemplateFn = Arc<dyn Fn(&TemplateMeta) -> Option<String> + Send + Sync>;

/// A path template: a placeholder string or a function
#[derive(Clone)]
pub enum PathTemplate {
    Pattern(String),
    Function(TemplateFn),
}

impl std::fmt::Debug for PathTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathTemplate::Pattern(p) => f.debug_tuple("Pattern").field(p).finish(),
            PathTemplate::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl From<&str> for PathTemplate {
    fn from(pattern: &str) -> Self {
        PathTemplate::Pattern(pattern.to_string())
    }
}

impl PathTemplate {
    fn render(&self, meta: &TemplateMeta) -> Option<String> {
        match self {
            PathTemplate::Pattern(pattern) => Some(pattern.clone()),
            PathTemplate::Function(f) => f(meta),
        }
        .filter(|s| !s.is_empty())
    }
}

/// Directory the default public path is computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PublicBase {
    /// Relative to the working directory
    #[default]
    Cwd,
    /// Relative to the directory of the stylesheet being processed
    Stylesheet,
}

/// Output location and stylesheet-facing URL of one sheet density
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DensityPaths {
    pub output: PathBuf,
    pub public: String,
}

/// Where the sheets of one run go
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputTargets {
    pub normal: DensityPaths,
    /// Present only in high-density mode
    pub retina: Option<DensityPaths>,
}

/// The path settings of a run
#[derive(Debug, Clone)]
pub struct PathTemplates {
    pub output: PathTemplate,
    pub public: Option<PathTemplate>,
    pub public_base: PublicBase,
    pub hash_length: usize,
}

impl Default for PathTemplates {
    fn default() -> Self {
        Self {
            output: PathTemplate::from(DEFAULT_OUTPUT_TEMPLATE),
            public: None,
            public_base: PublicBase::default(),
            hash_length: DEFAULT_HASH_LENGTH,
        }
    }
}

impl PathTemplates {
    /// Resolve the output path against `cwd`.
    pub fn resolve_output(
        &self,
        cwd: &Path,
        meta: &TemplateMeta,
    ) -> Result<PathBuf, TemplateError> {
        let template = self.output.render(meta).ok_or(TemplateError::EmptyOutput)?;
        let expanded = expand(&template.replace('\\', "/"), meta, self.hash_length);
        let path = normalize(&cwd.join(expanded));
        ensure_png(&slash(&path))?;
        Ok(path)
    }

    /// Resolve the public path for an already resolved output path.
    pub fn resolve_public(
        &self,
        cwd: &Path,
        meta: &TemplateMeta,
        output: &Path,
    ) -> Result<String, TemplateError> {
        let meta = TemplateMeta { output: Some(slash(output)), ..meta.clone() };
        let template = match self.public.as_ref().and_then(|t| t.render(&meta)) {
            Some(template) => template,
            None => self.default_public(cwd, &meta, output)?,
        };
        let public = expand(&template.replace('\\', "/"), &meta, self.hash_length);
        ensure_png(&public)?;
        Ok(public)
    }

    fn default_public(
        &self,
        cwd: &Path,
        meta: &TemplateMeta,
        output: &Path,
    ) -> Result<String, TemplateError> {
        let base = match self.public_base {
            PublicBase::Cwd => Some(cwd.to_path_buf()),
            PublicBase::Stylesheet => {
                meta.input.as_deref().and_then(Path::parent).map(Path::to_path_buf)
            }
        };
        base.map(|dir| slash(&relative(&dir, output)))
            .filter(|p| !p.is_empty())
            .ok_or_else(|| TemplateError::PublicPath { output: slash(output) })
    }

    /// Resolve both densities. The retina pair is always derived from the normal pair.
    pub fn resolve(
        &self,
        cwd: &Path,
        meta: &TemplateMeta,
        retina: bool,
    ) -> Result<OutputTargets, TemplateError> {
        let output = self.resolve_output(cwd, meta)?;
        let public = self.resolve_public(cwd, meta, &output)?;

        let retina = retina.then(|| DensityPaths {
            output: PathBuf::from(retina_variant(&slash(&output))),
            public: retina_variant(&public),
        });
        Ok(OutputTargets { normal: DensityPaths { output, public }, retina })
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[(dir|path|name|contenthash(?::(\d+))?)\]").expect("placeholder regex is valid")
    })
}

/// Substitute placeholders in a template.
pub fn expand(template: &str, meta: &TemplateMeta, hash_length: usize) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &regex::Captures| match &caps[1] {
            "dir" | "path" => meta.dir.clone(),
            "name" => meta.name.clone(),
            _ => {
                let length = caps
                    .get(2)
                    .and_then(|n| n.as_str().parse::<usize>().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(hash_length);
                meta.content_hash.chars().take(length).collect()
            }
        })
        .into_owned()
}

/// Hex sha-256 digest of a buffer
pub fn content_hash(buffer: &[u8]) -> String {
    Sha256::digest(buffer).iter().map(|b| format!("{:02x}", b)).collect()
}

/// `sprites/app.png` -> `sprites/app@2x.png`
pub fn retina_variant(path: &str) -> String {
    match strip_png(path) {
        Some(stem) => format!("{}{}{}", stem, HIGH_DENSITY_MARKER, SHEET_EXTENSION),
        None => path.to_string(),
    }
}

fn strip_png(path: &str) -> Option<&str> {
    let split = path.len().checked_sub(SHEET_EXTENSION.len())?;
    if path.is_char_boundary(split) && path[split..].eq_ignore_ascii_case(SHEET_EXTENSION) {
        Some(&path[..split])
    } else {
        None
    }
}

fn ensure_png(path: &str) -> Result<(), TemplateError> {
    match strip_png(path) {
        Some(_) => Ok(()),
        None => Err(TemplateError::Format { path: path.to_string() }),
    }
}
