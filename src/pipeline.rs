//! The sprite engine - runs every stage for one stylesheet, in order:
//! scan, compose, retina, compress, hash and templates, rewrite, merge, write.
//!
//! A fatal error stops the stylesheet before anything is written. Runs over different
//! stylesheets share nothing but the read-only [`SpriteOptions`].

use crate::compose::{compose, Composition};
use crate::compress::compress_sheet;
use crate::config::SpriteOptions;
use crate::merge::{DeferredBackground, RuleMerger};
use crate::output::{write_sheets, SheetFile};
use crate::property::{BuiltinProperty, GeneratorContext};
use crate::resolve::{normalize, slash};
use crate::retina::{self, format_file_list, RetinaError, RetinaMode};
use crate::scan::{ScanResult, Scanner};
use crate::stage::StageError;
use crate::stylesheet::{parse, Location, NodeKind, ParseError, Stylesheet};
use crate::template::{content_hash, OutputTargets, TemplateError, TemplateMeta};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Fatal error for one stylesheet
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SpriteError {
    /// No file matches the element reference anywhere in the lookup chain
    #[error("sprite element '{reference}' not found{}", at(.location))]
    ElementNotFound { reference: String, location: Option<Location> },
    #[error("sprite declaration has no el(...) element{}", at(.location))]
    MissingElement { location: Option<Location> },
    #[error("unknown sprite property '{token}'{}", at(.location))]
    UnknownToken { token: String, location: Option<Location> },
    /// A `background` request whose declaration is not directly inside a rule
    #[error("sprite background needs an enclosing rule{}", at(.location))]
    OutsideRule { location: Option<Location> },
    /// Every element with an odd width or height
    #[error("Odd images detected. Check:\n{}", format_file_list(.files))]
    OddSize { files: Vec<PathBuf> },
    #[error("sprite sheet is {width}x{height}; high-density sheets need even dimensions")]
    OddSheet { width: u32, height: u32 },
    #[error("packing failed: {0}")]
    Pack(#[source] StageError),
    #[error("resizing failed: {0}")]
    Resize(#[source] StageError),
    #[error("compression failed: {0}")]
    Compress(#[source] StageError),
    #[error("writing sprite sheet failed: {0}")]
    Write(#[source] StageError),
    #[error("sprite sheets must be PNG files, got '{path}'")]
    Format { path: String },
    #[error("unable to resolve a public path for '{output}'")]
    PublicPath { output: String },
    #[error("output path function returned no path")]
    EmptyOutput,
    #[error("Failed to parse stylesheet: {0}")]
    Parse(#[from] ParseError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A stylesheet task panicked
    #[error("stylesheet task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

fn at(location: &Option<Location>) -> String {
    location.map(|l| format!(" at {}", l)).unwrap_or_default()
}

impl From<RetinaError> for SpriteError {
    fn from(err: RetinaError) -> Self {
        match err {
            RetinaError::OddSize(files) => SpriteError::OddSize { files },
            RetinaError::OddSheet { width, height } => SpriteError::OddSheet { width, height },
            RetinaError::Resize(err) => SpriteError::Resize(err),
        }
    }
}

impl From<TemplateError> for SpriteError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::Format { path } => SpriteError::Format { path },
            TemplateError::PublicPath { output } => SpriteError::PublicPath { output },
            TemplateError::EmptyOutput => SpriteError::EmptyOutput,
        }
    }
}

/// What one run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub input: Option<PathBuf>,
    /// Skipped by the development switch or the stylesheet filters
    pub skipped: bool,
    pub intents: usize,
    pub elements: usize,
    pub width: u32,
    pub height: u32,
    /// Sheet files written, high-density first
    pub written: Vec<PathBuf>,
    pub content_hash: Option<String>,
    pub merged_rules: usize,
}

/// Processed stylesheet text plus its report
#[derive(Debug, Clone, Serialize)]
pub struct Processed {
    pub css: String,
    pub report: RunReport,
}

/// Runs the sprite pipeline. Cheap to clone; clones share the options.
#[derive(Debug, Clone)]
pub struct SpriteEngine {
    options: Arc<SpriteOptions>,
}

impl SpriteEngine {
    pub fn new(options: SpriteOptions) -> Self {
        Self { options: Arc::new(options) }
    }

    pub fn options(&self) -> &SpriteOptions {
        &self.options
    }

    /// Process a parsed stylesheet in place.
    pub async fn process(&self, sheet: &mut Stylesheet) -> Result<RunReport, SpriteError> {
        let options = &*self.options;
        let input = sheet.source().map(|s| normalize(&options.cwd.join(s)));
        let mut report = RunReport { input: input.clone(), ..Default::default() };

        if options.development {
            log::debug!("development mode, skipping {}", display(input.as_deref()));
            report.skipped = true;
            return Ok(report);
        }
        if let Some(path) = &input {
            if !options.accepts(&slash(path)) {
                log::debug!("{} filtered out", path.display());
                report.skipped = true;
                return Ok(report);
            }
        }

        let resolver = options.resolver.for_stylesheet(input.as_deref());
        let scanner = Scanner::new(resolver, &options.registry, options.url_filter.as_ref());
        let rewritten = scanner.rewrite_aliases(sheet, &options.aliases)?;
        if rewritten > 0 {
            log::debug!("rewrote {} alias declarations", rewritten);
        }

        let scan = scanner.scan(sheet)?;
        report.intents = scan.intents.len();
        report.elements = scan.elements.len();
        if scan.is_empty() {
            return Ok(report);
        }

        log::debug!("packing {} elements", scan.elements.len());
        let mut composition =
            compose(options.packer.as_ref(), &scan.elements).await.map_err(SpriteError::Pack)?;
        report.width = composition.sheet.width;
        report.height = composition.sheet.height;

        let retina = options.retina.is_enabled();
        if retina {
            log::debug!("deriving normal-density sheet");
            retina::apply(options.resizer.as_ref(), &mut composition, &scan.elements).await?;
        }

        if let Some(compression) = &options.compression {
            log::debug!("compressing sprite sheet");
            compress_sheet(compression, &mut composition.sheet)
                .await
                .map_err(SpriteError::Compress)?;
        }

        let hash = content_hash(&composition.sheet.origin);
        let meta = TemplateMeta::new(&options.cwd, input.as_deref(), hash.clone());
        let targets = options.templates.resolve(&options.cwd, &meta, retina)?;
        report.content_hash = Some(hash);

        report.merged_rules =
            self.rewrite(sheet, &scan, &composition, &targets, input.as_deref())?;

        let files = sheet_files(composition, &targets);
        report.written =
            write_sheets(options.writer.as_ref(), files).await.map_err(SpriteError::Write)?;
        Ok(report)
    }

    /// Insert generated declarations and merge backgrounds. Returns the merged rule count.
    fn rewrite(
        &self,
        sheet: &mut Stylesheet,
        scan: &ScanResult,
        composition: &Composition,
        targets: &OutputTargets,
        input: Option<&Path>,
    ) -> Result<usize, SpriteError> {
        let registry = &self.options.registry;
        let force_normal = self.options.retina == RetinaMode::ForceNormal;
        let mut merger = RuleMerger::new();

        for intent in &scan.intents {
            let Some(coordinate) = composition.coordinates.get(&intent.path) else {
                continue;
            };
            let normal = intent.normal || force_normal;
            let ctx = GeneratorContext {
                coordinate,
                targets,
                element: &intent.element,
                path: &intent.path,
                normal,
                properties: &intent.properties,
                input,
            };

            let mut background = None;
            for name in &intent.properties {
                let Some(declarations) = registry.generate(name, &ctx) else {
                    continue;
                };
                if name == BuiltinProperty::Background.name() {
                    background = Some(declarations);
                    continue;
                }
                for decl in declarations {
                    let node = sheet.create_at(NodeKind::Decl(decl), intent.location);
                    sheet.insert_before(intent.node, node);
                }
            }

            match background {
                Some(declarations) => merger.defer(
                    sheet,
                    DeferredBackground { declarations, node: intent.node, normal },
                )?,
                None => sheet.remove(intent.node),
            }
        }

        let merged = merger.merge(sheet);
        log::debug!("merged backgrounds into {} rules", merged);
        Ok(merged)
    }

    /// Parse, process and serialize. A relative `source` is taken from the configured
    /// working directory.
    pub async fn process_css(
        &self,
        css: &str,
        source: Option<&Path>,
    ) -> Result<Processed, SpriteError> {
        let mut sheet = parse(css, source.map(Path::to_path_buf))?;
        let report = self.process(&mut sheet).await?;
        Ok(Processed { css: sheet.to_css(), report })
    }

    /// Read, process and serialize a stylesheet file.
    ///
    /// A relative `path` is taken from the process directory, the same way the file is
    /// read, not from the configured working directory.
    pub async fn process_file(&self, path: &Path) -> Result<Processed, SpriteError> {
        let css = tokio::fs::read_to_string(path).await?;
        let source = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        self.process_css(&css, Some(&normalize(&source))).await
    }

    /// Process several stylesheets concurrently. Results come back in input order.
    pub async fn process_files(
        &self,
        paths: Vec<PathBuf>,
    ) -> Vec<(PathBuf, Result<Processed, SpriteError>)> {
        let handles: Vec<_> = paths
            .iter()
            .cloned()
            .map(|path| {
                let engine = self.clone();
                tokio::spawn(async move { engine.process_file(&path).await })
            })
            .collect();

        let results = futures_util::future::join_all(handles).await;
        paths
            .into_iter()
            .zip(results)
            .map(|(path, joined)| (path, joined.map_err(SpriteError::from).and_then(|r| r)))
            .collect()
    }
}

/// High-density mode writes the origin to the `@2x` path and the derived buffer to the
/// normal path.
fn sheet_files(composition: Composition, targets: &OutputTargets) -> Vec<SheetFile> {
    let sheet = composition.sheet;
    match (&targets.retina, sheet.normal) {
        (Some(retina), Some(normal)) => vec![
            SheetFile { path: retina.output.clone(), buffer: sheet.origin },
            SheetFile { path: targets.normal.output.clone(), buffer: normal },
        ],
        _ => vec![SheetFile { path: targets.normal.output.clone(), buffer: sheet.origin }],
    }
}

fn display(input: Option<&Path>) -> String {
    input.map(slash).unwrap_or_else(|| "<inline stylesheet>".to_string())
}
