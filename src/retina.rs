//! High-density (retina) handling: even-size validation and derivation of the
//! half-resolution normal sheet.

use crate::compose::{Composition, PackedCoordinate};
use crate::stage::{blocking, decode_rgba, encode_png, StageError};
use futures_util::future::BoxFuture;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Density mode for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RetinaMode {
    /// Single density: the packed sheet is written as-is
    #[default]
    Off,
    /// Write a `@2x` sheet plus a half-size normal sheet
    On,
    /// Like `On`, but every generated value targets the normal sheet
    ForceNormal,
}

impl RetinaMode {
    pub fn is_enabled(self) -> bool {
        !matches!(self, RetinaMode::Off)
    }
}

/// Resizes an encoded image to exact dimensions.
pub trait Resizer: Send + Sync {
    fn resize(
        &self,
        buffer: Vec<u8>,
        width: u32,
        height: u32,
    ) -> BoxFuture<'static, Result<Vec<u8>, StageError>>;
}

/// Resample filter for the built-in resizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    #[default]
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Resizer backed by `image::imageops::resize`
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageResizer {
    filter: ResizeFilter,
}

impl ImageResizer {
    pub fn new(filter: ResizeFilter) -> Self {
        Self { filter }
    }
}

impl Resizer for ImageResizer {
    fn resize(
        &self,
        buffer: Vec<u8>,
        width: u32,
        height: u32,
    ) -> BoxFuture<'static, Result<Vec<u8>, StageError>> {
        let filter = FilterType::from(self.filter);
        blocking(move || {
            let image = decode_rgba(&buffer)?;
            let resized = image::imageops::resize(&image, width, height, filter);
            encode_png(&resized)
        })
    }
}

/// Failures of the high-density checks
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RetinaError {
    /// Elements whose width or height is odd, in element order
    #[error("Odd images detected. Check:\n{}", format_file_list(.0))]
    OddSize(Vec<PathBuf>),
    /// The packed sheet itself cannot be halved exactly
    #[error("sprite sheet is {width}x{height}; high-density sheets need even dimensions")]
    OddSheet { width: u32, height: u32 },
    #[error("failed to derive normal-density sheet: {0}")]
    Resize(#[source] StageError),
}

pub(crate) fn format_file_list(files: &[PathBuf]) -> String {
    files
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{}. {}", i + 1, crate::resolve::slash(f)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Check that every element has even dimensions.
///
/// All offenders are collected, in `order`, so they can be fixed in one pass.
pub fn validate_even(
    coordinates: &HashMap<PathBuf, PackedCoordinate>,
    order: &[PathBuf],
) -> Result<(), RetinaError> {
    let odd: Vec<PathBuf> = order
        .iter()
        .filter(|path| {
            coordinates.get(*path).is_some_and(|c| c.width % 2 == 1 || c.height % 2 == 1)
        })
        .cloned()
        .collect();

    if odd.is_empty() {
        Ok(())
    } else {
        Err(RetinaError::OddSize(odd))
    }
}

/// Validate and derive the normal sheet in place.
pub async fn apply(
    resizer: &dyn Resizer,
    composition: &mut Composition,
    order: &[PathBuf],
) -> Result<(), RetinaError> {
    validate_even(&composition.coordinates, order)?;

    let sheet = &mut composition.sheet;
    if sheet.width % 2 == 1 || sheet.height % 2 == 1 {
        return Err(RetinaError::OddSheet { width: sheet.width, height: sheet.height });
    }

    let normal = resizer
        .resize(sheet.origin.clone(), sheet.width / 2, sheet.height / 2)
        .await
        .map_err(RetinaError::Resize)?;
    sheet.normal = Some(normal);
    Ok(())
}
