//! Optional compression pass over the composed sheet buffers.

use crate::compose::SpriteSheet;
use crate::quantize::quantize_image;
use crate::stage::{blocking, decode_rgba, encode_png, StageError};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// Shrinks an encoded sheet.
///
/// Returns `Ok(None)` when the implementation chose to leave the buffer alone.
pub trait Compressor: Send + Sync {
    fn compress(&self, buffer: Vec<u8>) -> BoxFuture<'static, Result<Option<Vec<u8>>, StageError>>;
}

/// What to do when the compressor reports a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort the stylesheet run
    #[default]
    Fail,
    /// Log a warning and keep the uncompressed buffer
    KeepOriginal,
}

/// Lossy palette compressor: median-cut quantization followed by PNG re-encoding
#[derive(Debug, Clone, Copy)]
pub struct QuantizeCompressor {
    max_colors: usize,
}

/// Default palette size, matching 8-bit indexed PNG
pub const DEFAULT_MAX_COLORS: usize = 256;

impl QuantizeCompressor {
    pub fn new(max_colors: usize) -> Self {
        Self { max_colors: max_colors.max(2) }
    }
}

impl Default for QuantizeCompressor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_COLORS)
    }
}

impl Compressor for QuantizeCompressor {
    fn compress(&self, buffer: Vec<u8>) -> BoxFuture<'static, Result<Option<Vec<u8>>, StageError>> {
        let max_colors = self.max_colors;
        blocking(move || {
            let image = decode_rgba(&buffer)?;
            let quantized = quantize_image(&image, max_colors);
            encode_png(&quantized).map(Some)
        })
    }
}

/// Compression stage settings
#[derive(Clone)]
pub struct Compression {
    pub compressor: std::sync::Arc<dyn Compressor>,
    pub on_failure: FailurePolicy,
}

impl std::fmt::Debug for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compression").field("on_failure", &self.on_failure).finish_non_exhaustive()
    }
}

/// Compress the origin and (if present) normal buffers concurrently.
///
/// A buffer is only replaced by a strictly smaller result. Under [`FailurePolicy::Fail`]
/// any failure aborts and leaves the sheet untouched.
pub async fn compress_sheet(
    compression: &Compression,
    sheet: &mut SpriteSheet,
) -> Result<(), StageError> {
    let compressor = compression.compressor.as_ref();
    let normal = sheet.normal.clone();
    let (origin_result, normal_result) = tokio::join!(
        compressor.compress(sheet.origin.clone()),
        async {
            match normal {
                Some(buffer) => Some(compressor.compress(buffer).await),
                None => None,
            }
        }
    );

    let origin = settle(origin_result, compression.on_failure, "origin")?;
    let normal = match normal_result {
        Some(result) => settle(result, compression.on_failure, "normal")?,
        None => None,
    };

    if let Some(buffer) = origin {
        replace_if_smaller(&mut sheet.origin, buffer);
    }
    if let (Some(current), Some(buffer)) = (sheet.normal.as_mut(), normal) {
        replace_if_smaller(current, buffer);
    }
    Ok(())
}

fn settle(
    result: Result<Option<Vec<u8>>, StageError>,
    policy: FailurePolicy,
    which: &str,
) -> Result<Option<Vec<u8>>, StageError> {
    match (result, policy) {
        (Ok(buffer), _) => Ok(buffer),
        (Err(err), FailurePolicy::Fail) => Err(err),
        (Err(err), FailurePolicy::KeepOriginal) => {
            log::warn!("compression of {} sheet failed, keeping original: {}", which, err);
            Ok(None)
        }
    }
}

fn replace_if_smaller(current: &mut Vec<u8>, candidate: Vec<u8>) {
    if !candidate.is_empty() && candidate.len() < current.len() {
        *current = candidate;
    }
}
