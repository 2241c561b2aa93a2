//! Shared plumbing for the pluggable pipeline stages (packer, resizer, compressor, writer)
//!
//! Every stage is an object-safe trait returning a boxed future, so implementations can be
//! swapped at runtime through [`crate::config::SpriteOptions`].

use futures_util::future::BoxFuture;
use std::io::Cursor;

/// Failure reported by a stage implementation
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    /// A blocking task panicked or was cancelled
    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("{0}")]
    Message(String),
}

/// Run CPU-bound work on the blocking thread pool.
pub(crate) fn blocking<T, F>(work: F) -> BoxFuture<'static, Result<T, StageError>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StageError> + Send + 'static,
{
    Box::pin(async move { tokio::task::spawn_blocking(work).await? })
}

/// Encode an RGBA image as PNG bytes
pub(crate) fn encode_png(image: &image::RgbaImage) -> Result<Vec<u8>, StageError> {
    let mut cursor = Cursor::new(Vec::new());
    image.write_to(&mut cursor, image::ImageOutputFormat::Png)?;
    Ok(cursor.into_inner())
}

/// Decode PNG (or any supported format) bytes into RGBA
pub(crate) fn decode_rgba(buffer: &[u8]) -> Result<image::RgbaImage, StageError> {
    Ok(image::load_from_memory(buffer)?.to_rgba8())
}
