//! Sheet output - writes encoded sheets to their resolved paths

use crate::stage::StageError;
use futures_util::future::{try_join_all, BoxFuture};
use std::path::PathBuf;

/// Persists one encoded sheet.
///
/// Implementations must create missing parent directories.
pub trait SheetWriter: Send + Sync {
    fn write(&self, path: PathBuf, buffer: Vec<u8>) -> BoxFuture<'static, Result<(), StageError>>;
}

/// Writer backed by `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct FsWriter;

impl SheetWriter for FsWriter {
    fn write(&self, path: PathBuf, buffer: Vec<u8>) -> BoxFuture<'static, Result<(), StageError>> {
        Box::pin(async move {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            tokio::fs::write(&path, buffer).await?;
            Ok(())
        })
    }
}

/// A sheet waiting to be written
#[derive(Debug, Clone)]
pub struct SheetFile {
    pub path: PathBuf,
    pub buffer: Vec<u8>,
}

/// Write every file concurrently; completes once all writes have finished.
///
/// Returns the written paths in input order.
pub async fn write_sheets(
    writer: &dyn SheetWriter,
    files: Vec<SheetFile>,
) -> Result<Vec<PathBuf>, StageError> {
    let paths: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
    try_join_all(files.into_iter().map(|f| writer.write(f.path, f.buffer))).await?;
    for path in &paths {
        log::info!("wrote sprite sheet {}", path.display());
    }
    Ok(paths)
}
