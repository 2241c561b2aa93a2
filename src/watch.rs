//! Live invalidation for [`ImageSizeCache`]
//!
//! Watches image directories with a debounced watcher and keeps cached dimensions fresh:
//! changed files are re-queried, deleted or renamed files are evicted. Entirely separate
//! from the sprite pipeline.

use crate::size::ImageSizeCache;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEvent, Debouncer};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default quiet period before a burst of events is delivered
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Error while setting up a watcher
#[derive(Debug)]
pub enum WatchError {
    /// Failed to initialize file watcher
    WatcherInit(notify::Error),
    /// Failed to add watch path
    WatchPath(notify::Error),
    /// Watched directory not found
    SourceNotFound(PathBuf),
}

impl std::fmt::Display for WatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchError::WatcherInit(e) => write!(f, "Failed to initialize file watcher: {}", e),
            WatchError::WatchPath(e) => write!(f, "Failed to watch path: {}", e),
            WatchError::SourceNotFound(path) => {
                write!(f, "Watched directory not found: {}", path.display())
            }
        }
    }
}

impl std::error::Error for WatchError {}

/// Keeps an [`ImageSizeCache`] in sync with the filesystem while alive.
///
/// Dropping the watcher stops watching.
pub struct SizeWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    dirs: Vec<PathBuf>,
}

impl std::fmt::Debug for SizeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SizeWatcher").field("dirs", &self.dirs).finish_non_exhaustive()
    }
}

impl SizeWatcher {
    /// Watch `dirs` recursively on behalf of `cache`.
    pub fn start(
        cache: ImageSizeCache,
        dirs: &[PathBuf],
        debounce: Duration,
    ) -> Result<Self, WatchError> {
        if let Some(missing) = dirs.iter().find(|d| !d.is_dir()) {
            return Err(WatchError::SourceNotFound(missing.clone()));
        }

        let handler = move |result: DebounceEventResult| match result {
            Ok(events) => {
                let changed = apply_events(&cache, &events);
                if changed > 0 {
                    log::debug!("refreshed {} cached image sizes", changed);
                }
            }
            // Non-fatal, keep watching
            Err(error) => log::warn!("watch error: {:?}", error),
        };
        let mut debouncer = new_debouncer(debounce, handler).map_err(WatchError::WatcherInit)?;

        for dir in dirs {
            debouncer
                .watcher()
                .watch(dir, RecursiveMode::Recursive)
                .map_err(WatchError::WatchPath)?;
        }

        Ok(Self { _debouncer: debouncer, dirs: dirs.to_vec() })
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }
}

/// Apply one debounced batch to the cache. Returns the number of entries changed.
fn apply_events(cache: &ImageSizeCache, events: &[DebouncedEvent]) -> usize {
    refresh_paths(cache, events.iter().map(|e| e.path.as_path()))
}

fn refresh_paths<'a>(cache: &ImageSizeCache, paths: impl Iterator<Item = &'a Path>) -> usize {
    paths.filter(|path| is_image(path)).filter(|path| cache.refresh(path)).count()
}

/// Check if a file is relevant for the size cache
fn is_image(path: &Path) -> bool {
    crate::resolve::has_image_extension(&path.to_string_lossy())
}
