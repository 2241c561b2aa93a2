//! Best-effort image dimension queries
//!
//! [`ImageSizeCache`] answers "how big is this element" without composing anything. Failures
//! are not errors: an unreadable or missing image simply has no size. Entries are keyed by
//! absolute path, so one cache can be shared across runs and kept fresh by a
//! [`crate::watch::SizeWatcher`].

use crate::resolve::{normalize, PathResolver};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Pixel size of an image file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Read the dimensions from the image header, or `None` on any failure.
pub fn query(path: &Path) -> Option<Dimensions> {
    match image::image_dimensions(path) {
        Ok((width, height)) => Some(Dimensions { width, height }),
        Err(err) => {
            log::debug!("no dimensions for {}: {}", path.display(), err);
            None
        }
    }
}

/// Shared, read-mostly cache of image dimensions
#[derive(Debug, Clone)]
pub struct ImageSizeCache {
    resolver: PathResolver,
    entries: Arc<RwLock<HashMap<PathBuf, Dimensions>>>,
}

impl ImageSizeCache {
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver, entries: Arc::default() }
    }

    /// Dimensions of the file an element reference resolves to
    pub fn size_of(&self, reference: &str) -> Option<Dimensions> {
        let path = self.resolver.resolve(reference)?;
        if let Some(found) = self.get(&path) {
            return Some(found);
        }

        let dimensions = query(&path)?;
        self.write().insert(path, dimensions);
        Some(dimensions)
    }

    /// Cached dimensions for an absolute path
    pub fn get(&self, path: &Path) -> Option<Dimensions> {
        self.read().get(&normalize(path)).copied()
    }

    /// Re-read a cached file after it changed, dropping it when it is gone or unreadable.
    ///
    /// Paths that were never cached are ignored. Returns whether the cache changed.
    pub fn refresh(&self, path: &Path) -> bool {
        let path = normalize(path);
        if !self.read().contains_key(&path) {
            return false;
        }

        match query(&path) {
            Some(dimensions) => self.write().insert(path, dimensions) != Some(dimensions),
            None => self.evict(&path),
        }
    }

    /// Drop one entry. Returns whether it was present.
    pub fn evict(&self, path: &Path) -> bool {
        self.write().remove(&normalize(path)).is_some()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<PathBuf, Dimensions>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<PathBuf, Dimensions>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
