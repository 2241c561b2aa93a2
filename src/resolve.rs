//! Sprite element path resolution
//!
//! Turns an element reference such as `icons/home` into an absolute image path, preferring
//! the high-density (`@2x`) variant when one exists.

use std::path::{Component, Path, PathBuf};

/// Marker inserted before the extension of a high-density image
pub const HIGH_DENSITY_MARKER: &str = "@2x";

/// Extension appended to references that do not name an image file
pub const DEFAULT_EXTENSION: &str = "png";

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

/// Resolves element references against the stylesheet, include directories and working
/// directory, in that order.
#[derive(Debug, Clone)]
pub struct PathResolver {
    cwd: PathBuf,
    include: Vec<PathBuf>,
    stylesheet_dir: Option<PathBuf>,
    extension: String,
}

impl PathResolver {
    /// Create a resolver. Relative include directories are taken relative to `cwd`.
    pub fn new(cwd: impl Into<PathBuf>, include: &[PathBuf]) -> Self {
        let cwd = cwd.into();
        let include = include.iter().map(|dir| normalize(&cwd.join(dir))).collect();
        Self { cwd, include, stylesheet_dir: None, extension: DEFAULT_EXTENSION.to_string() }
    }

    /// Use a different default extension for bare references
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    /// A copy of this resolver that also looks next to the given stylesheet.
    ///
    /// The stylesheet directory is only consulted when `source` is an existing file.
    pub fn for_stylesheet(&self, source: Option<&Path>) -> Self {
        let stylesheet_dir = source
            .map(|s| normalize(&self.cwd.join(s)))
            .filter(|s| s.is_file())
            .and_then(|s| s.parent().map(Path::to_path_buf));
        Self { stylesheet_dir, ..self.clone() }
    }

    /// Resolve a reference to an absolute path, or `None` if no candidate exists.
    pub fn resolve(&self, reference: &str) -> Option<PathBuf> {
        let item = if has_image_extension(reference) {
            reference.to_string()
        } else {
            format!("{}.{}", reference, self.extension)
        };

        if item.contains(HIGH_DENSITY_MARKER) {
            return self.lookup(&item);
        }

        self.lookup(&high_density_name(&item)).or_else(|| self.lookup(&item))
    }

    fn lookup(&self, item: &str) -> Option<PathBuf> {
        let candidates = self
            .stylesheet_dir
            .iter()
            .chain(self.include.iter())
            .chain(std::iter::once(&self.cwd));

        candidates.map(|dir| normalize(&dir.join(item))).find(|candidate| candidate.is_file())
    }
}

/// Whether the reference already names an image file
pub fn has_image_extension(reference: &str) -> bool {
    Path::new(reference)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// `icon.png` -> `icon@2x.png`
pub fn high_density_name(item: &str) -> String {
    match item.rfind('.') {
        Some(dot) if !item[dot..].contains('/') => {
            format!("{}{}{}", &item[..dot], HIGH_DENSITY_MARKER, &item[dot..])
        }
        _ => format!("{}{}", item, HIGH_DENSITY_MARKER),
    }
}

/// Lexically normalize a path: drop `.` and fold `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Relative path from directory `from` to `to`, both absolute and normalized.
pub fn relative(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<_> = from.components().collect();
    let to: Vec<_> = to.components().collect();
    let common = from.iter().zip(to.iter()).take_while(|(a, b)| a == b).count();

    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for component in &to[common..] {
        out.push(component.as_os_str());
    }
    out
}

/// Convert a path to a forward-slash string
pub fn slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("should create parent");
        }
        fs::write(&path, b"").expect("should write file");
        path
    }

    #[test]
    fn test_prefers_high_density_variant() {
        let temp = TempDir::new().expect("should create temp dir");
        touch(temp.path(), "icon.png");
        let retina = touch(temp.path(), "icon@2x.png");

        let resolver = PathResolver::new(temp.path(), &[]);
        assert_eq!(resolver.resolve("icon"), Some(retina));
    }

    #[test]
    fn test_falls_back_to_plain_name() {
        let temp = TempDir::new().expect("should create temp dir");
        let plain = touch(temp.path(), "icon.png");

        let resolver = PathResolver::new(temp.path(), &[]);
        assert_eq!(resolver.resolve("icon"), Some(plain.clone()));
        assert_eq!(resolver.resolve("icon.png"), Some(plain));
    }

    #[test]
    fn test_explicit_marker_is_looked_up_directly() {
        let temp = TempDir::new().expect("should create temp dir");
        touch(temp.path(), "icon.png");

        let resolver = PathResolver::new(temp.path(), &[]);
        assert_eq!(resolver.resolve("icon@2x"), None);
    }

    #[test]
    fn test_lookup_order_stylesheet_include_cwd() {
        let temp = TempDir::new().expect("should create temp dir");
        let css = touch(temp.path(), "css/site.css");
        let near_css = touch(temp.path(), "css/a.png");
        let in_include = touch(temp.path(), "assets/a.png");
        touch(temp.path(), "a.png");
        let only_in_include = touch(temp.path(), "assets/b.png");
        let only_in_cwd = touch(temp.path(), "c.png");

        let resolver = PathResolver::new(temp.path(), &[PathBuf::from("assets")]);
        assert_eq!(resolver.resolve("a"), Some(in_include));

        let scoped = resolver.for_stylesheet(Some(&css));
        assert_eq!(scoped.resolve("a"), Some(near_css));
        assert_eq!(scoped.resolve("b"), Some(only_in_include));
        assert_eq!(scoped.resolve("c"), Some(only_in_cwd));
        assert_eq!(scoped.resolve("missing"), None);
    }

    #[test]
    fn test_missing_stylesheet_is_ignored() {
        let temp = TempDir::new().expect("should create temp dir");
        let resolver = PathResolver::new(temp.path(), &[]);
        let scoped = resolver.for_stylesheet(Some(Path::new("nope/site.css")));
        assert!(scoped.stylesheet_dir.is_none());
    }

    #[test]
    fn test_custom_extension() {
        let temp = TempDir::new().expect("should create temp dir");
        let gif = touch(temp.path(), "dot.gif");
        let resolver = PathResolver::new(temp.path(), &[]).with_extension(".gif");
        assert_eq!(resolver.resolve("dot"), Some(gif));
    }

    #[test]
    fn test_high_density_name() {
        assert_eq!(high_density_name("a/b.png"), "a/b@2x.png");
        assert_eq!(high_density_name("v1.2/b"), "v1.2/b@2x");
    }

    #[test]
    fn test_normalize_and_relative() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(
            relative(Path::new("/proj"), Path::new("/proj/dist/sprite.png")),
            PathBuf::from("dist/sprite.png")
        );
        assert_eq!(
            relative(Path::new("/proj/css"), Path::new("/proj/dist/sprite.png")),
            PathBuf::from("../dist/sprite.png")
        );
    }
}
