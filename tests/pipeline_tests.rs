//! End-to-end tests for the sprite pipeline
//!
//! Each test builds real PNG elements in a temp directory, runs a stylesheet through
//! [`SpriteEngine`] with the built-in packer, resizer and filesystem writer, and checks
//! both the rewritten CSS and the files on disk.

use futures_util::future::BoxFuture;
use image::{Rgba, RgbaImage};
use spritecss::atlas::Layout;
use spritecss::compress::{Compressor, FailurePolicy};
use spritecss::config::{PositionStyle, Predicate, SpriteConfig};
use spritecss::stage::StageError;
use spritecss::stylesheet::Location;
use spritecss::{RetinaMode, SpriteEngine, SpriteError, SpriteOptions, SpriteOptionsBuilder};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn png(dir: &Path, name: &str, width: u32, height: u32, color: [u8; 4]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    RgbaImage::from_pixel(width, height, Rgba(color)).save(&path).unwrap();
    path
}

const RED: [u8; 4] = [255, 0, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];

fn builder(temp: &TempDir) -> SpriteOptionsBuilder {
    SpriteOptions::builder().cwd(temp.path()).output("[name].png")
}

fn engine(builder: SpriteOptionsBuilder) -> SpriteEngine {
    SpriteEngine::new(builder.build().expect("options should build"))
}

/// Top-level entries of the temp dir other than the given element files
fn outputs(temp: &TempDir, elements: &[&str]) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(temp.path())
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| !elements.contains(&n.as_str()))
        .collect();
    names.sort();
    names
}

// ============================================================================
// Scenario A: high-density output
// ============================================================================

#[tokio::test]
async fn test_retina_writes_both_sheets_and_rewrites_background() {
    let temp = TempDir::new().unwrap();
    png(temp.path(), "a.png", 4, 4, RED);
    png(temp.path(), "b.png", 6, 2, BLUE);
    let engine = engine(builder(&temp).retina(RetinaMode::On));

    let css = ".a { sprite-prop: el(a) background; }\n.b { sprite-prop: el(b) background; }";
    let out = engine.process_css(css, None).await.expect("should process");

    assert_eq!(outputs(&temp, &["a.png", "b.png"]), vec!["sprite.png", "sprite@2x.png"]);
    let (width, height) = image::image_dimensions(temp.path().join("sprite@2x.png")).unwrap();
    assert_eq!((width, height), (out.report.width, out.report.height));
    assert_eq!(
        image::image_dimensions(temp.path().join("sprite.png")).unwrap(),
        (width / 2, height / 2)
    );

    assert!(out.css.starts_with(".a, .b {\n"));
    assert!(out.css.contains("  background-image: url(sprite@2x.png);\n"));
    assert!(out
        .css
        .contains("  background-image: -webkit-image-set(url(sprite.png) 1x, url(sprite@2x.png) 2x);\n"));
    assert!(out.css.contains("  background-repeat: no-repeat;\n"));
    assert!(out.css.contains(&format!("  background-size: {}px {}px;\n", width, height)));
    assert!(!out.css.contains("sprite-prop"));
}

#[tokio::test]
async fn test_retina_odd_element_fails_without_writing() {
    let temp = TempDir::new().unwrap();
    png(temp.path(), "a.png", 3, 4, RED);
    png(temp.path(), "b.png", 6, 2, BLUE);
    let engine = engine(builder(&temp).retina(RetinaMode::On));

    let css = ".a { sprite-prop: el(a) background; }\n.b { sprite-prop: el(b) background; }";
    let err = engine.process_css(css, None).await.unwrap_err();

    match &err {
        SpriteError::OddSize { files } => assert_eq!(files, &vec![temp.path().join("a.png")]),
        other => panic!("expected odd size error, got {:?}", other),
    }
    assert!(err.to_string().starts_with("Odd images detected. Check:\n1. "));
    assert!(outputs(&temp, &["a.png", "b.png"]).is_empty());
}

#[tokio::test]
async fn test_retina_variant_is_preferred() {
    let temp = TempDir::new().unwrap();
    png(temp.path(), "icon.png", 3, 3, RED);
    png(temp.path(), "icon@2x.png", 6, 6, RED);
    let engine = engine(builder(&temp).retina(RetinaMode::On));

    let out = engine
        .process_css(".i { sprite-prop: el(icon) width height normal; }", None)
        .await
        .expect("should process");
    assert!(out.css.contains("width: 3px;"));
    assert!(out.css.contains("height: 3px;"));
}

#[tokio::test]
async fn test_force_normal_halves_everything() {
    let temp = TempDir::new().unwrap();
    png(temp.path(), "a.png", 8, 4, RED);
    let engine = engine(builder(&temp).retina(RetinaMode::ForceNormal));

    let out = engine
        .process_css(".a { sprite-prop: el(a) width height background; }", None)
        .await
        .expect("should process");
    assert!(out.css.contains("width: 4px;"));
    assert!(out.css.contains("height: 2px;"));
    assert!(out.css.contains("background-image: url(sprite.png);"));
    assert!(out.css.contains("background-size: 4px 2px;"));
}

// ============================================================================
// Scenario B: background merging
// ============================================================================

#[tokio::test]
async fn test_shared_background_is_merged() {
    let temp = TempDir::new().unwrap();
    png(temp.path(), "icon.png", 4, 4, RED);
    let engine = engine(builder(&temp));

    let css = ".a { sprite-prop: el(icon) background; }\n.b { sprite-prop: el(icon) background; }";
    let out = engine.process_css(css, None).await.expect("should process");

    assert_eq!(out.report.merged_rules, 1);
    assert!(out.css.starts_with(
        ".a, .b {\n  background-image: url(sprite.png);\n  background-repeat: no-repeat;\n}\n"
    ));
    assert_eq!(out.css.matches("background-image").count(), 1);
    assert!(!out.css.contains("sprite-prop"));
}

#[tokio::test]
async fn test_media_blocks_merge_separately() {
    let temp = TempDir::new().unwrap();
    png(temp.path(), "icon.png", 4, 4, RED);
    let engine = engine(builder(&temp));

    let css = ".a { sprite-prop: el(icon) background; }\n\
               @media (min-width: 10px) {\n\
                 .b { sprite-prop: el(icon) background; }\n\
                 .c { sprite-prop: el(icon) background; }\n\
               }";
    let out = engine.process_css(css, None).await.expect("should process");

    assert_eq!(out.report.merged_rules, 2);
    assert!(out.css.starts_with(".a {\n  background-image: url(sprite.png);"));
    assert!(out.css.contains(
        "@media (min-width: 10px) {\n  .b, .c {\n    background-image: url(sprite.png);\n"
    ));
    let merged_media = out.css.find("@media").unwrap();
    let original_media = out.css.rfind("@media").unwrap();
    assert!(merged_media < original_media);
}

#[tokio::test]
async fn test_density_flag_splits_merge_groups() {
    let temp = TempDir::new().unwrap();
    png(temp.path(), "icon.png", 4, 4, RED);
    let engine = engine(builder(&temp).retina(RetinaMode::On));

    let css = ".a { sprite-prop: el(icon) background; }\n\
               .b { sprite-prop: el(icon) background normal; }";
    let out = engine.process_css(css, None).await.expect("should process");

    assert_eq!(out.report.merged_rules, 2);
    assert!(out.css.contains(".a {\n  background-image: url(sprite@2x.png);"));
    assert!(out.css.contains(".b {\n  background-image: url(sprite.png);"));
    assert!(out.css.contains("background-size: 2px 2px;"));
}

// ============================================================================
// Scenario C: unresolvable element
// ============================================================================

#[tokio::test]
async fn test_missing_element_fails_fast() {
    let temp = TempDir::new().unwrap();
    png(temp.path(), "a.png", 4, 4, RED);
    let engine = engine(builder(&temp));

    let css = ".a { sprite-prop: el(a) width; }\n.b {\n  sprite-prop: el(icons/ghost) width;\n}";
    match engine.process_css(css, None).await {
        Err(SpriteError::ElementNotFound { reference, location }) => {
            assert_eq!(reference, "icons/ghost");
            assert_eq!(location, Some(Location { line: 3, column: 3 }));
        }
        other => panic!("expected element not found, got {:?}", other.map(|p| p.css)),
    }
    assert!(outputs(&temp, &["a.png"]).is_empty());
}

// ============================================================================
// Scenario D: single density, explicit properties
// ============================================================================

#[tokio::test]
async fn test_single_density_native_sizes() {
    let temp = TempDir::new().unwrap();
    png(temp.path(), "a.png", 6, 4, RED);
    let engine = engine(builder(&temp));

    let out = engine
        .process_css(".a { sprite-prop: el(a) width height background-image; }", None)
        .await
        .expect("should process");

    assert_eq!(out.css, ".a {\n  width: 6px;\n  height: 4px;\n  background-image: url(sprite.png);\n}\n");
    assert_eq!(outputs(&temp, &["a.png"]), vec!["sprite.png"]);
    assert_eq!(out.report.written, vec![temp.path().join("sprite.png")]);
}

#[tokio::test]
async fn test_single_density_background_has_no_size() {
    let temp = TempDir::new().unwrap();
    png(temp.path(), "a.png", 6, 4, RED);
    let engine = engine(builder(&temp));

    let out = engine
        .process_css(".a { sprite-prop: el(a) background background-position; }", None)
        .await
        .expect("should process");
    assert!(!out.css.contains("background-size"));
    assert!(out.css.contains("background-position: 0 0;"));
}

#[tokio::test]
async fn test_percent_positions_through_engine() {
    let temp = TempDir::new().unwrap();
    png(temp.path(), "a.png", 4, 4, RED);
    png(temp.path(), "b.png", 4, 4, BLUE);
    let mut config = SpriteConfig::default();
    config.packing.algorithm = Layout::TopDown;
    let engine = engine(
        SpriteOptionsBuilder::from_config(config)
            .cwd(temp.path())
            .output("[name].png")
            .position_style(PositionStyle::Percent),
    );

    let css = ".a { sprite-prop: el(a) background-position; }\n\
               .b { sprite-prop: el(b) background-position; }";
    let out = engine.process_css(css, None).await.expect("should process");
    assert_eq!(
        out.css,
        ".a {\n  background-position: 0 0;\n}\n\n.b {\n  background-position: 0 100%;\n}\n"
    );
    assert_eq!((out.report.width, out.report.height), (4, 8));
}

#[tokio::test]
async fn test_background_outside_rule_fails() {
    let temp = TempDir::new().unwrap();
    png(temp.path(), "a.png", 4, 4, RED);
    let engine = engine(builder(&temp));

    let css = "@media print {\n  sprite-prop: el(a) background;\n}";
    match engine.process_css(css, None).await {
        Err(SpriteError::OutsideRule { location }) => {
            assert_eq!(location, Some(Location { line: 2, column: 3 }));
        }
        other => panic!("expected outside-rule error, got {:?}", other.map(|p| p.css)),
    }
    assert!(outputs(&temp, &["a.png"]).is_empty());
}

// ============================================================================
// Supplemented features
// ============================================================================

#[tokio::test]
async fn test_alias_expands_to_properties() {
    let temp = TempDir::new().unwrap();
    png(temp.path(), "a.png", 6, 4, RED);
    let engine = engine(builder(&temp).alias("box", &["width", "height"]));

    let out = engine
        .process_css(".a { color: red; sprite-box: el(a); }", None)
        .await
        .expect("should process");
    assert_eq!(out.css, ".a {\n  color: red;\n  width: 6px;\n  height: 4px;\n}\n");
}

#[tokio::test]
async fn test_url_filter_turns_backgrounds_into_sprites() {
    let temp = TempDir::new().unwrap();
    png(temp.path(), "img/sprites/logo.png", 4, 4, RED);
    png(temp.path(), "img/photo.png", 4, 4, BLUE);
    let engine = engine(builder(&temp).url_filter(Predicate::Substring("sprites/".to_string())));

    let css = ".logo { background: url(img/sprites/logo.png) no-repeat; }\n\
               .photo { background: url(img/photo.png); }";
    let out = engine.process_css(css, None).await.expect("should process");

    assert_eq!(out.report.intents, 1);
    assert!(out.css.contains("background-position: 0 0;"));
    assert!(out.css.contains("background-image: url(sprite.png);"));
    assert!(!out.css.contains("url(img/sprites/logo.png)"));
    assert!(out.css.contains("url(img/photo.png)"));
}

#[tokio::test]
async fn test_content_hash_tracks_sheet_bytes() {
    let temp = TempDir::new().unwrap();
    png(temp.path(), "a.png", 4, 4, RED);
    let engine = engine(
        SpriteOptions::builder().cwd(temp.path()).output("out/[name].[contenthash:8].png"),
    );
    let css = ".a { sprite-prop: el(a) background-image; }";

    let first = engine.process_css(css, None).await.expect("should process");
    let again = engine.process_css(css, None).await.expect("should process");
    assert_eq!(first.report.written, again.report.written);
    assert_eq!(first.css, again.css);

    png(temp.path(), "a.png", 4, 4, BLUE);
    let changed = engine.process_css(css, None).await.expect("should process");
    assert_ne!(first.report.written, changed.report.written);

    let hash = first.report.content_hash.unwrap();
    let expected = temp.path().join(format!("out/sprite.{}.png", &hash[..8]));
    assert_eq!(first.report.written, vec![expected]);
    assert!(first.css.contains(&format!("url(out/sprite.{}.png)", &hash[..8])));
}

#[tokio::test]
async fn test_stylesheet_name_and_dir_in_template() {
    let temp = TempDir::new().unwrap();
    png(temp.path(), "a.png", 4, 4, RED);
    std::fs::create_dir_all(temp.path().join("css")).unwrap();
    let stylesheet = temp.path().join("css/site.min.css");
    std::fs::write(&stylesheet, ".a { sprite-prop: el(a) width; }").unwrap();

    let engine =
        engine(SpriteOptions::builder().cwd(temp.path()).output("dist/[dir]/[name].png"));
    let out = engine.process_file(&stylesheet).await.expect("should process");
    assert_eq!(out.report.written, vec![temp.path().join("dist/css/site.png")]);
}

/// `target` spelled relative to the process directory
fn relative_to_process_dir(target: &Path) -> PathBuf {
    let here = std::env::current_dir().unwrap();
    let mut relative: PathBuf = here
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .map(|_| Component::ParentDir)
        .collect();
    relative.extend(target.components().filter(|c| matches!(c, Component::Normal(_))));
    relative
}

#[cfg(unix)]
#[tokio::test]
async fn test_relative_stylesheet_path_uses_process_dir() {
    let temp = TempDir::new().unwrap();
    let site = temp.path().join("site");
    png(&site, "css/a.png", 4, 4, RED);
    let stylesheet = site.join("css/site.css");
    std::fs::write(&stylesheet, ".a { sprite-prop: el(a) width; }").unwrap();

    // Working directory is the site root, not the process directory
    let engine = engine(SpriteOptions::builder().cwd(site.clone()).output("[dir]/[name].png"));
    let relative = relative_to_process_dir(&stylesheet);
    assert!(relative.is_relative());

    let out = engine.process_file(&relative).await.expect("should find a.png next to the css");
    assert_eq!(out.css, ".a {\n  width: 4px;\n}\n");
    assert_eq!(out.report.input, Some(stylesheet.clone()));
    assert_eq!(out.report.written, vec![site.join("css/site.png")]);
}

#[tokio::test]
async fn test_excluded_stylesheet_is_untouched() {
    let temp = TempDir::new().unwrap();
    let engine =
        engine(builder(&temp).exclude_stylesheets(Predicate::Substring("vendor/".to_string())));

    let css = ".a { sprite-prop: el(ghost) width; }";
    let out = engine
        .process_css(css, Some(Path::new("vendor/lib.css")))
        .await
        .expect("should skip");
    assert!(out.report.skipped);
    assert!(out.css.contains("sprite-prop: el(ghost) width;"));
}

struct FailingCompressor;

impl Compressor for FailingCompressor {
    fn compress(&self, _: Vec<u8>) -> BoxFuture<'static, Result<Option<Vec<u8>>, StageError>> {
        Box::pin(async { Err(StageError::Message("compressor crashed".to_string())) })
    }
}

#[tokio::test]
async fn test_compression_failure_is_fatal_by_default() {
    let temp = TempDir::new().unwrap();
    png(temp.path(), "a.png", 4, 4, RED);
    let engine = engine(builder(&temp).compressor(Arc::new(FailingCompressor)));

    let err = engine
        .process_css(".a { sprite-prop: el(a) width; }", None)
        .await
        .unwrap_err();
    assert!(matches!(err, SpriteError::Compress(_)));
    assert_eq!(err.to_string(), "compression failed: compressor crashed");
    assert!(outputs(&temp, &["a.png"]).is_empty());
}

#[tokio::test]
async fn test_compression_failure_can_keep_original() {
    let temp = TempDir::new().unwrap();
    png(temp.path(), "a.png", 4, 4, RED);
    let engine = engine(
        builder(&temp)
            .compressor(Arc::new(FailingCompressor))
            .on_compress_failure(FailurePolicy::KeepOriginal),
    );

    let out = engine
        .process_css(".a { sprite-prop: el(a) width; }", None)
        .await
        .expect("should keep original buffer");
    assert_eq!(outputs(&temp, &["a.png"]), vec!["sprite.png"]);
    assert!(out.css.contains("width: 4px;"));
}

#[tokio::test]
async fn test_builtin_compression_keeps_pixels() {
    let temp = TempDir::new().unwrap();
    png(temp.path(), "a.png", 4, 4, RED);
    png(temp.path(), "b.png", 4, 4, BLUE);
    let engine = engine(builder(&temp).compress(true));

    engine
        .process_css(
            ".a { sprite-prop: el(a) width; }\n.b { sprite-prop: el(b) width; }",
            None,
        )
        .await
        .expect("should process");

    let sheet = image::open(temp.path().join("sprite.png")).unwrap().to_rgba8();
    let colors: std::collections::HashSet<[u8; 4]> = sheet.pixels().map(|p| p.0).collect();
    assert!(colors.contains(&RED));
    assert!(colors.contains(&BLUE));
}

#[tokio::test]
async fn test_process_files_keeps_input_order() {
    let temp = TempDir::new().unwrap();
    png(temp.path(), "a.png", 4, 4, RED);
    let one = temp.path().join("one.css");
    let two = temp.path().join("two.css");
    std::fs::write(&one, ".a { sprite-prop: el(a) width; }").unwrap();
    std::fs::write(&two, ".b { sprite-prop: el(missing) width; }").unwrap();

    let engine = engine(builder(&temp));
    let results = engine.process_files(vec![one.clone(), two.clone()]).await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, one);
    assert!(results[0].1.is_ok());
    assert_eq!(results[1].0, two);
    assert!(matches!(results[1].1, Err(SpriteError::ElementNotFound { .. })));
    assert!(temp.path().join("one.png").exists());
    assert!(!temp.path().join("two.png").exists());
}
