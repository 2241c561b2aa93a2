//! Built-in packer - lays sprite element files out on a transparent sheet
//!
//! Implements shelf bin packing (the default) plus simple top-down and left-right strips.

use crate::compose::{PackedBox, PackedSheet, Packer};
use crate::stage::{blocking, encode_png, StageError};
use futures_util::future::BoxFuture;
use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// How elements are arranged on the sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    /// Rows of elements sorted tallest first
    #[default]
    Shelf,
    /// One column, in input order
    TopDown,
    /// One row, in input order
    LeftRight,
}

/// Configuration for the built-in packer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AtlasConfig {
    pub layout: Layout,
    /// Padding between elements in pixels
    pub padding: u32,
}

/// A shelf in the shelf packing algorithm
#[derive(Debug)]
struct Shelf {
    y: u32,
    height: u32,
    width_used: u32,
}

/// Transparent color for the sheet background
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Packer that decodes files with `image` and composes them in memory.
#[derive(Debug, Clone, Default)]
pub struct AtlasPacker {
    config: AtlasConfig,
}

impl AtlasPacker {
    pub fn new(config: AtlasConfig) -> Self {
        Self { config }
    }
}

impl Packer for AtlasPacker {
    fn pack(&self, paths: Vec<PathBuf>) -> BoxFuture<'static, Result<PackedSheet, StageError>> {
        let config = self.config;
        blocking(move || pack_files(&paths, &config))
    }
}

/// Decode every path and compose them into one sheet.
pub fn pack_files(paths: &[PathBuf], config: &AtlasConfig) -> Result<PackedSheet, StageError> {
    if paths.is_empty() {
        return Err(StageError::Message("no sprite elements to pack".to_string()));
    }

    let images = paths
        .par_iter()
        .map(|path| Ok(image::open(path)?.to_rgba8()))
        .collect::<Result<Vec<RgbaImage>, StageError>>()?;

    let sizes: Vec<(u32, u32)> = images.iter().map(RgbaImage::dimensions).collect();
    let (positions, (width, height)) = layout_boxes(&sizes, config);

    let mut sheet = RgbaImage::from_pixel(width, height, TRANSPARENT);
    let mut boxes = HashMap::with_capacity(paths.len());
    for ((path, image), (x, y)) in paths.iter().zip(&images).zip(&positions) {
        copy_sprite_to_sheet(&mut sheet, image, *x, *y);
        boxes.insert(
            path.clone(),
            PackedBox { x: *x, y: *y, width: image.width(), height: image.height() },
        );
    }

    Ok(PackedSheet { image: encode_png(&sheet)?, width, height, boxes })
}

/// Compute the position of every element and the overall sheet size.
///
/// Positions are returned in input order.
pub fn layout_boxes(sizes: &[(u32, u32)], config: &AtlasConfig) -> (Vec<(u32, u32)>, (u32, u32)) {
    let padding = config.padding;
    match config.layout {
        Layout::TopDown => {
            let mut y = 0;
            let positions = sizes
                .iter()
                .map(|(_, h)| {
                    let pos = (0, y);
                    y += h + padding;
                    pos
                })
                .collect();
            let width = sizes.iter().map(|(w, _)| *w).max().unwrap_or(0);
            (positions, (width.max(1), y.saturating_sub(padding).max(1)))
        }
        Layout::LeftRight => {
            let mut x = 0;
            let positions = sizes
                .iter()
                .map(|(w, _)| {
                    let pos = (x, 0);
                    x += w + padding;
                    pos
                })
                .collect();
            let height = sizes.iter().map(|(_, h)| *h).max().unwrap_or(0);
            (positions, (x.saturating_sub(padding).max(1), height.max(1)))
        }
        Layout::Shelf => shelf_layout(sizes, padding),
    }
}

/// Shelf packing into a roughly square sheet.
///
/// Elements are sorted by height (tallest first) and placed left to right into horizontal
/// shelves no wider than the square root of the total padded area.
fn shelf_layout(sizes: &[(u32, u32)], padding: u32) -> (Vec<(u32, u32)>, (u32, u32)) {
    let area: u64 = sizes.iter().map(|(w, h)| (*w + padding) as u64 * (*h + padding) as u64).sum();
    let widest = sizes.iter().map(|(w, _)| *w + padding).max().unwrap_or(0);
    let max_width = ((area as f64).sqrt().ceil() as u32).max(widest);

    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|a, b| sizes[*b].1.cmp(&sizes[*a].1));

    let mut shelves: Vec<Shelf> = vec![];
    let mut positions = vec![(0, 0); sizes.len()];
    for index in order {
        let (w, h) = sizes[index];
        positions[index] = place_in_shelves(&mut shelves, w + padding, h + padding, max_width);
    }

    (positions, calculate_sheet_size(&shelves, padding))
}

/// Place a padded element, opening a new shelf when none has room
fn place_in_shelves(
    shelves: &mut Vec<Shelf>,
    padded_w: u32,
    padded_h: u32,
    max_width: u32,
) -> (u32, u32) {
    for shelf in shelves.iter_mut() {
        if padded_h <= shelf.height && shelf.width_used + padded_w <= max_width {
            let pos = (shelf.width_used, shelf.y);
            shelf.width_used += padded_w;
            return pos;
        }
    }

    let y = shelves.last().map(|s| s.y + s.height).unwrap_or(0);
    shelves.push(Shelf { y, height: padded_h, width_used: padded_w });
    (0, y)
}

/// Calculate the final sheet dimensions
fn calculate_sheet_size(shelves: &[Shelf], padding: u32) -> (u32, u32) {
    let max_width = shelves.iter().map(|s| s.width_used).max().unwrap_or(0);
    let total_height = shelves.last().map(|s| s.y + s.height).unwrap_or(0);

    // Padding sits between elements, not on the outer edges
    (max_width.saturating_sub(padding).max(1), total_height.saturating_sub(padding).max(1))
}

/// Copy an element image onto the sheet at the given position
fn copy_sprite_to_sheet(sheet: &mut RgbaImage, sprite: &RgbaImage, x: u32, y: u32) {
    for sy in 0..sprite.height() {
        for sx in 0..sprite.width() {
            if x + sx < sheet.width() && y + sy < sheet.height() {
                sheet.put_pixel(x + sx, y + sy, *sprite.get_pixel(sx, sy));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::decode_rgba;
    use tempfile::TempDir;

    fn overlaps(a: (u32, u32, u32, u32), b: (u32, u32, u32, u32)) -> bool {
        a.0 < b.0 + b.2 && a.0 + a.2 > b.0 && a.1 < b.1 + b.3 && a.1 + a.3 > b.1
    }

    fn assert_no_overlap(sizes: &[(u32, u32)], positions: &[(u32, u32)]) {
        let rects: Vec<_> =
            sizes.iter().zip(positions).map(|((w, h), (x, y))| (*x, *y, *w, *h)).collect();
        for i in 0..rects.len() {
            for j in (i + 1)..rects.len() {
                assert!(!overlaps(rects[i], rects[j]), "elements {} and {} overlap", i, j);
            }
        }
    }

    #[test]
    fn test_shelf_single_element() {
        let (positions, size) = layout_boxes(&[(16, 8)], &AtlasConfig::default());
        assert_eq!(positions, vec![(0, 0)]);
        assert_eq!(size, (16, 8));
    }

    #[test]
    fn test_shelf_no_overlap_and_fits() {
        let sizes = vec![(32, 32), (16, 16), (8, 8), (16, 24), (10, 4)];
        let (positions, (w, h)) = layout_boxes(&sizes, &AtlasConfig::default());
        assert_no_overlap(&sizes, &positions);
        for ((sw, sh), (x, y)) in sizes.iter().zip(&positions) {
            assert!(x + sw <= w && y + sh <= h);
        }
    }

    #[test]
    fn test_padding_keeps_even_sizes_even() {
        let sizes = vec![(8, 8), (8, 8), (4, 6)];
        let config = AtlasConfig { layout: Layout::Shelf, padding: 2 };
        let (positions, (w, h)) = layout_boxes(&sizes, &config);
        assert_no_overlap(&sizes, &positions);
        assert_eq!(w % 2, 0);
        assert_eq!(h % 2, 0);
        assert!(positions.iter().all(|(x, y)| x % 2 == 0 && y % 2 == 0));
    }

    #[test]
    fn test_top_down_and_left_right() {
        let sizes = vec![(4, 2), (6, 4)];
        let top_down = AtlasConfig { layout: Layout::TopDown, padding: 1 };
        assert_eq!(layout_boxes(&sizes, &top_down), (vec![(0, 0), (0, 3)], (6, 7)));

        let left_right = AtlasConfig { layout: Layout::LeftRight, padding: 0 };
        assert_eq!(layout_boxes(&sizes, &left_right), (vec![(0, 0), (4, 0)], (10, 4)));
    }

    #[test]
    fn test_pack_files_composes_pixels() {
        let temp = TempDir::new().expect("should create temp dir");
        let red = Rgba([255, 0, 0, 255]);
        let blue = Rgba([0, 0, 255, 255]);
        let a = temp.path().join("a.png");
        let b = temp.path().join("b.png");
        RgbaImage::from_pixel(4, 4, red).save(&a).expect("should save a");
        RgbaImage::from_pixel(2, 2, blue).save(&b).expect("should save b");

        let packed = pack_files(&[a.clone(), b.clone()], &AtlasConfig::default())
            .expect("should pack");
        let sheet = decode_rgba(&packed.image).expect("should decode");
        assert_eq!(sheet.dimensions(), (packed.width, packed.height));

        let box_a = packed.boxes[&a];
        let box_b = packed.boxes[&b];
        assert_eq!((box_a.width, box_a.height), (4, 4));
        assert_eq!(*sheet.get_pixel(box_a.x, box_a.y), red);
        assert_eq!(*sheet.get_pixel(box_b.x + 1, box_b.y + 1), blue);
    }

    #[test]
    fn test_pack_files_rejects_empty_input() {
        assert!(pack_files(&[], &AtlasConfig::default()).is_err());
    }

    #[test]
    fn test_pack_files_reports_unreadable_image() {
        let temp = TempDir::new().expect("should create temp dir");
        let bogus = temp.path().join("bogus.png");
        std::fs::write(&bogus, b"not a png").expect("should write");
        assert!(pack_files(&[bogus], &AtlasConfig::default()).is_err());
    }
}
