//! Sprite composition - hands the distinct element paths to a [`Packer`] and shapes the
//! result into typed per-element coordinates.

use crate::stage::StageError;
use futures_util::future::BoxFuture;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Placement of one element inside a packed sheet, as reported by a packer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PackedBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// What a packer produces: the composed image plus one box per input path
#[derive(Debug, Clone)]
pub struct PackedSheet {
    /// Encoded PNG bytes
    pub image: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub boxes: HashMap<PathBuf, PackedBox>,
}

/// Lays out a set of image files into one composed sheet.
pub trait Packer: Send + Sync {
    /// Pack the given unique, ordered absolute paths.
    fn pack(&self, paths: Vec<PathBuf>) -> BoxFuture<'static, Result<PackedSheet, StageError>>;
}

/// Pixel placement of an element together with the overall sheet size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PackedCoordinate {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub sheet_width: u32,
    pub sheet_height: u32,
}

/// The composed sheet for one stylesheet run.
///
/// `origin` is the highest-density buffer. `normal` is only present in high-density mode.
#[derive(Debug, Clone)]
pub struct SpriteSheet {
    pub origin: Vec<u8>,
    pub normal: Option<Vec<u8>>,
    pub width: u32,
    pub height: u32,
}

/// Result of composing: the sheet and a coordinate for every element path
#[derive(Debug, Clone)]
pub struct Composition {
    pub sheet: SpriteSheet,
    pub coordinates: HashMap<PathBuf, PackedCoordinate>,
}

/// Pack `paths` and normalize the packer's answer.
///
/// Fails if the packer leaves any requested path without a box.
pub async fn compose(packer: &dyn Packer, paths: &[PathBuf]) -> Result<Composition, StageError> {
    let packed = packer.pack(paths.to_vec()).await?;
    let (width, height) = (packed.width, packed.height);

    let mut coordinates = HashMap::with_capacity(paths.len());
    for path in paths {
        let packed_box = packed.boxes.get(path).ok_or_else(|| {
            StageError::Message(format!("packer returned no placement for {}", path.display()))
        })?;
        coordinates.insert(
            path.clone(),
            PackedCoordinate {
                x: packed_box.x,
                y: packed_box.y,
                width: packed_box.width,
                height: packed_box.height,
                sheet_width: width,
                sheet_height: height,
            },
        );
    }

    Ok(Composition {
        sheet: SpriteSheet { origin: packed.image, normal: None, width, height },
        coordinates,
    })
}
