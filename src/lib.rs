//! spritecss - Library for composing stylesheet image references into sprite sheets
//!
//! This library provides functionality to:
//! - Scan stylesheets for `sprite-prop` directives and filtered background urls
//! - Pack the referenced images into one sheet (two in high-density mode)
//! - Rewrite the declarations with sheet offsets and sizes, merging shared backgrounds
//! - Write the sheets to templated, content-hashed paths

pub mod atlas;
pub mod cli;
pub mod compose;
pub mod compress;
pub mod config;
pub mod merge;
pub mod output;
pub mod pipeline;
pub mod property;
pub mod quantize;
pub mod resolve;
pub mod retina;
pub mod scan;
pub mod size;
pub mod stage;
pub mod stylesheet;
pub mod template;
pub mod watch;

pub use config::{SpriteOptions, SpriteOptionsBuilder};
pub use pipeline::{Processed, RunReport, SpriteEngine, SpriteError};
pub use retina::RetinaMode;
pub use stylesheet::{parse, Stylesheet};
