//! Configuration for sprite builds
//!
//! Provides types and parsing for `spritecss.toml` and the immutable run options built
//! from it.

pub mod loader;
pub mod options;
pub mod schema;

pub use loader::{
    find_config, find_config_from, load_config, merge_cli_overrides, CliOverrides, ConfigError,
    CONFIG_FILE,
};
pub use options::{Predicate, PredicateFn, SpriteOptions, SpriteOptionsBuilder};
pub use schema::*;
