//! Size command: report the dimensions of a sprite element

use std::path::Path;
use std::process::ExitCode;

use super::{load_options, EXIT_ERROR, EXIT_SUCCESS};
use crate::config::CliOverrides;
use crate::size::ImageSizeCache;

/// Run the size command
pub fn run_size(
    element: &str,
    config: Option<&Path>,
    overrides: &CliOverrides,
    json: bool,
) -> ExitCode {
    let options = match load_options(config, overrides) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let cache = ImageSizeCache::new(options.resolver().clone());
    let Some(dimensions) = cache.size_of(element) else {
        eprintln!("Error: No readable image found for '{}'", element);
        return ExitCode::from(EXIT_ERROR);
    };

    if json {
        match serde_json::to_string(&dimensions) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: Failed to serialize size: {}", e);
                return ExitCode::from(EXIT_ERROR);
            }
        }
    } else {
        println!("{}x{}", dimensions.width, dimensions.height);
    }
    ExitCode::from(EXIT_SUCCESS)
}
