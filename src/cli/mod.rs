//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;
mod size;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::config::{load_config, merge_cli_overrides, CliOverrides, ConfigError, SpriteOptions};

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// spritecss - Compose stylesheet image references into sprite sheets
#[derive(Parser)]
#[command(name = "spritecss")]
#[command(about = "Compose stylesheet image references into sprite sheets and rewrite the CSS")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process stylesheets: pack referenced images and rewrite the declarations
    Build {
        /// Stylesheet files or glob patterns
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Write rewritten stylesheets here instead of in place
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Config file (default: spritecss.toml found by walking up)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Working directory for element lookup and output paths
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Output path template, e.g. "sprites/[name].[contenthash:8].png"
        #[arg(short, long)]
        output: Option<String>,

        /// Produce a high-density sheet plus a half-size normal sheet
        #[arg(long)]
        retina: bool,

        /// High-density mode with all generated values targeting the normal sheet
        #[arg(long, conflicts_with = "retina")]
        force_normal: bool,

        /// Reduce the sheet palette before writing
        #[arg(long)]
        compress: bool,

        /// Print a JSON run report
        #[arg(long)]
        json: bool,
    },

    /// Print the dimensions of the image an element reference resolves to
    Size {
        /// Element reference, e.g. icons/home
        element: String,

        /// Config file (default: spritecss.toml found by walking up)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Working directory for element lookup
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            inputs,
            out_dir,
            config,
            cwd,
            output,
            retina,
            force_normal,
            compress,
            json,
        } => {
            let retina = if force_normal {
                Some(crate::retina::RetinaMode::ForceNormal)
            } else {
                retina.then_some(crate::retina::RetinaMode::On)
            };
            let overrides =
                CliOverrides { cwd, output, retina, compress: compress.then_some(true) };
            build::run_build(&inputs, out_dir.as_deref(), config.as_deref(), &overrides, json)
        }
        Commands::Size { element, config, cwd, json } => {
            let overrides = CliOverrides { cwd, ..Default::default() };
            size::run_size(&element, config.as_deref(), &overrides, json)
        }
    }
}

/// Load the config file, apply CLI overrides and build the run options.
pub(crate) fn load_options(
    config: Option<&Path>,
    overrides: &CliOverrides,
) -> Result<SpriteOptions, ConfigError> {
    let mut config = load_config(config)?;
    merge_cli_overrides(&mut config, overrides);
    SpriteOptions::from_config(config)
}
