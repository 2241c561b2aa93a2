//! spritecss - Command-line tool for composing stylesheet sprites

use std::process::ExitCode;

use spritecss::cli;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    cli::run()
}
