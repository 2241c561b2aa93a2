//! Build command: process stylesheets and write the rewritten CSS

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use glob::glob;

use super::{load_options, EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};
use crate::config::CliOverrides;
use crate::pipeline::{RunReport, SpriteEngine};

/// Run the build command
pub fn run_build(
    inputs: &[String],
    out_dir: Option<&Path>,
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

    let files = match expand_inputs(inputs) {
        Ok(files) if files.is_empty() => {
            eprintln!("Error: No stylesheets matched {}", inputs.join(", "));
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
        Ok(files) => files,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: Failed to start runtime: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let engine = SpriteEngine::new(options);
    let results = runtime.block_on(engine.process_files(files));

    let mut reports: Vec<RunReport> = Vec::new();
    let mut failed = false;
    for (path, result) in results {
        let processed = match result {
            Ok(processed) => processed,
            Err(e) => {
                eprintln!("Error in {}: {}", path.display(), e);
                failed = true;
                continue;
            }
        };

        let target = css_target(&path, out_dir);
        if let Err(e) = write_css(&target, &processed.css) {
            eprintln!("Error: Failed to write {}: {}", target.display(), e);
            failed = true;
            continue;
        }

        if !json {
            print_report(&path, &processed.report);
        }
        reports.push(processed.report);
    }

    if json {
        match serde_json::to_string_pretty(&reports) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: Failed to serialize report: {}", e);
                return ExitCode::from(EXIT_ERROR);
            }
        }
    }

    if failed {
        ExitCode::from(EXIT_ERROR)
    } else {
        ExitCode::from(EXIT_SUCCESS)
    }
}

/// Expand glob patterns; plain paths pass through. Duplicates are dropped.
fn expand_inputs(inputs: &[String]) -> Result<Vec<PathBuf>, String> {
    let mut files: Vec<PathBuf> = Vec::new();
    for input in inputs {
        let paths = glob(input).map_err(|e| format!("Invalid pattern '{}': {}", input, e))?;
        for path in paths.filter_map(Result::ok).filter(|p| p.is_file()) {
            if !files.contains(&path) {
                files.push(path);
            }
        }
    }
    Ok(files)
}

/// Where the rewritten stylesheet goes: `out_dir/<file name>`, or over the input
fn css_target(input: &Path, out_dir: Option<&Path>) -> PathBuf {
    match (out_dir, input.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => input.to_path_buf(),
    }
}

fn write_css(target: &Path, css: &str) -> std::io::Result<()> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(target, css)
}

fn print_report(path: &Path, report: &RunReport) {
    if report.skipped {
        println!("{}: skipped", path.display());
        return;
    }
    if report.intents == 0 {
        println!("{}: no sprites", path.display());
        return;
    }
    println!(
        "{}: {} sprites from {} images ({}x{})",
        path.display(),
        report.intents,
        report.elements,
        report.width,
        report.height
    );
    for written in &report.written {
        println!("  -> {}", written.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_css_target() {
        let input = Path::new("site/css/main.css");
        assert_eq!(css_target(input, None), PathBuf::from("site/css/main.css"));
        assert_eq!(css_target(input, Some(Path::new("dist"))), PathBuf::from("dist/main.css"));
    }

    #[test]
    fn test_expand_inputs() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.css"), "").unwrap();
        std::fs::write(temp.path().join("b.css"), "").unwrap();
        std::fs::write(temp.path().join("c.txt"), "").unwrap();

        let pattern = format!("{}/*.css", temp.path().display());
        let direct = temp.path().join("a.css").display().to_string();
        let files = expand_inputs(&[pattern, direct]).unwrap();
        assert_eq!(files, vec![temp.path().join("a.css"), temp.path().join("b.css")]);
    }

    #[test]
    fn test_expand_inputs_invalid_pattern() {
        assert!(expand_inputs(&["[".to_string()]).is_err());
    }

    #[test]
    fn test_write_css_creates_directories() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("dist").join("main.css");
        write_css(&target, ".a {}").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), ".a {}");
    }
}
