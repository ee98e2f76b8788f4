//! Instrument command: print what the compiler would see.

use std::path::Path;

use anyhow::Context;
use ceres_core::Instrumenter;
use ceres_core::colors;
use ceres_core::instrument::DEFAULT_MARKER;

/// Print the instrumented source of `file` to stdout and its compile flags
/// to stderr.
pub fn execute(file: &str) -> anyhow::Result<()> {
    let path = Path::new(file);
    if !path.exists() {
        anyhow::bail!("Source file not found: {}", file);
    }
    let source =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", file))?;

    let instrumented = Instrumenter::new(DEFAULT_MARKER, "source.c")?.instrument(&source);

    print!("{}", instrumented.text);
    if instrumented.extra_flags.is_empty() {
        eprintln!("{}Compile flags:{} (none)", colors::BOLD, colors::RESET);
    } else {
        eprintln!(
            "{}Compile flags:{} {}",
            colors::BOLD,
            colors::RESET,
            instrumented.extra_flags.join(" ")
        );
    }

    Ok(())
}
