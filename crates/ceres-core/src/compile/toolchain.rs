//! C compiler invocation.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Command;

use crate::config::CompilerConfig;
use crate::error::{Error, Result};

use super::{CompileOutcome, CompileRequest, Compiler};

/// A `gcc`-compatible compiler driver (`gcc`, `clang`, `cc`).
#[derive(Debug, Clone)]
pub struct CCompiler {
    config: CompilerConfig,
}

impl CCompiler {
    /// Create a compiler from configuration.
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    /// The compiler configuration.
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Resolve the compiler program through `PATH`.
    pub fn locate(&self) -> Result<PathBuf> {
        which::which(&self.config.program).map_err(|_| self.tool_not_found())
    }

    /// Display name of the compiler program.
    fn tool_name(&self) -> String {
        self.config
            .program
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.config.program.display().to_string())
    }

    fn tool_not_found(&self) -> Error {
        Error::ToolNotFound {
            tool: self.tool_name(),
        }
    }
}

impl Default for CCompiler {
    fn default() -> Self {
        Self::new(CompilerConfig::default())
    }
}

impl Compiler for CCompiler {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<CompileOutcome> {
        let program = self.locate()?;

        let source_path = request.work_dir.join(&self.config.source_name);
        let executable = request.work_dir.join(self.config.executable_name());
        fs::write(&source_path, request.source)?;

        tracing::debug!(
            "Compiling {} with {} (extra flags: {:?})",
            source_path.display(),
            program.display(),
            request.extra_flags
        );

        // Relative paths keep diagnostics pointing at `source.c`.
        let output = Command::new(&program)
            .arg(&self.config.source_name)
            .arg("-o")
            .arg(self.config.executable_name())
            .args(&self.config.base_flags)
            .args(request.extra_flags)
            .current_dir(request.work_dir)
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => self.tool_not_found(),
                _ => Error::Io(e),
            })?;

        let mut diagnostics = String::from_utf8_lossy(&output.stdout).to_string();
        diagnostics.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() && executable.exists() {
            Ok(CompileOutcome::Success {
                executable,
                diagnostics,
            })
        } else {
            Ok(CompileOutcome::Failed { diagnostics })
        }
    }

    fn source_name(&self) -> &str {
        &self.config.source_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_compiler_is_tool_not_found() {
        let compiler = CCompiler::new(
            CompilerConfig::default().with_program("ceres-definitely-missing-cc"),
        );
        let temp = tempfile::TempDir::new().unwrap();

        let result = compiler.compile(&CompileRequest {
            source: "int main(void) { return 0; }\n",
            work_dir: temp.path(),
            extra_flags: &[],
        });

        match result {
            Err(Error::ToolNotFound { tool }) => assert_eq!(tool, "ceres-definitely-missing-cc"),
            other => panic!("expected ToolNotFound, got {other:?}"),
        }
    }
}
