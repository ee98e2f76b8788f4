//! Compiler collaborator for instrumented C sources.
//!
//! This module provides:
//! - The [`Compiler`] seam (source text + flags → executable or diagnostics)
//! - A `gcc`-compatible implementation
//! - Diagnostic colorization for terminal-style transcripts

mod diagnostics;
mod toolchain;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;

pub use diagnostics::colorize_diagnostics;
pub use toolchain::CCompiler;

/// One compiler invocation.
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    /// Instrumented source text.
    pub source: &'a str,

    /// Isolated build directory; the artifact is written here.
    pub work_dir: &'a Path,

    /// Flags appended after the compiler's base flags.
    pub extra_flags: &'a [String],
}

/// Outcome of a compiler invocation that ran.
#[derive(Debug, Clone)]
pub enum CompileOutcome {
    /// The artifact was produced. Diagnostics hold any warnings.
    Success {
        executable: PathBuf,
        diagnostics: String,
    },

    /// The compiler reported errors.
    Failed { diagnostics: String },
}

impl CompileOutcome {
    /// Diagnostic text of either outcome.
    pub fn diagnostics(&self) -> &str {
        match self {
            Self::Success { diagnostics, .. } | Self::Failed { diagnostics } => diagnostics,
        }
    }
}

/// Turns source text into a runnable artifact.
///
/// Returns `Err(Error::ToolNotFound)` when the tool is unavailable; a
/// compile that ran but failed is `Ok(CompileOutcome::Failed)`.
pub trait Compiler: Send + Sync {
    /// Compile `request.source` inside `request.work_dir`.
    fn compile(&self, request: &CompileRequest<'_>) -> Result<CompileOutcome>;

    /// Name of the source file diagnostics refer to.
    fn source_name(&self) -> &str {
        "source.c"
    }
}

impl<C: Compiler + ?Sized> Compiler for Arc<C> {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<CompileOutcome> {
        (**self).compile(request)
    }

    fn source_name(&self) -> &str {
        (**self).source_name()
    }
}
