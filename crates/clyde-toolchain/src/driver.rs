//! The driver trait and its result types.

use async_trait::async_trait;
use clyde_core::{CompilerInfo, Diagnostic, ErrorCode};
use clyde_planner::{CompileStep, LinkStep};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Fatal toolchain failure. A compile or link that merely fails with
/// diagnostics is a result, not an error.
#[derive(Debug, Error)]
pub enum ToolchainError {
    /// The probe could not identify a compiler.
    #[error("[E0601] compiler probe failed: {message}")]
    ProbeFailed {
        /// Probe failure description.
        message: String,
    },
    /// The tool executable is not installed or not on PATH.
    #[error("[E0602] toolchain executable '{name}' not found")]
    ExecutableMissing {
        /// The missing executable.
        name: String,
    },
    /// The child process was terminated by a signal.
    #[error("[E0603] '{name}' terminated by signal")]
    SignalTerminated {
        /// The executable that died.
        name: String,
    },
    /// Spawning or supervising the child process failed.
    #[error("[E0601] toolchain i/o failure: {source}")]
    Io {
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl ToolchainError {
    /// The stable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ProbeFailed { .. } | Self::Io { .. } => ErrorCode::E0601,
            Self::ExecutableMissing { .. } => ErrorCode::E0602,
            Self::SignalTerminated { .. } => ErrorCode::E0603,
        }
    }
}

/// Outcome of compiling one translation unit.
#[derive(Debug, Clone)]
pub struct CompileResult {
    /// Where the object file was written (valid only on success).
    pub object_path: PathBuf,
    /// Structured diagnostics in source-location order.
    pub diagnostics: Vec<Diagnostic>,
    /// Wall time of the compiler invocation.
    pub duration: Duration,
    /// Did the compiler exit zero?
    pub success: bool,
}

/// Outcome of linking one package.
#[derive(Debug, Clone)]
pub struct LinkResult {
    /// Where the artifact was written (valid only on success).
    pub artifact_path: PathBuf,
    /// Linker stderr, captured as-is (unresolved symbol reports included).
    pub output: String,
    /// Wall time of the linker invocation.
    pub duration: Duration,
    /// Did the linker exit zero?
    pub success: bool,
}

/// The capability the executor drives.
#[async_trait]
pub trait ToolchainDriver: Send + Sync {
    /// Identify the compiler. Implementations cache the result per process.
    async fn probe(&self) -> Result<CompilerInfo, ToolchainError>;

    /// Compile one step, capturing and parsing stderr diagnostics.
    async fn compile(&self, step: &CompileStep) -> Result<CompileResult, ToolchainError>;

    /// Link one step (archive for libraries, executable for applications).
    async fn link(&self, step: &LinkStep) -> Result<LinkResult, ToolchainError>;
}
