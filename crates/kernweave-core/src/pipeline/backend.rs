use std::path::PathBuf;

use crate::error::CoreError;
use crate::ir::CompilationUnit;

use super::EmitConfig;

/// Input to a backend.
pub struct BackendInput {
    /// Units to compile; each becomes one output file.
    pub units: Vec<CompilationUnit>,
    /// Output directory for generated code.
    pub output_dir: PathBuf,
    pub config: EmitConfig,
}

/// A unit that failed to compile. Its siblings are unaffected.
#[derive(Debug)]
pub struct UnitFailure {
    pub unit: String,
    pub error: CoreError,
}

/// What a backend produced.
#[derive(Debug, Default)]
pub struct BackendReport {
    pub written: Vec<PathBuf>,
    pub failures: Vec<UnitFailure>,
}

impl BackendReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Backend trait: emits target source from compilation units.
pub trait Backend {
    /// Name of this backend (e.g., "opencl").
    fn name(&self) -> &str;

    /// Generate code for every unit. Per-unit failures go into the report;
    /// `Err` is reserved for failures that stop the whole run (I/O).
    fn emit(&self, input: BackendInput) -> Result<BackendReport, CoreError>;
}
