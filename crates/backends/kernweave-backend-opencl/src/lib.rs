//! OpenCL C backend: one `.cl` file per compilation unit.

pub mod emit;
mod prelude;

use std::fs;

use log::{info, warn};

use kernweave_core::error::CoreError;
use kernweave_core::pipeline::{Backend, BackendInput, BackendReport, UnitFailure};

pub use emit::{emit_unit_to_string, file_name, sanitize_ident};

/// OpenCL C backend.
pub struct OpenClBackend;

impl Backend for OpenClBackend {
    fn name(&self) -> &str {
        "opencl"
    }

    fn emit(&self, input: BackendInput) -> Result<BackendReport, CoreError> {
        fs::create_dir_all(&input.output_dir)?;

        let mut report = BackendReport::default();
        for unit in &input.units {
            match emit::emit_unit_to_string(unit, &input.config) {
                Ok(source) => {
                    let path = input.output_dir.join(emit::file_name(&unit.name));
                    fs::write(&path, source)?;
                    info!("wrote {}", path.display());
                    report.written.push(path);
                }
                Err(error) => {
                    warn!("skipping unit `{}`: {error}", unit.name);
                    report.failures.push(UnitFailure {
                        unit: unit.name.clone(),
                        error,
                    });
                }
            }
        }
        Ok(report)
    }
}
