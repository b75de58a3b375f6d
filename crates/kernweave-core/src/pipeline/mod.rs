pub mod backend;
pub mod compile;
pub mod config;

pub use backend::{Backend, BackendInput, BackendReport, UnitFailure};
pub use compile::{compile_unit, compile_units, CompiledMethod};
pub use config::{DebugConfig, EmitConfig};
