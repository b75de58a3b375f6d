pub mod emit;
pub mod entity;
pub mod error;
pub mod ir;
pub mod pipeline;

pub use error::CoreError;
