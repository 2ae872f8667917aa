//! Slate native code generation via Cranelift.
//!
//! Lowers resolved Slate programs to native object files.

pub mod context;
pub mod emit;
pub mod lower;
pub mod types;

pub use context::CodegenContext;
pub use emit::{emit_object, emit_to_file, CodegenError};
pub use lower::{lower_program, LoweredModule};
