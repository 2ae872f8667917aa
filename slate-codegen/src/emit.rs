//! Final stage of code generation: turning the populated Cranelift module
//! into an object file image.

use std::path::Path;

use cranelift_object::ObjectModule;
use thiserror::Error;

/// Everything the code generator can fail with.
#[derive(Debug, Error)]
pub enum CodegenError {
    /// Backend setup went wrong: no usable instruction set, a bad target
    /// triple, or a flag the ISA does not accept.
    #[error("backend configuration failed: {0}")]
    Backend(String),

    /// The lowerer refused a construct: a type misuse, an unknown name,
    /// misplaced control flow, or a builtin applied to the wrong
    /// arguments. The payload is the diagnostic shown to the user.
    #[error("{0}")]
    Rejected(String),

    /// The finished module could not be serialized into an object
    /// container.
    #[error("object emission failed: {0}")]
    Emit(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Consume the module and return the finished object file image.
pub fn emit_object(module: ObjectModule) -> Result<Vec<u8>, CodegenError> {
    module
        .finish()
        .emit()
        .map_err(|e| CodegenError::Emit(e.to_string()))
}

/// Consume the module and write the object file at `path`.
pub fn emit_to_file(module: ObjectModule, path: &Path) -> Result<(), CodegenError> {
    let bytes = emit_object(module)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CodegenContext;
    use crate::lower::lower_program;
    use slate_compiler::compiler::types::TypeRegistry;
    use std::path::PathBuf;

    #[test]
    fn one_function_module_round_trips_to_bytes() {
        let mut registry = TypeRegistry::new();
        let program = slate_compiler::compile_source(
            "def answer() -> i32 { return 42; }",
            &mut registry,
        )
        .expect("front end accepts the program");
        let session = CodegenContext::new().expect("native backend");
        let lowered = lower_program(session, &program, &mut registry, &PathBuf::from("."), false)
            .expect("one trivial function lowers");

        let image = emit_object(lowered.module).expect("object image");
        // A container with one symbol still carries headers and section
        // tables, so it is never a handful of bytes.
        assert!(image.len() > 64, "suspiciously small object: {} bytes", image.len());
    }
}
