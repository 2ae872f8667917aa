//! Backend session setup.
//!
//! A [`CodegenContext`] pairs the selected instruction set with the object
//! module that lowering fills in. The flags are tuned for the `slatec`
//! driver: optimized output, and non-PIC code because the driver links
//! executables with `cc -no-pie`.

use std::sync::Arc;

use cranelift_codegen::isa::{self, TargetIsa};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_object::{ObjectBuilder, ObjectModule};
use target_lexicon::Triple;

use crate::emit::CodegenError;

pub struct CodegenContext {
    /// Instruction set the module is compiled for.
    pub isa: Arc<dyn TargetIsa>,
    /// Object module receiving functions, shims, and data.
    pub module: ObjectModule,
}

fn codegen_flags() -> Result<settings::Flags, CodegenError> {
    let mut builder = settings::builder();
    for (flag, value) in [("opt_level", "speed"), ("is_pic", "false")] {
        builder
            .set(flag, value)
            .map_err(|e| CodegenError::Backend(format!("cannot set {flag}={value}: {e}")))?;
    }
    Ok(settings::Flags::new(builder))
}

impl CodegenContext {
    /// Open a session for the machine the compiler runs on.
    pub fn new() -> Result<Self, CodegenError> {
        let isa = cranelift_native::builder()
            .map_err(|e| {
                CodegenError::Backend(format!("host architecture not supported: {e}"))
            })?
            .finish(codegen_flags()?)
            .map_err(|e| CodegenError::Backend(e.to_string()))?;
        Self::with_isa(isa)
    }

    /// Open a session for an explicit target triple such as
    /// `x86_64-unknown-linux-gnu`.
    pub fn new_with_target(spec: &str) -> Result<Self, CodegenError> {
        let triple: Triple = spec
            .parse()
            .map_err(|e| CodegenError::Backend(format!("bad target triple '{spec}': {e}")))?;
        let isa = isa::lookup(triple)
            .map_err(|e| CodegenError::Backend(format!("no backend for '{spec}': {e}")))?
            .finish(codegen_flags()?)
            .map_err(|e| CodegenError::Backend(e.to_string()))?;
        Self::with_isa(isa)
    }

    fn with_isa(isa: Arc<dyn TargetIsa>) -> Result<Self, CodegenError> {
        let builder = ObjectBuilder::new(
            isa.clone(),
            "slate_module",
            cranelift_module::default_libcall_names(),
        )
        .map_err(|e| CodegenError::Backend(e.to_string()))?;
        Ok(Self {
            isa,
            module: ObjectModule::new(builder),
        })
    }

    /// Width of addresses on the selected target.
    pub fn pointer_type(&self) -> cranelift_codegen::ir::Type {
        self.isa.pointer_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_session_opens() {
        let session = CodegenContext::new().expect("native backend available");
        let width = session.pointer_type().bits();
        assert!(
            width == 32 || width == 64,
            "pointer width {width} out of range"
        );
    }

    #[test]
    fn explicit_triple_selects_a_backend() {
        let session =
            CodegenContext::new_with_target("x86_64-unknown-linux-gnu").expect("x86-64 backend");
        assert_eq!(session.pointer_type().bits(), 64);
    }

    #[test]
    fn garbage_triple_is_refused() {
        assert!(CodegenContext::new_with_target("teapot-9000").is_err());
    }
}
