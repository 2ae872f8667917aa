//! Slate compiler front end.
//!
//! Turns Slate source (`.src`) into a resolved AST: lex → parse → resolve.
//! Native code generation lives in the `slate-codegen` crate, which
//! consumes the `Program` and `TypeRegistry` produced here.

pub mod compiler;

use compiler::ast::Program;
use compiler::lexer::Lexer;
use compiler::parser::{ParseError, Parser};
use compiler::resolve::{resolve_program, ResolveError};
use compiler::types::TypeRegistry;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Resolve(#[from] ResolveError),
}

/// Front-end pipeline for one source file: lex, parse, and resolve against
/// the given registry. Returns the resolved program.
pub fn compile_source(source: &str, registry: &mut TypeRegistry) -> Result<Program, CompileError> {
    let tokens = Lexer::new(source).tokenize();
    let mut program = Parser::new(tokens).parse_program()?;
    resolve_program(&mut program, registry)?;
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_produces_resolved_program() {
        let mut registry = TypeRegistry::new();
        let program = compile_source(
            "def struct P { x: i32; }\ndef main() -> i32 { return 0; }",
            &mut registry,
        )
        .expect("compiles");
        assert_eq!(program.decls.len(), 2);
        assert!(registry.record_by_name("P").is_some());
    }

    #[test]
    fn first_error_aborts() {
        let mut registry = TypeRegistry::new();
        assert!(compile_source("def main( -> i32 {}", &mut registry).is_err());
    }
}
