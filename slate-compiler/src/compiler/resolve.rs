//! Type resolution: a single post-order walk that registers records and
//! fills `resolved_ty` slots from declared textual types.
//!
//! Identifier types are left `Unknown` here on purpose — they need
//! scope-aware lookup, which lives in the lowerer's symbol table. Anything
//! still `Unknown` when the lowerer needs it is rejected there.

use crate::compiler::ast::*;
use crate::compiler::types::{make_pointer, pointed_to, TypeError, TypeKind, TypeRegistry};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Resolve a program in source order. Records become visible to every
/// declaration that follows them, because program-scope declarations are
/// walked in order.
pub fn resolve_program(
    program: &mut Program,
    registry: &mut TypeRegistry,
) -> Result<(), ResolveError> {
    for decl in &mut program.decls {
        match decl {
            Decl::Struct(s) => resolve_struct(s, registry)?,
            Decl::Enum(_) => {}
            Decl::Function(f) => {
                resolve_params(&mut f.params, registry);
                resolve_block(&mut f.body, registry);
            }
            Decl::Var(v) => resolve_var_decl(v, registry),
        }
    }
    Ok(())
}

fn resolve_struct(s: &mut StructDecl, registry: &mut TypeRegistry) -> Result<(), ResolveError> {
    for field in &mut s.fields {
        field.resolved_ty = registry.type_from_name(&field.ty);
    }
    let fields = s
        .fields
        .iter()
        .map(|f| (f.name.clone(), f.resolved_ty))
        .collect();
    let id = registry.register_record(&s.name, fields)?;
    for field in &mut s.fields {
        field.offset = registry.field_offset(id, &field.name).unwrap_or(0);
    }
    // Methods resolve after registration so the record's own name is a
    // valid parameter or variable type inside them.
    for method in &mut s.methods {
        resolve_params(&mut method.params, registry);
        resolve_block(&mut method.body, registry);
    }
    Ok(())
}

fn resolve_params(params: &mut [Param], registry: &TypeRegistry) {
    for param in params {
        param.resolved_ty = registry.type_from_name(&param.ty);
    }
}

fn resolve_var_decl(v: &mut VarDecl, registry: &TypeRegistry) {
    v.resolved_ty = registry.type_from_name(&v.ty);
    if let Some(init) = &mut v.init {
        resolve_expr(init, registry);
    }
}

fn resolve_block(block: &mut Block, registry: &TypeRegistry) {
    for stmt in &mut block.stmts {
        resolve_stmt(stmt, registry);
    }
}

fn resolve_stmt(stmt: &mut Stmt, registry: &TypeRegistry) {
    match stmt {
        Stmt::Var(v) => resolve_var_decl(v, registry),
        Stmt::Assign { value, .. } => resolve_expr(value, registry),
        Stmt::PtrAssign { target, value } => {
            resolve_expr(target, registry);
            resolve_expr(value, registry);
        }
        Stmt::Return(value) => {
            if let Some(value) = value {
                resolve_expr(value, registry);
            }
        }
        Stmt::If(s) | Stmt::Unless(s) => {
            resolve_expr(&mut s.cond, registry);
            resolve_block(&mut s.then_block, registry);
            if let Some(else_block) = &mut s.else_block {
                resolve_block(else_block, registry);
            }
        }
        Stmt::For(s) => {
            if let Some(init) = &mut s.init {
                resolve_stmt(init, registry);
            }
            if let Some(cond) = &mut s.cond {
                resolve_expr(cond, registry);
            }
            if let Some(update) = &mut s.update {
                resolve_stmt(update, registry);
            }
            resolve_block(&mut s.body, registry);
        }
        Stmt::While(s) => {
            resolve_expr(&mut s.cond, registry);
            resolve_block(&mut s.body, registry);
        }
        Stmt::Switch(s) => {
            resolve_expr(&mut s.expr, registry);
            for case in &mut s.cases {
                resolve_expr(&mut case.value, registry);
                resolve_block(&mut case.body, registry);
            }
            if let Some(default) = &mut s.default {
                resolve_block(default, registry);
            }
        }
        Stmt::Match(s) => {
            resolve_expr(&mut s.expr, registry);
            for case in &mut s.cases {
                if let Some(pattern) = &mut case.pattern {
                    resolve_expr(pattern, registry);
                }
                resolve_block(&mut case.body, registry);
            }
        }
        Stmt::Break | Stmt::Continue => {}
        Stmt::Expr(e) => resolve_expr(e, registry),
    }
}

/// The resolved type already attached to a node, `Unknown` where this pass
/// does not compute one (identifiers, calls).
fn expr_ty(expr: &Expr) -> TypeKind {
    match expr {
        Expr::Literal { resolved_ty, .. }
        | Expr::Identifier { resolved_ty, .. }
        | Expr::Binary { resolved_ty, .. }
        | Expr::Unary { resolved_ty, .. }
        | Expr::FieldAccess { resolved_ty, .. }
        | Expr::MethodCall { resolved_ty, .. }
        | Expr::StructLiteral { resolved_ty, .. } => *resolved_ty,
        Expr::Call { .. } => TypeKind::Unknown,
    }
}

fn resolve_expr(expr: &mut Expr, registry: &TypeRegistry) {
    match expr {
        Expr::Literal {
            ty, resolved_ty, ..
        } => {
            *resolved_ty = match ty.as_str() {
                "i32" => TypeKind::I32,
                "f32" => TypeKind::F32,
                "bool" => TypeKind::BOOL,
                "string" => TypeKind::STRING,
                "void" => TypeKind::VOID,
                _ => TypeKind::Unknown,
            };
        }
        Expr::Identifier { .. } => {}
        Expr::Binary {
            op,
            left,
            right,
            resolved_ty,
        } => {
            resolve_expr(left, registry);
            resolve_expr(right, registry);
            *resolved_ty =
                registry.binary_result_type(expr_ty(left), expr_ty(right), op.is_comparison());
        }
        Expr::Unary {
            op,
            operand,
            resolved_ty,
        } => {
            resolve_expr(operand, registry);
            *resolved_ty = match op {
                UnOp::AddressOf => make_pointer(expr_ty(operand)),
                UnOp::Dereference => pointed_to(expr_ty(operand)),
            };
        }
        Expr::Call { args, .. } => {
            for arg in args {
                resolve_expr(arg, registry);
            }
        }
        Expr::FieldAccess {
            object,
            field,
            resolved_ty,
        } => {
            resolve_expr(object, registry);
            *resolved_ty = match expr_ty(object) {
                TypeKind::Record(id) => {
                    registry.field_type(id, field).unwrap_or(TypeKind::Unknown)
                }
                _ => TypeKind::Unknown,
            };
        }
        Expr::MethodCall { object, args, .. } => {
            resolve_expr(object, registry);
            for arg in args {
                resolve_expr(arg, registry);
            }
        }
        Expr::StructLiteral {
            type_name,
            fields,
            resolved_ty,
        } => {
            for (_, value) in fields.iter_mut() {
                resolve_expr(value, registry);
            }
            *resolved_ty = registry
                .record_by_name(type_name)
                .map(|r| TypeKind::Record(r.id))
                .unwrap_or(TypeKind::Unknown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::parser::parse_source;
    use crate::compiler::types::Scalar;

    fn resolved(source: &str) -> (Program, TypeRegistry) {
        let mut program = parse_source(source).expect("parse");
        let mut registry = TypeRegistry::new();
        resolve_program(&mut program, &mut registry).expect("resolve");
        (program, registry)
    }

    #[test]
    fn struct_registration_assigns_offsets() {
        let (program, registry) = resolved("def struct P { x: i32; y: i32; }");
        let record = registry.record_by_name("P").expect("registered");
        assert_eq!(record.total_size, 8);
        let Decl::Struct(s) = &program.decls[0] else {
            panic!()
        };
        assert_eq!(s.fields[0].offset, 0);
        assert_eq!(s.fields[1].offset, 4);
        assert_eq!(s.fields[1].resolved_ty, TypeKind::I32);
    }

    #[test]
    fn duplicate_struct_is_an_error() {
        let mut program =
            parse_source("def struct P { x: i32; }\ndef struct P { y: i32; }").unwrap();
        let mut registry = TypeRegistry::new();
        assert!(resolve_program(&mut program, &mut registry).is_err());
    }

    #[test]
    fn literals_and_params_are_typed() {
        let (program, _registry) = resolved(
            "def add(a: i64, s: string) -> i32 { def x: i32 = 1 + 2; return x; }",
        );
        let Decl::Function(f) = &program.decls[0] else {
            panic!()
        };
        assert_eq!(f.params[0].resolved_ty, TypeKind::I64);
        assert_eq!(f.params[1].resolved_ty, TypeKind::STRING);
        let Stmt::Var(v) = &f.body.stmts[0] else {
            panic!()
        };
        assert_eq!(v.resolved_ty, TypeKind::I32);
        let Some(Expr::Binary { resolved_ty, .. }) = &v.init else {
            panic!()
        };
        assert_eq!(*resolved_ty, TypeKind::I32);
    }

    #[test]
    fn comparisons_resolve_to_bool() {
        let (program, _) = resolved("def f() -> bool { return 1 < 2; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!()
        };
        let Stmt::Return(Some(Expr::Binary { resolved_ty, .. })) = &f.body.stmts[0] else {
            panic!()
        };
        assert_eq!(*resolved_ty, TypeKind::BOOL);
    }

    #[test]
    fn pointer_types_resolve_through_declarations() {
        let (program, _) = resolved("def f(p: *i32) -> i32 { return *p; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!()
        };
        assert_eq!(f.params[0].resolved_ty, TypeKind::Ptr(Scalar::I32));
    }

    #[test]
    fn record_literal_resolves_to_record_type() {
        let (program, registry) = resolved(
            "def struct P { x: i32; }\ndef main() -> i32 { def p: P = P { x: 1 }; return p.x; }",
        );
        let id = registry.record_by_name("P").unwrap().id;
        let Decl::Function(f) = &program.decls[1] else {
            panic!()
        };
        let Stmt::Var(v) = &f.body.stmts[0] else {
            panic!()
        };
        assert_eq!(v.resolved_ty, TypeKind::Record(id));
        let Some(Expr::StructLiteral { resolved_ty, .. }) = &v.init else {
            panic!()
        };
        assert_eq!(*resolved_ty, TypeKind::Record(id));
    }

    #[test]
    fn unknown_type_names_stay_unknown() {
        let (program, _) = resolved("def main() -> i32 { def x: Mystery = 0; return 0; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!()
        };
        let Stmt::Var(v) = &f.body.stmts[0] else {
            panic!()
        };
        assert_eq!(v.resolved_ty, TypeKind::Unknown);
    }
}
