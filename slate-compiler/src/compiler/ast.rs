use crate::compiler::types::TypeKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A complete Slate program (one `.src` file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub imports: Vec<Import>,
    pub decls: Vec<Decl>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportKind {
    /// `import "@std"` — builtins, resolved at lowering.
    Std,
    /// `import "#name"` — a package under `includes/`.
    External,
    /// `import "./name"` — a sibling source file.
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Import {
    pub kind: ImportKind,
    /// Path with the sigil stripped.
    pub path: String,
}

/// Top-level declarations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Decl {
    Function(Function),
    Struct(StructDecl),
    Enum(EnumDecl),
    Var(VarDecl),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    /// Textual return type; mapped through the registry at lowering.
    pub ret_ty: String,
    pub params: Vec<Param>,
    pub body: Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: String,
    #[serde(default)]
    pub resolved_ty: TypeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<StructField>,
    pub methods: Vec<StructMethod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: String,
    #[serde(default)]
    pub resolved_ty: TypeKind,
    /// Packed byte offset, assigned by the registry during resolution.
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructMethod {
    pub name: String,
    pub ret_ty: String,
    pub params: Vec<Param>,
    pub body: Block,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: String,
    pub variants: Vec<EnumVariant>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumVariant {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutability {
    /// Plain `def` — single assignment at declaration.
    Immutable,
    /// `def mut` — reassignable.
    Mutable,
    /// `def const` — immutable, compile-time flavored.
    Const,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    pub ty: String,
    pub init: Option<Expr>,
    pub mutability: Mutability,
    #[serde(default)]
    pub resolved_ty: TypeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    Var(VarDecl),
    /// `name = value;`
    Assign { target: String, value: Expr },
    /// `*ptr = value;` — `target` is the pointer expression.
    PtrAssign { target: Expr, value: Expr },
    Return(Option<Expr>),
    If(IfStmt),
    Unless(IfStmt),
    For(ForStmt),
    While(WhileStmt),
    Switch(SwitchStmt),
    Match(MatchStmt),
    Break,
    Continue,
    Expr(Expr),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IfStmt {
    pub cond: Expr,
    pub then_block: Block,
    pub else_block: Option<Block>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForStmt {
    pub init: Option<Box<Stmt>>,
    pub cond: Option<Expr>,
    pub update: Option<Box<Stmt>>,
    pub body: Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhileStmt {
    pub cond: Expr,
    pub body: Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchStmt {
    pub expr: Expr,
    /// Cases in source order; emission preserves it.
    pub cases: Vec<SwitchCase>,
    pub default: Option<Block>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchCase {
    pub value: Expr,
    pub body: Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchStmt {
    pub expr: Expr,
    pub cases: Vec<MatchCase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCase {
    /// `None` is the wildcard `_` pattern.
    pub pattern: Option<Expr>,
    pub body: Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    /// A literal with its textual value and textual type tag
    /// (`"i32"`, `"f32"`, `"bool"`, `"string"`, `"void"` for null).
    Literal {
        text: String,
        ty: String,
        #[serde(default)]
        resolved_ty: TypeKind,
    },
    Identifier {
        name: String,
        #[serde(default)]
        resolved_ty: TypeKind,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(default)]
        resolved_ty: TypeKind,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
        #[serde(default)]
        resolved_ty: TypeKind,
    },
    /// Free function, `std.*` builtin, or `cast` call.
    Call { callee: String, args: Vec<Expr> },
    FieldAccess {
        object: Box<Expr>,
        field: String,
        #[serde(default)]
        resolved_ty: TypeKind,
    },
    MethodCall {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
        #[serde(default)]
        resolved_ty: TypeKind,
    },
    /// `TypeName { field: value, ... }`
    StructLiteral {
        type_name: String,
        fields: Vec<(String, Expr)>,
        #[serde(default)]
        resolved_ty: TypeKind,
    },
}

impl Expr {
    pub fn literal(text: impl Into<String>, ty: impl Into<String>) -> Expr {
        Expr::Literal {
            text: text.into(),
            ty: ty.into(),
            resolved_ty: TypeKind::Unknown,
        }
    }

    pub fn identifier(name: impl Into<String>) -> Expr {
        Expr::Identifier {
            name: name.into(),
            resolved_ty: TypeKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge
        )
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    /// `&x` — address of a variable slot.
    AddressOf,
    /// `*p` — load through a pointer.
    Dereference,
}
