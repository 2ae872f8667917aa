//! Recursive descent parser with precedence climbing for expressions.
//!
//! The parser owns the whole token vector, so the statement-level
//! `IDENT '='` ambiguity is settled with two-token lookahead. There is no
//! recovery: the first mismatch is returned as an error and the driver
//! aborts.

use crate::compiler::ast::*;
use crate::compiler::tokens::{Token, TokenKind};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected {expected}, got {found} at line {line}")]
    Unexpected {
        expected: String,
        found: String,
        line: usize,
    },
    #[error("{message} at line {line}")]
    Invalid { message: String, line: usize },
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn current(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| self.tokens.last().expect("token stream ends with Eof"))
    }

    fn peek_kind(&self) -> TokenKind {
        self.current().kind
    }

    fn peek_next_kind(&self) -> TokenKind {
        self.tokens
            .get(self.pos + 1)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn found_name(tok: &Token) -> String {
        match tok.kind {
            TokenKind::Newline | TokenKind::Eof => tok.kind.to_string(),
            _ => format!("'{}'", tok.lexeme),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        let tok = self.current().clone();
        if tok.kind == kind {
            self.advance();
            Ok(tok)
        } else {
            Err(ParseError::Unexpected {
                expected: kind.to_string(),
                found: Self::found_name(&tok),
                line: tok.line,
            })
        }
    }

    fn invalid(&self, message: impl Into<String>) -> ParseError {
        ParseError::Invalid {
            message: message.into(),
            line: self.current().line,
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek_kind() == TokenKind::Newline {
            self.advance();
        }
    }

    // ── Program and declarations ──

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut program = Program {
            imports: Vec::new(),
            decls: Vec::new(),
        };
        self.skip_newlines();
        while self.peek_kind() != TokenKind::Eof {
            match self.peek_kind() {
                TokenKind::Import => program.imports.push(self.parse_import()?),
                TokenKind::Def => {
                    self.advance();
                    match self.peek_kind() {
                        TokenKind::Const | TokenKind::Mut => {
                            program.decls.push(Decl::Var(self.parse_var_decl_tail(true)?));
                        }
                        TokenKind::Struct => {
                            program.decls.push(Decl::Struct(self.parse_struct_decl()?));
                        }
                        TokenKind::Enum => {
                            program.decls.push(Decl::Enum(self.parse_enum_decl()?));
                        }
                        TokenKind::Identifier => {
                            program.decls.push(Decl::Function(self.parse_function_decl()?));
                        }
                        _ => {
                            return Err(self.invalid(
                                "expected 'const', 'mut', 'struct', 'enum', or a function name after 'def'",
                            ))
                        }
                    }
                }
                TokenKind::Newline => {
                    self.advance();
                }
                _ => return Err(self.invalid("expected an import or a 'def' declaration")),
            }
        }
        Ok(program)
    }

    fn parse_import(&mut self) -> Result<Import, ParseError> {
        self.expect(TokenKind::Import)?;
        let path_tok = self.expect(TokenKind::StringLit)?;
        let raw = path_tok.lexeme;
        let (kind, path) = if let Some(rest) = raw.strip_prefix('@') {
            (ImportKind::Std, rest.to_string())
        } else if let Some(rest) = raw.strip_prefix('#') {
            (ImportKind::External, rest.to_string())
        } else if let Some(rest) = raw.strip_prefix("./") {
            (ImportKind::Local, rest.to_string())
        } else {
            return Err(ParseError::Invalid {
                message: format!("invalid import path '{}'", raw),
                line: path_tok.line,
            });
        };
        self.skip_newlines();
        Ok(Import { kind, path })
    }

    /// Parse a type: an optional leading `*` followed by a builtin type
    /// keyword or an identifier. Returned textually; the resolver maps it.
    fn parse_type(&mut self) -> Result<String, ParseError> {
        let pointer = if self.peek_kind() == TokenKind::Star {
            self.advance();
            true
        } else {
            false
        };
        let tok = self.current().clone();
        let base = match tok.kind {
            TokenKind::VoidTy
            | TokenKind::BoolTy
            | TokenKind::I32Ty
            | TokenKind::F32Ty
            | TokenKind::StringTy
            | TokenKind::Identifier => {
                self.advance();
                tok.lexeme
            }
            _ => {
                return Err(ParseError::Unexpected {
                    expected: "a type".to_string(),
                    found: Self::found_name(&tok),
                    line: tok.line,
                })
            }
        };
        Ok(if pointer { format!("*{}", base) } else { base })
    }

    /// `def` has been consumed. Parses `("const"|"mut")? IDENT ":" type "="
    /// expr ";"`. At top level a mutability keyword is required (a bare
    /// identifier after `def` starts a function instead).
    fn parse_var_decl_tail(&mut self, _top_level: bool) -> Result<VarDecl, ParseError> {
        let mutability = match self.peek_kind() {
            TokenKind::Mut => {
                self.advance();
                Mutability::Mutable
            }
            TokenKind::Const => {
                self.advance();
                Mutability::Const
            }
            _ => Mutability::Immutable,
        };
        let name = self.expect(TokenKind::Identifier)?.lexeme;
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type()?;
        self.expect(TokenKind::Assign)?;
        let init = self.parse_expression()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(VarDecl {
            name,
            ty,
            init: Some(init),
            mutability,
            resolved_ty: Default::default(),
        })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        let mut params = Vec::new();
        self.expect(TokenKind::LParen)?;
        while self.peek_kind() != TokenKind::RParen {
            let name = self.expect(TokenKind::Identifier)?.lexeme;
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type()?;
            params.push(Param {
                name,
                ty,
                resolved_ty: Default::default(),
            });
            if self.peek_kind() == TokenKind::Comma {
                self.advance();
            } else if self.peek_kind() != TokenKind::RParen {
                let tok = self.current().clone();
                return Err(ParseError::Unexpected {
                    expected: "',' or ')'".to_string(),
                    found: Self::found_name(&tok),
                    line: tok.line,
                });
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_function_decl(&mut self) -> Result<Function, ParseError> {
        let name = self.expect(TokenKind::Identifier)?.lexeme;
        let params = self.parse_params()?;
        self.expect(TokenKind::Arrow)?;
        let ret_ty = self.parse_type()?;
        let body = self.parse_block()?;
        Ok(Function {
            name,
            ret_ty,
            params,
            body,
        })
    }

    fn parse_struct_decl(&mut self) -> Result<StructDecl, ParseError> {
        self.expect(TokenKind::Struct)?;
        let name = self.expect(TokenKind::Identifier)?.lexeme;
        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        self.skip_newlines();
        while !matches!(self.peek_kind(), TokenKind::RBrace | TokenKind::Eof) {
            match self.peek_kind() {
                TokenKind::Newline => {
                    self.advance();
                }
                TokenKind::Pub | TokenKind::Priv => {
                    methods.push(self.parse_struct_method()?);
                }
                TokenKind::Identifier => {
                    let field_name = self.advance().lexeme;
                    self.expect(TokenKind::Colon)?;
                    let ty = self.parse_type()?;
                    self.expect(TokenKind::Semicolon)?;
                    fields.push(StructField {
                        name: field_name,
                        ty,
                        resolved_ty: Default::default(),
                        offset: 0,
                    });
                }
                _ => {
                    return Err(self.invalid("expected a field or a method in struct body"));
                }
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(StructDecl {
            name,
            fields,
            methods,
        })
    }

    fn parse_struct_method(&mut self) -> Result<StructMethod, ParseError> {
        let visibility = if self.advance().kind == TokenKind::Pub {
            Visibility::Public
        } else {
            Visibility::Private
        };
        let name = self.expect(TokenKind::Identifier)?.lexeme;
        let params = self.parse_params()?;
        // Return type defaults to void when the arrow is omitted.
        let ret_ty = if self.peek_kind() == TokenKind::Arrow {
            self.advance();
            self.parse_type()?
        } else {
            "void".to_string()
        };
        let body = self.parse_block()?;
        Ok(StructMethod {
            name,
            ret_ty,
            params,
            body,
            visibility,
        })
    }

    fn parse_enum_decl(&mut self) -> Result<EnumDecl, ParseError> {
        self.expect(TokenKind::Enum)?;
        let name = self.expect(TokenKind::Identifier)?.lexeme;
        self.expect(TokenKind::LBrace)?;
        let mut variants = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek_kind() {
                TokenKind::RBrace => break,
                TokenKind::Identifier => {
                    variants.push(EnumVariant {
                        name: self.advance().lexeme,
                    });
                    if self.peek_kind() == TokenKind::Comma {
                        self.advance();
                    }
                }
                _ => return Err(self.invalid("expected an enum variant name")),
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(EnumDecl { name, variants })
    }

    // ── Statements ──

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        self.skip_newlines();
        while !matches!(self.peek_kind(), TokenKind::RBrace | TokenKind::Eof) {
            if self.peek_kind() == TokenKind::Newline {
                self.advance();
                continue;
            }
            stmts.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Block { stmts })
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        match self.peek_kind() {
            TokenKind::Def => {
                self.advance();
                Ok(Stmt::Var(self.parse_var_decl_tail(false)?))
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.peek_kind() == TokenKind::Semicolon {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Return(value))
            }
            TokenKind::If => {
                self.advance();
                Ok(Stmt::If(self.parse_if_tail()?))
            }
            TokenKind::Unless => {
                self.advance();
                Ok(Stmt::Unless(self.parse_if_tail()?))
            }
            TokenKind::For => self.parse_for(),
            TokenKind::While => {
                self.advance();
                let cond = self.parse_expression()?;
                let body = self.parse_block()?;
                Ok(Stmt::While(WhileStmt { cond, body }))
            }
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Match => self.parse_match(),
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Break)
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Continue)
            }
            _ => self.parse_expr_statement(),
        }
    }

    /// Conditions take no parentheses; `else` accepts only a plain block.
    fn parse_if_tail(&mut self) -> Result<IfStmt, ParseError> {
        let cond = self.parse_expression()?;
        let then_block = self.parse_block()?;
        self.skip_newlines();
        let else_block = if self.peek_kind() == TokenKind::Else {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(IfStmt {
            cond,
            then_block,
            else_block,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::For)?;

        // init, without its own semicolon
        let init = if self.peek_kind() == TokenKind::Semicolon {
            None
        } else if self.peek_kind() == TokenKind::Def {
            self.advance();
            let mutability = match self.peek_kind() {
                TokenKind::Mut => {
                    self.advance();
                    Mutability::Mutable
                }
                TokenKind::Const => {
                    self.advance();
                    Mutability::Const
                }
                _ => Mutability::Immutable,
            };
            let name = self.expect(TokenKind::Identifier)?.lexeme;
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type()?;
            self.expect(TokenKind::Assign)?;
            let init = self.parse_expression()?;
            Some(Box::new(Stmt::Var(VarDecl {
                name,
                ty,
                init: Some(init),
                mutability,
                resolved_ty: Default::default(),
            })))
        } else {
            Some(Box::new(self.parse_simple_statement()?))
        };
        self.expect(TokenKind::Semicolon)?;

        let cond = if self.peek_kind() == TokenKind::Semicolon {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon)?;

        let update = if self.peek_kind() == TokenKind::LBrace {
            None
        } else {
            Some(Box::new(self.parse_simple_statement()?))
        };

        let body = self.parse_block()?;
        Ok(Stmt::For(ForStmt {
            init,
            cond,
            update,
            body,
        }))
    }

    /// An assignment or expression without a trailing semicolon, as used in
    /// `for` init/update position.
    fn parse_simple_statement(&mut self) -> Result<Stmt, ParseError> {
        if self.peek_kind() == TokenKind::Identifier && self.peek_next_kind() == TokenKind::Assign {
            let target = self.advance().lexeme;
            self.advance(); // '='
            let value = self.parse_expression()?;
            Ok(Stmt::Assign { target, value })
        } else {
            Ok(Stmt::Expr(self.parse_expression()?))
        }
    }

    fn parse_switch(&mut self) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::Switch)?;
        let expr = self.parse_expression()?;
        self.expect(TokenKind::LBrace)?;
        let mut cases = Vec::new();
        let mut default = None;
        loop {
            self.skip_newlines();
            match self.peek_kind() {
                TokenKind::RBrace => break,
                TokenKind::Case => {
                    self.advance();
                    let value = self.parse_expression()?;
                    self.expect(TokenKind::Colon)?;
                    let body = self.parse_case_body()?;
                    cases.push(SwitchCase { value, body });
                }
                TokenKind::Default => {
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    default = Some(self.parse_case_body()?);
                }
                _ => return Err(self.invalid("expected 'case' or 'default' in switch body")),
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Stmt::Switch(SwitchStmt {
            expr,
            cases,
            default,
        }))
    }

    /// Statements up to the next `case`, `default`, or closing brace.
    fn parse_case_body(&mut self) -> Result<Block, ParseError> {
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek_kind() {
                TokenKind::Case | TokenKind::Default | TokenKind::RBrace | TokenKind::Eof => break,
                _ => stmts.push(self.parse_statement()?),
            }
        }
        Ok(Block { stmts })
    }

    fn parse_match(&mut self) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::Match)?;
        let expr = self.parse_expression()?;
        self.expect(TokenKind::LBrace)?;
        let mut cases = Vec::new();
        loop {
            self.skip_newlines();
            if matches!(self.peek_kind(), TokenKind::RBrace | TokenKind::Eof) {
                break;
            }
            let pattern = if self.peek_kind() == TokenKind::Underscore {
                self.advance();
                None
            } else {
                Some(self.parse_expression()?)
            };
            self.expect(TokenKind::FatArrow)?;
            let body = self.parse_block()?;
            cases.push(MatchCase { pattern, body });
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Stmt::Match(MatchStmt { expr, cases }))
    }

    fn parse_expr_statement(&mut self) -> Result<Stmt, ParseError> {
        // `*ptr = value;` is a store through the pointer; a bare `*expr`
        // without `=` falls back to an ordinary expression statement.
        if self.peek_kind() == TokenKind::Star {
            self.advance();
            let target = self.parse_primary()?;
            if self.peek_kind() == TokenKind::Assign {
                self.advance();
                let value = self.parse_expression()?;
                self.expect(TokenKind::Semicolon)?;
                return Ok(Stmt::PtrAssign { target, value });
            }
            let deref = Expr::Unary {
                op: UnOp::Dereference,
                operand: Box::new(target),
                resolved_ty: Default::default(),
            };
            let expr = self.continue_expression(deref)?;
            self.expect(TokenKind::Semicolon)?;
            return Ok(Stmt::Expr(expr));
        }
        if self.peek_kind() == TokenKind::Identifier && self.peek_next_kind() == TokenKind::Assign {
            let target = self.advance().lexeme;
            self.advance(); // '='
            let value = self.parse_expression()?;
            self.expect(TokenKind::Semicolon)?;
            return Ok(Stmt::Assign { target, value });
        }
        let expr = self.parse_expression()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(Stmt::Expr(expr))
    }

    // ── Expressions ──

    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;
        self.continue_comparison(left)
    }

    fn continue_comparison(&mut self, mut left: Expr) -> Result<Expr, ParseError> {
        loop {
            let op = match self.peek_kind() {
                TokenKind::Eq => BinOp::Eq,
                TokenKind::Ne => BinOp::Ne,
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Ge => BinOp::Ge,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                resolved_ty: Default::default(),
            };
        }
    }

    /// Resume expression parsing with an already-parsed left operand, used
    /// by the statement parser after its lookahead committed to the operand.
    fn continue_expression(&mut self, left: Expr) -> Result<Expr, ParseError> {
        let left = self.continue_additive(left)?;
        self.continue_comparison(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_multiplicative()?;
        self.continue_additive(left)
    }

    fn continue_additive(&mut self, mut left: Expr) -> Result<Expr, ParseError> {
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                resolved_ty: Default::default(),
            };
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_primary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_primary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                resolved_ty: Default::default(),
            };
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        while self.peek_kind() != TokenKind::RParen {
            args.push(self.parse_expression()?);
            if self.peek_kind() == TokenKind::Comma {
                self.advance();
            } else if self.peek_kind() != TokenKind::RParen {
                let tok = self.current().clone();
                return Err(ParseError::Unexpected {
                    expected: "',' or ')'".to_string(),
                    found: Self::found_name(&tok),
                    line: tok.line,
                });
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek_kind() {
            TokenKind::Ampersand => {
                self.advance();
                let operand = self.parse_primary()?;
                Ok(Expr::Unary {
                    op: UnOp::AddressOf,
                    operand: Box::new(operand),
                    resolved_ty: Default::default(),
                })
            }
            TokenKind::Star => {
                self.advance();
                let operand = self.parse_primary()?;
                Ok(Expr::Unary {
                    op: UnOp::Dereference,
                    operand: Box::new(operand),
                    resolved_ty: Default::default(),
                })
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::StringLit => {
                let tok = self.advance();
                Ok(Expr::literal(tok.lexeme, "string"))
            }
            TokenKind::IntLit => {
                let tok = self.advance();
                Ok(Expr::literal(tok.lexeme, "i32"))
            }
            TokenKind::FloatLit => {
                let tok = self.advance();
                Ok(Expr::literal(tok.lexeme, "f32"))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::literal("true", "bool"))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::literal("false", "bool"))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::literal("null", "void"))
            }
            TokenKind::Identifier => {
                let name = self.advance().lexeme;
                self.parse_identifier_suffix(name)
            }
            _ => {
                let tok = self.current().clone();
                Err(ParseError::Unexpected {
                    expected: "an expression".to_string(),
                    found: Self::found_name(&tok),
                    line: tok.line,
                })
            }
        }
    }

    fn parse_identifier_suffix(&mut self, name: String) -> Result<Expr, ParseError> {
        match self.peek_kind() {
            TokenKind::Dot => {
                self.advance();
                let member = self.expect(TokenKind::Identifier)?.lexeme;
                if name == "std" {
                    // Qualified builtin: the callee name is the literal
                    // string `std.member`.
                    let qualified = format!("{}.{}", name, member);
                    if self.peek_kind() == TokenKind::LParen {
                        let args = self.parse_call_args()?;
                        Ok(Expr::Call {
                            callee: qualified,
                            args,
                        })
                    } else {
                        Ok(Expr::identifier(qualified))
                    }
                } else if self.peek_kind() == TokenKind::LParen {
                    let args = self.parse_call_args()?;
                    Ok(Expr::MethodCall {
                        object: Box::new(Expr::identifier(name)),
                        method: member,
                        args,
                        resolved_ty: Default::default(),
                    })
                } else {
                    Ok(Expr::FieldAccess {
                        object: Box::new(Expr::identifier(name)),
                        field: member,
                        resolved_ty: Default::default(),
                    })
                }
            }
            TokenKind::LParen => {
                let args = self.parse_call_args()?;
                Ok(Expr::Call { callee: name, args })
            }
            TokenKind::LBrace => {
                // A record literal only when the identifier is capitalized;
                // otherwise the brace belongs to the surrounding construct.
                if name.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
                    self.parse_struct_literal(name)
                } else {
                    Ok(Expr::identifier(name))
                }
            }
            _ => Ok(Expr::identifier(name)),
        }
    }

    fn parse_struct_literal(&mut self, type_name: String) -> Result<Expr, ParseError> {
        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        loop {
            self.skip_newlines();
            if matches!(self.peek_kind(), TokenKind::RBrace | TokenKind::Eof) {
                break;
            }
            let field_name = self.expect(TokenKind::Identifier)?.lexeme;
            self.expect(TokenKind::Colon)?;
            let value = self.parse_expression()?;
            fields.push((field_name, value));
            match self.peek_kind() {
                TokenKind::Comma => {
                    self.advance();
                }
                TokenKind::RBrace | TokenKind::Newline => {}
                _ => {
                    let tok = self.current().clone();
                    return Err(ParseError::Unexpected {
                        expected: "',' or '}'".to_string(),
                        found: Self::found_name(&tok),
                        line: tok.line,
                    });
                }
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Expr::StructLiteral {
            type_name,
            fields,
            resolved_ty: Default::default(),
        })
    }
}

/// Lex and parse a source string in one step.
pub fn parse_source(source: &str) -> Result<Program, ParseError> {
    let tokens = crate::compiler::lexer::Lexer::new(source).tokenize();
    Parser::new(tokens).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        parse_source(source).expect("program should parse")
    }

    #[test]
    fn parses_imports_with_sigils() {
        let program = parse("import \"@std\"\nimport \"#vectors\"\nimport \"./util\"\n");
        assert_eq!(program.imports.len(), 3);
        assert_eq!(program.imports[0].kind, ImportKind::Std);
        assert_eq!(program.imports[0].path, "std");
        assert_eq!(program.imports[1].kind, ImportKind::External);
        assert_eq!(program.imports[1].path, "vectors");
        assert_eq!(program.imports[2].kind, ImportKind::Local);
        assert_eq!(program.imports[2].path, "util");
    }

    #[test]
    fn rejects_unsigiled_import() {
        assert!(parse_source("import \"plain\"\n").is_err());
    }

    #[test]
    fn parses_function_with_params() {
        let program = parse("def add(a: i32, b: i32) -> i32 { return a + b; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!("expected function");
        };
        assert_eq!(f.name, "add");
        assert_eq!(f.ret_ty, "i32");
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.params[1].ty, "i32");
        assert_eq!(f.body.stmts.len(), 1);
    }

    #[test]
    fn assignment_vs_expression_statement() {
        let program = parse("def main() -> i32 { def mut x: i32 = 1; x = 2; x + 1; return x; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!()
        };
        assert!(matches!(f.body.stmts[0], Stmt::Var(_)));
        assert!(matches!(f.body.stmts[1], Stmt::Assign { .. }));
        assert!(matches!(f.body.stmts[2], Stmt::Expr(_)));
    }

    #[test]
    fn pointer_assignment_statement() {
        let program = parse("def main() -> i32 { *p = 42; return 0; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!()
        };
        assert!(matches!(f.body.stmts[0], Stmt::PtrAssign { .. }));
    }

    #[test]
    fn address_of_and_dereference() {
        let program = parse("def main() -> i32 { def p: *i32 = &v; return *p; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!()
        };
        let Stmt::Var(var) = &f.body.stmts[0] else {
            panic!()
        };
        assert_eq!(var.ty, "*i32");
        assert!(matches!(
            var.init,
            Some(Expr::Unary {
                op: UnOp::AddressOf,
                ..
            })
        ));
    }

    #[test]
    fn struct_with_fields_and_methods() {
        let program = parse(
            "def struct Point {\n  x: i32;\n  y: i32;\n  pub sum() -> i32 { return x + y; }\n  priv reset() { x = 0; }\n}",
        );
        let Decl::Struct(s) = &program.decls[0] else {
            panic!()
        };
        assert_eq!(s.fields.len(), 2);
        assert_eq!(s.methods.len(), 2);
        assert_eq!(s.methods[0].visibility, Visibility::Public);
        assert_eq!(s.methods[0].ret_ty, "i32");
        // omitted arrow defaults to void
        assert_eq!(s.methods[1].ret_ty, "void");
    }

    #[test]
    fn enum_declaration() {
        let program = parse("def enum Color { Red, Green, Blue }");
        let Decl::Enum(e) = &program.decls[0] else {
            panic!()
        };
        assert_eq!(e.variants.len(), 3);
        assert_eq!(e.variants[2].name, "Blue");
    }

    #[test]
    fn record_literal_needs_uppercase() {
        let program = parse("def main() -> i32 { def p: Point = Point { x: 1, y: 2 }; return 0; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!()
        };
        let Stmt::Var(var) = &f.body.stmts[0] else {
            panic!()
        };
        assert!(matches!(var.init, Some(Expr::StructLiteral { .. })));

        // lowercase identifier before '{' is not a record literal
        let program = parse("def main() -> i32 { while x { break; } return 0; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!()
        };
        assert!(matches!(f.body.stmts[0], Stmt::While(_)));
    }

    #[test]
    fn qualified_std_call_keeps_dotted_name() {
        let program = parse("def main() -> i32 { std.println(\"hi\"); return 0; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!()
        };
        let Stmt::Expr(Expr::Call { callee, args }) = &f.body.stmts[0] else {
            panic!("expected call statement");
        };
        assert_eq!(callee, "std.println");
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn method_call_and_field_access() {
        let program = parse("def main() -> i32 { def a: i32 = p.sum(1); return p.x; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!()
        };
        let Stmt::Var(var) = &f.body.stmts[0] else {
            panic!()
        };
        assert!(matches!(var.init, Some(Expr::MethodCall { .. })));
        let Stmt::Return(Some(Expr::FieldAccess { field, .. })) = &f.body.stmts[1] else {
            panic!("expected field access in return");
        };
        assert_eq!(field, "x");
    }

    #[test]
    fn precedence_mul_binds_tighter_than_add_and_cmp() {
        let program = parse("def main() -> i32 { return 1 + 2 * 3 < 4; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!()
        };
        let Stmt::Return(Some(Expr::Binary { op, left, .. })) = &f.body.stmts[0] else {
            panic!()
        };
        assert_eq!(*op, BinOp::Lt);
        let Expr::Binary { op, right, .. } = left.as_ref() else {
            panic!()
        };
        assert_eq!(*op, BinOp::Add);
        assert!(matches!(
            right.as_ref(),
            Expr::Binary { op: BinOp::Mul, .. }
        ));
    }

    #[test]
    fn for_loop_with_empty_init() {
        let program = parse("def main() -> i32 { for ; i < 3; i = i + 1 {} return i; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!()
        };
        let Stmt::For(for_stmt) = &f.body.stmts[0] else {
            panic!()
        };
        assert!(for_stmt.init.is_none());
        assert!(for_stmt.cond.is_some());
        assert!(matches!(
            for_stmt.update.as_deref(),
            Some(Stmt::Assign { .. })
        ));
    }

    #[test]
    fn for_loop_with_decl_init() {
        let program = parse("def main() -> i32 { for def mut i: i32 = 0; i < 3; i = i + 1 {} return 0; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!()
        };
        let Stmt::For(for_stmt) = &f.body.stmts[0] else {
            panic!()
        };
        assert!(matches!(for_stmt.init.as_deref(), Some(Stmt::Var(_))));
    }

    #[test]
    fn switch_with_cases_and_default() {
        let program = parse(
            "def main() -> i32 { switch x { case 1: return 1; case 2: return 2; default: return 0; } }",
        );
        let Decl::Function(f) = &program.decls[0] else {
            panic!()
        };
        let Stmt::Switch(sw) = &f.body.stmts[0] else {
            panic!()
        };
        assert_eq!(sw.cases.len(), 2);
        assert!(sw.default.is_some());
    }

    #[test]
    fn match_with_wildcard() {
        let program =
            parse("def main() -> i32 { match x { 1 => { return 1; } _ => { return 0; } } }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!()
        };
        let Stmt::Match(m) = &f.body.stmts[0] else {
            panic!()
        };
        assert_eq!(m.cases.len(), 2);
        assert!(m.cases[0].pattern.is_some());
        assert!(m.cases[1].pattern.is_none());
    }

    #[test]
    fn unless_with_else() {
        let program = parse("def main() -> i32 { unless x { return 1; } else { return 2; } }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!()
        };
        let Stmt::Unless(u) = &f.body.stmts[0] else {
            panic!()
        };
        assert!(u.else_block.is_some());
    }

    #[test]
    fn top_level_const_and_mut() {
        let program = parse("def const PI: i32 = 3;\ndef mut COUNTER: i32 = 0;\n");
        let Decl::Var(v) = &program.decls[0] else {
            panic!()
        };
        assert_eq!(v.mutability, Mutability::Const);
        let Decl::Var(v) = &program.decls[1] else {
            panic!()
        };
        assert_eq!(v.mutability, Mutability::Mutable);
    }

    #[test]
    fn error_mentions_expected_and_line() {
        let err = parse_source("def main() -> i32 {\n  return 1\n}").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("expected"), "got: {msg}");
        assert!(msg.contains("line"), "got: {msg}");
    }

    #[test]
    fn unknown_token_is_a_hard_error() {
        assert!(parse_source("def main() -> i32 { return $; }").is_err());
    }
}
