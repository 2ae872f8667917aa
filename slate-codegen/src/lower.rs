//! AST-to-Cranelift lowering.
//!
//! Consumes a resolved `Program` and produces an `ObjectModule`. Variables
//! live in explicit stack slots so that `&x` is the slot address and
//! parameters can be re-read and re-assigned uniformly. Record values are
//! carried as addresses; loads and stores go through the registry's packed
//! byte offsets. Builtins (`std.*`, `cast`) lower to direct calls on a
//! fixed set of C-ABI shims declared at module construction.
//!
//! Lowering is two-pass: every function signature (including mangled
//! record methods) is declared first, then bodies are defined, so forward
//! references and recursion need no special handling.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::stackslot::{StackSlotData, StackSlotKind};
use cranelift_codegen::ir::{
    types, AbiParam, Block as ClifBlock, FuncRef, Function, GlobalValue, InstBuilder, MemFlags,
    Signature, StackSlot, Type as ClifType, UserFuncName, Value,
};
use cranelift_codegen::Context;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext, Switch};
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module};
use cranelift_object::ObjectModule;

use slate_compiler::compiler::ast::*;
use slate_compiler::compiler::types::{
    make_pointer, RecordId, Scalar, TypeKind, TypeRegistry,
};

use crate::context::CodegenContext;
use crate::emit::CodegenError;
use crate::types::{cl_type_of, scalar_cl_type};

/// Result of lowering a program: the populated object module, plus the
/// textual IR of every function when it was requested (`--debug`/`--ast`).
pub struct LoweredModule {
    pub module: ObjectModule,
    pub ir: Vec<String>,
}

/// Lower a resolved program into an object module.
///
/// `base_dir` anchors import resolution: local imports are read from
/// `<base_dir>/<path>.src` and external ones from
/// `<base_dir>/includes/<name>.src`. Imported files are re-parsed and
/// re-resolved against the same registry, and their functions are lowered
/// into this module as if declared in it.
pub fn lower_program(
    context: CodegenContext,
    program: &Program,
    registry: &mut TypeRegistry,
    base_dir: &Path,
    want_ir: bool,
) -> Result<LoweredModule, CodegenError> {
    let imported = load_imports(program, registry, base_dir)?;
    let registry: &TypeRegistry = registry;
    let ptr_type = context.pointer_type();
    let mut lowerer = Lowerer::new(context.module, registry, ptr_type, want_ir)?;

    for decl in &program.decls {
        if let Decl::Var(v) = decl {
            lowerer.define_global(v)?;
        }
    }

    // Declare pass: all signatures, methods under their mangled names.
    for decl in &program.decls {
        match decl {
            Decl::Function(f) => {
                lowerer.declare_user_function(&f.name, &f.params, &f.ret_ty, None)?
            }
            Decl::Struct(s) => {
                let id = lowerer.record_id(&s.name)?;
                for m in &s.methods {
                    let mangled = format!("{}_{}", s.name, m.name);
                    lowerer.declare_user_function(&mangled, &m.params, &m.ret_ty, Some(id))?;
                }
            }
            _ => {}
        }
    }
    for prog in &imported {
        for decl in &prog.decls {
            if let Decl::Function(f) = decl {
                lowerer.declare_user_function(&f.name, &f.params, &f.ret_ty, None)?;
            }
        }
    }

    // Define pass.
    for decl in &program.decls {
        match decl {
            Decl::Function(f) => lowerer.lower_function_body(&f.name, &f.params, &f.body, None)?,
            Decl::Struct(s) => {
                let id = lowerer.record_id(&s.name)?;
                for m in &s.methods {
                    let mangled = format!("{}_{}", s.name, m.name);
                    lowerer.lower_function_body(&mangled, &m.params, &m.body, Some(id))?;
                }
            }
            _ => {}
        }
    }
    for prog in &imported {
        for decl in &prog.decls {
            if let Decl::Function(f) = decl {
                lowerer.lower_function_body(&f.name, &f.params, &f.body, None)?;
            }
        }
    }

    Ok(LoweredModule {
        module: lowerer.module,
        ir: lowerer.ir,
    })
}

/// Parse and resolve every imported source file. Only the top-level
/// program's import list is consulted; `@std` needs no file.
fn load_imports(
    program: &Program,
    registry: &mut TypeRegistry,
    base_dir: &Path,
) -> Result<Vec<Program>, CodegenError> {
    let mut out = Vec::new();
    for import in &program.imports {
        let path = match import.kind {
            ImportKind::Std => continue,
            ImportKind::Local => base_dir.join(format!("{}.src", import.path)),
            ImportKind::External => base_dir
                .join("includes")
                .join(format!("{}.src", import.path)),
        };
        let source = std::fs::read_to_string(&path).map_err(|e| {
            CodegenError::Rejected(format!(
                "cannot open import file {}: {e}",
                path.display()
            ))
        })?;
        let imported = slate_compiler::compile_source(&source, registry).map_err(|e| {
            CodegenError::Rejected(format!("{e} (in import '{}')", path.display()))
        })?;
        out.push(imported);
    }
    Ok(out)
}

#[derive(Clone)]
struct FuncInfo {
    id: FuncId,
    sig: Signature,
    /// Declared parameter types, excluding the implicit method receiver.
    params: Vec<TypeKind>,
    ret: TypeKind,
    is_method: bool,
}

/// Pre-declared C-ABI shim functions builtins lower into. `puts`,
/// `strlen`, and `realloc` are part of the fixed shim set but have no
/// builtin caller yet.
#[allow(dead_code)]
struct Shims {
    printf: FuncId,
    puts: FuncId,
    scanf: FuncId,
    getline: FuncId,
    strlen: FuncId,
    atoi: FuncId,
    atol: FuncId,
    sprintf: FuncId,
    malloc: FuncId,
    free: FuncId,
    realloc: FuncId,
}

impl Shims {
    fn declare(module: &mut ObjectModule, ptr: ClifType) -> Result<Self, CodegenError> {
        // Variadic callees are declared with the argument list every call
        // site actually uses; integer varargs are widened to 64 bits.
        Ok(Shims {
            printf: declare_shim(module, "printf", &[ptr, types::I64], &[types::I32])?,
            puts: declare_shim(module, "puts", &[ptr], &[types::I32])?,
            scanf: declare_shim(module, "scanf", &[ptr, ptr], &[types::I32])?,
            getline: declare_shim(module, "getline", &[ptr, ptr, ptr], &[types::I64])?,
            strlen: declare_shim(module, "strlen", &[ptr], &[types::I64])?,
            atoi: declare_shim(module, "atoi", &[ptr], &[types::I32])?,
            atol: declare_shim(module, "atol", &[ptr], &[types::I64])?,
            sprintf: declare_shim(module, "sprintf", &[ptr, ptr, types::I64], &[types::I32])?,
            malloc: declare_shim(module, "malloc", &[types::I64], &[ptr])?,
            free: declare_shim(module, "free", &[ptr], &[])?,
            realloc: declare_shim(module, "realloc", &[ptr, types::I64], &[ptr])?,
        })
    }
}

fn declare_shim(
    module: &mut ObjectModule,
    name: &str,
    params: &[ClifType],
    returns: &[ClifType],
) -> Result<FuncId, CodegenError> {
    let mut sig = module.make_signature();
    for &p in params {
        sig.params.push(AbiParam::new(p));
    }
    for &r in returns {
        sig.returns.push(AbiParam::new(r));
    }
    module
        .declare_function(name, Linkage::Import, &sig)
        .map_err(|e| CodegenError::Rejected(format!("declare_function({name}): {e}")))
}

fn cl_type(
    registry: &TypeRegistry,
    ptr: ClifType,
    ty: TypeKind,
) -> Result<ClifType, CodegenError> {
    cl_type_of(ty, ptr).ok_or_else(|| {
        CodegenError::Rejected(format!(
            "type '{}' has no runtime representation",
            registry.type_name(ty)
        ))
    })
}

#[derive(Clone, Copy)]
enum Storage {
    /// A local stack slot.
    Slot(StackSlot),
    /// A computed address, used for record fields inside methods.
    Addr(Value),
    /// A module data object, used for top-level declarations.
    Data(DataId),
}

#[derive(Clone)]
struct Binding {
    name: String,
    storage: Storage,
    ty: TypeKind,
    mutability: Mutability,
}

struct GlobalBinding {
    name: String,
    data: DataId,
    ty: TypeKind,
    mutability: Mutability,
}

struct LoopCtx {
    break_target: ClifBlock,
    continue_target: ClifBlock,
}

struct Lowerer<'a> {
    module: ObjectModule,
    registry: &'a TypeRegistry,
    ptr_type: ClifType,
    funcs: HashMap<String, FuncInfo>,
    globals: Vec<GlobalBinding>,
    /// NUL-terminated byte contents → data object, deduplicated per module.
    strings: HashMap<Vec<u8>, DataId>,
    shims: Shims,
    stdin_data: DataId,
    want_ir: bool,
    ir: Vec<String>,
}

impl<'a> Lowerer<'a> {
    fn new(
        mut module: ObjectModule,
        registry: &'a TypeRegistry,
        ptr_type: ClifType,
        want_ir: bool,
    ) -> Result<Self, CodegenError> {
        let shims = Shims::declare(&mut module, ptr_type)?;
        let stdin_data = module
            .declare_data("stdin", Linkage::Import, true, false)
            .map_err(|e| CodegenError::Rejected(format!("declare_data(stdin): {e}")))?;
        Ok(Self {
            module,
            registry,
            ptr_type,
            funcs: HashMap::new(),
            globals: Vec::new(),
            strings: HashMap::new(),
            shims,
            stdin_data,
            want_ir,
            ir: Vec::new(),
        })
    }

    fn record_id(&self, name: &str) -> Result<RecordId, CodegenError> {
        self.registry
            .record_by_name(name)
            .map(|r| r.id)
            .ok_or_else(|| CodegenError::Rejected(format!("record '{name}' is not registered")))
    }

    /// Top-level `def`/`def mut`/`def const` become module data objects.
    /// Initializers must be constant literals.
    fn define_global(&mut self, v: &VarDecl) -> Result<(), CodegenError> {
        let ty = v.resolved_ty;
        if ty == TypeKind::Unknown {
            return Err(CodegenError::Rejected(format!(
                "unknown type '{}' for global '{}'",
                v.ty, v.name
            )));
        }
        let size = self.registry.info(ty).size_bytes as usize;
        if size == 0 {
            return Err(CodegenError::Rejected(format!(
                "cannot declare global '{}' of type '{}'",
                v.name, v.ty
            )));
        }
        let init = v.init.as_ref().and_then(|e| const_bytes(e, ty, size));
        let bytes = init.ok_or_else(|| {
            CodegenError::Rejected(format!(
                "initializer for global '{}' must be a constant literal",
                v.name
            ))
        })?;
        let writable = v.mutability == Mutability::Mutable;
        let data = self
            .module
            .declare_data(&v.name, Linkage::Local, writable, false)
            .map_err(|e| CodegenError::Rejected(format!("declare_data({}): {e}", v.name)))?;
        let mut desc = DataDescription::new();
        desc.define(bytes.into_boxed_slice());
        self.module
            .define_data(data, &desc)
            .map_err(|e| CodegenError::Rejected(format!("define_data({}): {e}", v.name)))?;
        self.globals.push(GlobalBinding {
            name: v.name.clone(),
            data,
            ty,
            mutability: v.mutability,
        });
        Ok(())
    }

    fn declare_user_function(
        &mut self,
        name: &str,
        params: &[Param],
        ret_name: &str,
        self_record: Option<RecordId>,
    ) -> Result<(), CodegenError> {
        if self.funcs.contains_key(name) {
            return Err(CodegenError::Rejected(format!(
                "function '{name}' is already defined"
            )));
        }
        let mut sig = self.module.make_signature();
        if self_record.is_some() {
            // The receiver is a pointer to the record.
            sig.params.push(AbiParam::new(self.ptr_type));
        }
        let mut param_tys = Vec::with_capacity(params.len());
        for p in params {
            let ty = p.resolved_ty;
            if ty == TypeKind::Unknown {
                return Err(CodegenError::Rejected(format!(
                    "unknown type '{}' for parameter '{}' of '{name}'",
                    p.ty, p.name
                )));
            }
            let cl = cl_type(self.registry, self.ptr_type, ty).map_err(|_| {
                CodegenError::Rejected(format!(
                    "parameter '{}' of '{name}' cannot have type '{}'",
                    p.name, p.ty
                ))
            })?;
            sig.params.push(AbiParam::new(cl));
            param_tys.push(ty);
        }
        let ret = self.registry.type_from_name(ret_name);
        match ret {
            TypeKind::VOID => {}
            TypeKind::Unknown => {
                return Err(CodegenError::Rejected(format!(
                    "unknown return type '{ret_name}' for '{name}'"
                )))
            }
            _ => {
                let cl = cl_type(self.registry, self.ptr_type, ret)?;
                sig.returns.push(AbiParam::new(cl));
            }
        }
        let id = self
            .module
            .declare_function(name, Linkage::Export, &sig)
            .map_err(|e| CodegenError::Rejected(format!("declare_function({name}): {e}")))?;
        self.funcs.insert(
            name.to_string(),
            FuncInfo {
                id,
                sig,
                params: param_tys,
                ret,
                is_method: self_record.is_some(),
            },
        );
        Ok(())
    }

    fn lower_function_body(
        &mut self,
        name: &str,
        params: &[Param],
        body: &Block,
        self_record: Option<RecordId>,
    ) -> Result<(), CodegenError> {
        let info = self
            .funcs
            .get(name)
            .cloned()
            .expect("function was declared in the first pass");

        let mut fb_ctx = FunctionBuilderContext::new();
        let mut func = Function::with_name_signature(
            UserFuncName::user(0, info.id.as_u32()),
            info.sig.clone(),
        );
        let builder = FunctionBuilder::new(&mut func, &mut fb_ctx);

        let mut fx = FnLowerer {
            module: &mut self.module,
            registry: self.registry,
            funcs: &self.funcs,
            globals: &self.globals,
            strings: &mut self.strings,
            shims: &self.shims,
            stdin_data: self.stdin_data,
            ptr_type: self.ptr_type,
            builder,
            ret_ty: info.ret,
            scopes: vec![Vec::new()],
            loops: Vec::new(),
            terminated: false,
            func_refs: HashMap::new(),
            data_gvs: HashMap::new(),
        };

        let entry = fx.builder.create_block();
        fx.builder.append_block_params_for_function_params(entry);
        fx.builder.switch_to_block(entry);
        let param_vals: Vec<Value> = fx.builder.block_params(entry).to_vec();

        let self_offset = if let Some(rec_id) = self_record {
            // Record fields become directly addressable names inside the
            // method body, through the receiver pointer.
            let self_val = param_vals[0];
            let record = fx
                .registry
                .record(rec_id)
                .cloned()
                .expect("method receiver record is registered");
            for field in &record.fields {
                let addr = fx.builder.ins().iadd_imm(self_val, field.offset as i64);
                fx.scopes[0].push(Binding {
                    name: field.name.clone(),
                    storage: Storage::Addr(addr),
                    ty: field.ty,
                    mutability: Mutability::Mutable,
                });
            }
            1
        } else {
            0
        };

        // Spill every parameter to a slot so it can be re-loaded or
        // re-assigned like any local.
        for (i, p) in params.iter().enumerate() {
            let ty = p.resolved_ty;
            let size = fx.registry.info(ty).size_bytes;
            let slot = fx.create_slot(size);
            let incoming = param_vals[i + self_offset];
            if let TypeKind::Record(id) = ty {
                let dst = fx.builder.ins().stack_addr(fx.ptr_type, slot, 0);
                fx.copy_record(incoming, dst, id)?;
            } else {
                fx.builder.ins().stack_store(incoming, slot, 0);
            }
            fx.scopes[0].push(Binding {
                name: p.name.clone(),
                storage: Storage::Slot(slot),
                ty,
                mutability: Mutability::Mutable,
            });
        }

        fx.lower_block(body)?;
        if !fx.terminated {
            fx.emit_default_return()?;
        }

        let FnLowerer { mut builder, .. } = fx;
        builder.seal_all_blocks();
        builder.finalize();

        if self.want_ir {
            self.ir.push(format!("{}", func.display()));
        }
        let mut ctx = Context::for_function(func);
        self.module
            .define_function(info.id, &mut ctx)
            .map_err(|e| CodegenError::Rejected(format!("define_function({name}): {e}")))?;
        Ok(())
    }
}

/// Constant initializer encoding for globals: little-endian bytes of the
/// declared size.
fn const_bytes(expr: &Expr, ty: TypeKind, size: usize) -> Option<Vec<u8>> {
    let Expr::Literal { text, ty: lit_ty, .. } = expr else {
        return None;
    };
    match ty {
        TypeKind::Scalar(s) if s.is_integer() || s == Scalar::Char => {
            let v: i128 = text.parse().ok()?;
            Some(v.to_le_bytes()[..size].to_vec())
        }
        TypeKind::Scalar(Scalar::Bool) => Some(vec![(text == "true") as u8]),
        TypeKind::Scalar(Scalar::F32) if lit_ty == "f32" => {
            let f: f32 = text.parse().ok()?;
            Some(f.to_le_bytes().to_vec())
        }
        TypeKind::Scalar(Scalar::F64) if lit_ty == "f32" => {
            let f: f64 = text.parse().ok()?;
            Some(f.to_le_bytes().to_vec())
        }
        _ => None,
    }
}

struct FnLowerer<'a, 'b> {
    module: &'a mut ObjectModule,
    registry: &'a TypeRegistry,
    funcs: &'a HashMap<String, FuncInfo>,
    globals: &'a [GlobalBinding],
    strings: &'a mut HashMap<Vec<u8>, DataId>,
    shims: &'a Shims,
    stdin_data: DataId,
    ptr_type: ClifType,
    builder: FunctionBuilder<'b>,
    ret_ty: TypeKind,
    scopes: Vec<Vec<Binding>>,
    loops: Vec<LoopCtx>,
    /// Whether the current block already ends in a terminator.
    terminated: bool,
    func_refs: HashMap<FuncId, FuncRef>,
    data_gvs: HashMap<DataId, GlobalValue>,
}

impl FnLowerer<'_, '_> {
    fn err(&self, message: impl Into<String>) -> CodegenError {
        CodegenError::Rejected(message.into())
    }

    fn type_name(&self, ty: TypeKind) -> String {
        self.registry.type_name(ty)
    }

    fn cl_type(&self, ty: TypeKind) -> Result<ClifType, CodegenError> {
        cl_type(self.registry, self.ptr_type, ty)
    }

    fn create_slot(&mut self, size: u32) -> StackSlot {
        let data = StackSlotData::new(StackSlotKind::ExplicitSlot, size.max(1), 3);
        self.builder.create_sized_stack_slot(data)
    }

    fn func_ref(&mut self, id: FuncId) -> FuncRef {
        if let Some(&r) = self.func_refs.get(&id) {
            return r;
        }
        let r = self.module.declare_func_in_func(id, self.builder.func);
        self.func_refs.insert(id, r);
        r
    }

    fn data_gv(&mut self, id: DataId) -> GlobalValue {
        if let Some(&gv) = self.data_gvs.get(&id) {
            return gv;
        }
        let gv = self.module.declare_data_in_func(id, self.builder.func);
        self.data_gvs.insert(id, gv);
        gv
    }

    fn call_shim(&mut self, id: FuncId, args: &[Value]) -> cranelift_codegen::ir::Inst {
        let fref = self.func_ref(id);
        self.builder.ins().call(fref, args)
    }

    /// Address of a NUL-terminated string data object, deduplicated.
    fn string_data(&mut self, bytes: &[u8]) -> Result<Value, CodegenError> {
        let mut contents = bytes.to_vec();
        contents.push(0);
        let id = match self.strings.get(&contents) {
            Some(&id) => id,
            None => {
                let id = self
                    .module
                    .declare_anonymous_data(false, false)
                    .map_err(|e| self.err(format!("declare_anonymous_data: {e}")))?;
                let mut desc = DataDescription::new();
                desc.define(contents.clone().into_boxed_slice());
                self.module
                    .define_data(id, &desc)
                    .map_err(|e| self.err(format!("define_data: {e}")))?;
                self.strings.insert(contents, id);
                id
            }
        };
        let gv = self.data_gv(id);
        Ok(self.builder.ins().symbol_value(self.ptr_type, gv))
    }

    fn void_value(&mut self) -> (Value, TypeKind) {
        (self.builder.ins().iconst(types::I8, 0), TypeKind::VOID)
    }

    fn zero_value(&mut self, cl: ClifType) -> Value {
        if cl == types::F32 {
            self.builder.ins().f32const(0.0)
        } else if cl == types::F64 {
            self.builder.ins().f64const(0.0)
        } else if cl == types::I128 {
            let low = self.builder.ins().iconst(types::I64, 0);
            self.builder.ins().uextend(types::I128, low)
        } else {
            self.builder.ins().iconst(cl, 0)
        }
    }

    fn emit_default_return(&mut self) -> Result<(), CodegenError> {
        if self.ret_ty == TypeKind::VOID {
            self.builder.ins().return_(&[]);
        } else {
            let cl = self.cl_type(self.ret_ty)?;
            let zero = self.zero_value(cl);
            self.builder.ins().return_(&[zero]);
        }
        self.terminated = true;
        Ok(())
    }

    // ── Symbol table ──

    fn lookup(&self, name: &str) -> Option<Binding> {
        for scope in self.scopes.iter().rev() {
            if let Some(b) = scope.iter().rev().find(|b| b.name == name) {
                return Some(b.clone());
            }
        }
        self.globals
            .iter()
            .find(|g| g.name == name)
            .map(|g| Binding {
                name: g.name.clone(),
                storage: Storage::Data(g.data),
                ty: g.ty,
                mutability: g.mutability,
            })
    }

    fn bind(&mut self, binding: Binding) {
        self.scopes
            .last_mut()
            .expect("at least the function scope exists")
            .push(binding);
    }

    fn binding_addr(&mut self, b: &Binding) -> Value {
        match b.storage {
            Storage::Slot(slot) => self.builder.ins().stack_addr(self.ptr_type, slot, 0),
            Storage::Addr(addr) => addr,
            Storage::Data(id) => {
                let gv = self.data_gv(id);
                self.builder.ins().symbol_value(self.ptr_type, gv)
            }
        }
    }

    fn load_binding(&mut self, b: &Binding) -> Result<(Value, TypeKind), CodegenError> {
        // Record values are carried as addresses.
        if b.ty.is_record() {
            return Ok((self.binding_addr(b), b.ty));
        }
        let cl = self.cl_type(b.ty)?;
        let val = match b.storage {
            Storage::Slot(slot) => self.builder.ins().stack_load(cl, slot, 0),
            Storage::Addr(addr) => self.builder.ins().load(cl, MemFlags::new(), addr, 0),
            Storage::Data(id) => {
                let gv = self.data_gv(id);
                let addr = self.builder.ins().symbol_value(self.ptr_type, gv);
                self.builder.ins().load(cl, MemFlags::new(), addr, 0)
            }
        };
        Ok((val, b.ty))
    }

    fn store_binding(&mut self, b: &Binding, val: Value) {
        match b.storage {
            Storage::Slot(slot) => {
                self.builder.ins().stack_store(val, slot, 0);
            }
            Storage::Addr(addr) => {
                self.builder.ins().store(MemFlags::new(), val, addr, 0);
            }
            Storage::Data(id) => {
                let gv = self.data_gv(id);
                let addr = self.builder.ins().symbol_value(self.ptr_type, gv);
                self.builder.ins().store(MemFlags::new(), val, addr, 0);
            }
        }
    }

    /// Field-by-field copy between record addresses, recursing into nested
    /// record fields.
    fn copy_record(&mut self, src: Value, dst: Value, id: RecordId) -> Result<(), CodegenError> {
        let record = self
            .registry
            .record(id)
            .cloned()
            .ok_or_else(|| self.err(format!("record #{id} is not registered")))?;
        for field in &record.fields {
            let off = field.offset as i32;
            if let TypeKind::Record(inner) = field.ty {
                let s = self.builder.ins().iadd_imm(src, off as i64);
                let d = self.builder.ins().iadd_imm(dst, off as i64);
                self.copy_record(s, d, inner)?;
            } else {
                let cl = self.cl_type(field.ty)?;
                let v = self.builder.ins().load(cl, MemFlags::new(), src, off);
                self.builder.ins().store(MemFlags::new(), v, dst, off);
            }
        }
        Ok(())
    }

    // ── Conversions ──

    fn int_resize(&mut self, val: Value, from: ClifType, to: ClifType, signed: bool) -> Value {
        if from.bits() < to.bits() {
            if signed {
                self.builder.ins().sextend(to, val)
            } else {
                self.builder.ins().uextend(to, val)
            }
        } else if from.bits() > to.bits() {
            self.builder.ins().ireduce(to, val)
        } else {
            val
        }
    }

    /// Automatic conversion on stores and argument passing: integers widen
    /// with source-signedness extension or truncate, `f32`/`f64` promote
    /// and demote. Everything else is stored as-is.
    fn convert_for_store(&mut self, val: Value, from: TypeKind, to: TypeKind) -> Value {
        if from == to {
            return val;
        }
        let (TypeKind::Scalar(f), TypeKind::Scalar(t)) = (from, to) else {
            return val;
        };
        if f.is_integer() && t.is_integer() {
            let from_cl = scalar_cl_type(f, self.ptr_type).expect("integer has a type");
            let to_cl = scalar_cl_type(t, self.ptr_type).expect("integer has a type");
            return self.int_resize(val, from_cl, to_cl, f.info().signed);
        }
        if f.is_float() && t.is_float() {
            return match (f, t) {
                (Scalar::F32, Scalar::F64) => self.builder.ins().fpromote(types::F64, val),
                (Scalar::F64, Scalar::F32) => self.builder.ins().fdemote(types::F32, val),
                _ => val,
            };
        }
        val
    }

    /// Widen an integer to 64 bits with signedness-matching extension, for
    /// passing to variadic C shims.
    fn widen_int(&mut self, val: Value, scalar: Scalar) -> Value {
        let from = scalar_cl_type(scalar, self.ptr_type).expect("integer has a type");
        self.int_resize(val, from, types::I64, scalar.info().signed)
    }

    // ── Statements ──

    fn lower_block(&mut self, block: &Block) -> Result<(), CodegenError> {
        self.scopes.push(Vec::new());
        for stmt in &block.stmts {
            // Statements after a terminator are unreachable and dropped.
            if self.terminated {
                break;
            }
            self.lower_stmt(stmt)?;
        }
        self.scopes.pop();
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), CodegenError> {
        match stmt {
            Stmt::Var(v) => self.lower_var_decl(v),
            Stmt::Assign { target, value } => self.lower_assign(target, value),
            Stmt::PtrAssign { target, value } => {
                let (ptr, pty) = self.lower_expr(target)?;
                if !pty.is_pointer() {
                    return Err(self.err(format!(
                        "cannot assign through non-pointer type '{}'",
                        self.type_name(pty)
                    )));
                }
                let (val, _) = self.lower_expr(value)?;
                self.builder.ins().store(MemFlags::new(), val, ptr, 0);
                Ok(())
            }
            Stmt::Return(value) => self.lower_return(value.as_ref()),
            Stmt::If(s) => self.lower_if(s, false),
            Stmt::Unless(s) => self.lower_if(s, true),
            Stmt::For(s) => self.lower_for(s),
            Stmt::While(s) => self.lower_while(s),
            Stmt::Switch(s) => self.lower_switch(s),
            Stmt::Match(s) => self.lower_match(s),
            Stmt::Break => self.lower_break_continue(true),
            Stmt::Continue => self.lower_break_continue(false),
            Stmt::Expr(e) => {
                self.lower_expr(e)?;
                Ok(())
            }
        }
    }

    fn lower_var_decl(&mut self, v: &VarDecl) -> Result<(), CodegenError> {
        let ty = v.resolved_ty;
        if ty == TypeKind::Unknown {
            return Err(self.err(format!("unknown type '{}' for variable '{}'", v.ty, v.name)));
        }
        let size = self.registry.info(ty).size_bytes;
        if size == 0 {
            return Err(self.err(format!(
                "cannot declare variable '{}' of type '{}'",
                v.name, v.ty
            )));
        }
        let slot = self.create_slot(size);
        if let Some(init) = &v.init {
            let (val, vty) = self.lower_expr(init)?;
            if let TypeKind::Record(id) = ty {
                if vty != ty {
                    return Err(self.err(format!(
                        "cannot initialize '{}' of type '{}' from a value of type '{}'",
                        v.name,
                        v.ty,
                        self.type_name(vty)
                    )));
                }
                let dst = self.builder.ins().stack_addr(self.ptr_type, slot, 0);
                self.copy_record(val, dst, id)?;
            } else {
                let val = self.convert_for_store(val, vty, ty);
                self.builder.ins().stack_store(val, slot, 0);
            }
        }
        self.bind(Binding {
            name: v.name.clone(),
            storage: Storage::Slot(slot),
            ty,
            mutability: v.mutability,
        });
        Ok(())
    }

    fn lower_assign(&mut self, target: &str, value: &Expr) -> Result<(), CodegenError> {
        let binding = self
            .lookup(target)
            .ok_or_else(|| self.err(format!("unknown variable '{target}' in assignment")))?;
        if matches!(binding.mutability, Mutability::Immutable | Mutability::Const) {
            return Err(self.err(format!("cannot assign to immutable variable '{target}'")));
        }
        let (val, vty) = self.lower_expr(value)?;
        if let TypeKind::Record(id) = binding.ty {
            if vty != binding.ty {
                return Err(self.err(format!(
                    "cannot assign a value of type '{}' to '{}'",
                    self.type_name(vty),
                    target
                )));
            }
            let dst = self.binding_addr(&binding);
            self.copy_record(val, dst, id)?;
        } else {
            let val = self.convert_for_store(val, vty, binding.ty);
            self.store_binding(&binding, val);
        }
        Ok(())
    }

    fn lower_return(&mut self, value: Option<&Expr>) -> Result<(), CodegenError> {
        match value {
            None => {
                if self.ret_ty != TypeKind::VOID {
                    return Err(self.err("return without a value in a non-void function"));
                }
                self.builder.ins().return_(&[]);
            }
            Some(e) => {
                if self.ret_ty == TypeKind::VOID {
                    return Err(self.err("cannot return a value from a void function"));
                }
                let (val, vty) = self.lower_expr(e)?;
                let val = self.convert_for_store(val, vty, self.ret_ty);
                self.builder.ins().return_(&[val]);
            }
        }
        self.terminated = true;
        Ok(())
    }

    /// `if`/`unless` share one shape; `unless` inverts the branch. The
    /// merge block is created lazily, so when every arm terminates no
    /// empty merge block is ever materialized.
    fn lower_if(&mut self, s: &IfStmt, invert: bool) -> Result<(), CodegenError> {
        let (cond, _) = self.lower_expr(&s.cond)?;
        let then_block = self.builder.create_block();
        let mut merge: Option<ClifBlock> = None;

        let else_block = if s.else_block.is_some() {
            let b = self.builder.create_block();
            if invert {
                self.builder.ins().brif(cond, b, &[], then_block, &[]);
            } else {
                self.builder.ins().brif(cond, then_block, &[], b, &[]);
            }
            Some(b)
        } else {
            let m = self.builder.create_block();
            merge = Some(m);
            if invert {
                self.builder.ins().brif(cond, m, &[], then_block, &[]);
            } else {
                self.builder.ins().brif(cond, then_block, &[], m, &[]);
            }
            None
        };

        self.builder.switch_to_block(then_block);
        self.terminated = false;
        self.lower_block(&s.then_block)?;
        if !self.terminated {
            let m = match merge {
                Some(m) => m,
                None => {
                    let m = self.builder.create_block();
                    merge = Some(m);
                    m
                }
            };
            self.builder.ins().jump(m, &[]);
        }

        if let Some(b) = else_block {
            self.builder.switch_to_block(b);
            self.terminated = false;
            self.lower_block(s.else_block.as_ref().expect("else body exists"))?;
            if !self.terminated {
                let m = match merge {
                    Some(m) => m,
                    None => {
                        let m = self.builder.create_block();
                        merge = Some(m);
                        m
                    }
                };
                self.builder.ins().jump(m, &[]);
            }
        }

        match merge {
            Some(m) => {
                self.builder.switch_to_block(m);
                self.terminated = false;
            }
            // Both arms terminated: whatever follows is unreachable.
            None => self.terminated = true,
        }
        Ok(())
    }

    fn lower_while(&mut self, s: &WhileStmt) -> Result<(), CodegenError> {
        let cond_block = self.builder.create_block();
        let body_block = self.builder.create_block();
        let exit_block = self.builder.create_block();

        self.builder.ins().jump(cond_block, &[]);
        self.builder.switch_to_block(cond_block);
        self.terminated = false;
        let (cond, _) = self.lower_expr(&s.cond)?;
        self.builder.ins().brif(cond, body_block, &[], exit_block, &[]);

        self.loops.push(LoopCtx {
            break_target: exit_block,
            continue_target: cond_block,
        });
        self.builder.switch_to_block(body_block);
        self.terminated = false;
        self.lower_block(&s.body)?;
        if !self.terminated {
            self.builder.ins().jump(cond_block, &[]);
        }
        self.loops.pop();

        self.builder.switch_to_block(exit_block);
        self.terminated = false;
        Ok(())
    }

    fn lower_for(&mut self, s: &ForStmt) -> Result<(), CodegenError> {
        let init_block = self.builder.create_block();
        let cond_block = self.builder.create_block();
        let body_block = self.builder.create_block();
        let update_block = self.builder.create_block();
        let exit_block = self.builder.create_block();

        self.builder.ins().jump(init_block, &[]);
        self.builder.switch_to_block(init_block);
        self.terminated = false;
        if let Some(init) = &s.init {
            self.lower_stmt(init)?;
        }
        self.builder.ins().jump(cond_block, &[]);

        self.builder.switch_to_block(cond_block);
        self.terminated = false;
        match &s.cond {
            Some(cond) => {
                let (c, _) = self.lower_expr(cond)?;
                self.builder.ins().brif(c, body_block, &[], exit_block, &[]);
            }
            // No condition means an infinite loop.
            None => {
                self.builder.ins().jump(body_block, &[]);
            }
        }

        self.loops.push(LoopCtx {
            break_target: exit_block,
            continue_target: update_block,
        });
        self.builder.switch_to_block(body_block);
        self.terminated = false;
        self.lower_block(&s.body)?;
        if !self.terminated {
            self.builder.ins().jump(update_block, &[]);
        }
        self.loops.pop();

        self.builder.switch_to_block(update_block);
        self.terminated = false;
        if let Some(update) = &s.update {
            self.lower_stmt(update)?;
        }
        self.builder.ins().jump(cond_block, &[]);

        self.builder.switch_to_block(exit_block);
        self.terminated = false;
        Ok(())
    }

    /// A case value must fold to an integer constant for the multi-way
    /// dispatch table.
    fn const_case_value(&self, expr: &Expr) -> Result<i128, CodegenError> {
        if let Expr::Literal { text, ty, .. } = expr {
            match ty.as_str() {
                "i32" => {
                    return text
                        .parse::<i128>()
                        .map_err(|_| self.err(format!("invalid integer literal '{text}'")))
                }
                "bool" => return Ok((text == "true") as i128),
                _ => {}
            }
        }
        Err(self.err("switch case value must be an integer literal"))
    }

    fn lower_switch(&mut self, s: &SwitchStmt) -> Result<(), CodegenError> {
        let (val, _) = self.lower_expr(&s.expr)?;
        let exit_block = self.builder.create_block();
        let default_block = if s.default.is_some() {
            self.builder.create_block()
        } else {
            exit_block
        };

        let mut switch = Switch::new();
        let mut seen = HashSet::new();
        let mut case_blocks = Vec::with_capacity(s.cases.len());
        for case in &s.cases {
            let value = self.const_case_value(&case.value)?;
            if !seen.insert(value) {
                return Err(self.err(format!("duplicate switch case value {value}")));
            }
            let block = self.builder.create_block();
            switch.set_entry(value as u128, block);
            case_blocks.push(block);
        }
        switch.emit(&mut self.builder, val, default_block);
        self.terminated = true;

        for (case, block) in s.cases.iter().zip(&case_blocks) {
            self.builder.switch_to_block(*block);
            self.terminated = false;
            self.lower_block(&case.body)?;
            if !self.terminated {
                self.builder.ins().jump(exit_block, &[]);
            }
        }
        if let Some(default) = &s.default {
            self.builder.switch_to_block(default_block);
            self.terminated = false;
            self.lower_block(default)?;
            if !self.terminated {
                self.builder.ins().jump(exit_block, &[]);
            }
        }

        self.builder.switch_to_block(exit_block);
        self.terminated = false;
        Ok(())
    }

    /// `match` lowers exactly like `switch`; the `_` pattern becomes the
    /// default target (the last wildcard wins, like repeated `default`).
    fn lower_match(&mut self, s: &MatchStmt) -> Result<(), CodegenError> {
        let (val, _) = self.lower_expr(&s.expr)?;
        let exit_block = self.builder.create_block();

        let mut switch = Switch::new();
        let mut seen = HashSet::new();
        let mut default_block = exit_block;
        let mut case_blocks = Vec::with_capacity(s.cases.len());
        for case in &s.cases {
            let block = self.builder.create_block();
            match &case.pattern {
                Some(pattern) => {
                    let value = self.const_case_value(pattern)?;
                    if !seen.insert(value) {
                        return Err(self.err(format!("duplicate match pattern {value}")));
                    }
                    switch.set_entry(value as u128, block);
                }
                None => default_block = block,
            }
            case_blocks.push(block);
        }
        switch.emit(&mut self.builder, val, default_block);
        self.terminated = true;

        for (case, block) in s.cases.iter().zip(&case_blocks) {
            self.builder.switch_to_block(*block);
            self.terminated = false;
            self.lower_block(&case.body)?;
            if !self.terminated {
                self.builder.ins().jump(exit_block, &[]);
            }
        }

        self.builder.switch_to_block(exit_block);
        self.terminated = false;
        Ok(())
    }

    fn lower_break_continue(&mut self, is_break: bool) -> Result<(), CodegenError> {
        let target = match self.loops.last() {
            Some(ctx) => {
                if is_break {
                    ctx.break_target
                } else {
                    ctx.continue_target
                }
            }
            None => {
                let which = if is_break { "break" } else { "continue" };
                return Err(self.err(format!("'{which}' used outside of a loop")));
            }
        };
        self.builder.ins().jump(target, &[]);
        self.terminated = true;
        Ok(())
    }

    // ── Expressions ──

    fn lower_expr(&mut self, expr: &Expr) -> Result<(Value, TypeKind), CodegenError> {
        match expr {
            Expr::Literal {
                text, resolved_ty, ..
            } => self.lower_literal(text, *resolved_ty),
            Expr::Identifier { name, .. } => {
                let binding = self
                    .lookup(name)
                    .ok_or_else(|| self.err(format!("unknown variable '{name}'")))?;
                self.load_binding(&binding)
            }
            Expr::Binary {
                op, left, right, ..
            } => self.lower_binary(*op, left, right),
            Expr::Unary { op, operand, .. } => self.lower_unary(*op, operand),
            Expr::Call { callee, args } => self.lower_call(callee, args),
            Expr::FieldAccess { object, field, .. } => self.lower_field_access(object, field),
            Expr::MethodCall {
                object,
                method,
                args,
                ..
            } => self.lower_method_call(object, method, args),
            Expr::StructLiteral {
                type_name,
                fields,
                resolved_ty,
            } => self.lower_struct_literal(type_name, fields, *resolved_ty),
        }
    }

    fn lower_literal(
        &mut self,
        text: &str,
        ty: TypeKind,
    ) -> Result<(Value, TypeKind), CodegenError> {
        match ty {
            TypeKind::I32 => {
                let v: i64 = text
                    .parse()
                    .map_err(|_| self.err(format!("invalid integer literal '{text}'")))?;
                Ok((self.builder.ins().iconst(types::I32, v), ty))
            }
            TypeKind::F32 => {
                let v: f32 = text
                    .parse()
                    .map_err(|_| self.err(format!("invalid float literal '{text}'")))?;
                Ok((self.builder.ins().f32const(v), ty))
            }
            TypeKind::BOOL => {
                let v = (text == "true") as i64;
                Ok((self.builder.ins().iconst(types::I8, v), ty))
            }
            TypeKind::STRING => {
                let ptr = self.string_data(text.as_bytes())?;
                Ok((ptr, ty))
            }
            TypeKind::VOID => Err(self.err("null literals are not supported")),
            _ => Err(self.err(format!("unknown literal type for '{text}'"))),
        }
    }

    fn lower_binary(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<(Value, TypeKind), CodegenError> {
        let (lhs, lt) = self.lower_expr(left)?;
        let (rhs, rt) = self.lower_expr(right)?;
        let info = self.registry.info(lt);
        let is_float = matches!(lt, TypeKind::Scalar(s) if s.is_float());

        if op.is_comparison() {
            if !self.registry.types_comparable(lt, rt) {
                return Err(self.err(format!(
                    "cannot compare incompatible types '{}' and '{}'",
                    self.type_name(lt),
                    self.type_name(rt)
                )));
            }
            let val = if is_float {
                let cc = match op {
                    BinOp::Eq => FloatCC::Equal,
                    BinOp::Ne => FloatCC::NotEqual,
                    BinOp::Lt => FloatCC::LessThan,
                    BinOp::Gt => FloatCC::GreaterThan,
                    BinOp::Le => FloatCC::LessThanOrEqual,
                    BinOp::Ge => FloatCC::GreaterThanOrEqual,
                    _ => unreachable!("comparison operator"),
                };
                self.builder.ins().fcmp(cc, lhs, rhs)
            } else {
                // Signedness-matching integer compares; equality does not
                // care either way.
                let cc = match (op, info.signed) {
                    (BinOp::Eq, _) => IntCC::Equal,
                    (BinOp::Ne, _) => IntCC::NotEqual,
                    (BinOp::Lt, true) => IntCC::SignedLessThan,
                    (BinOp::Lt, false) => IntCC::UnsignedLessThan,
                    (BinOp::Gt, true) => IntCC::SignedGreaterThan,
                    (BinOp::Gt, false) => IntCC::UnsignedGreaterThan,
                    (BinOp::Le, true) => IntCC::SignedLessThanOrEqual,
                    (BinOp::Le, false) => IntCC::UnsignedLessThanOrEqual,
                    (BinOp::Ge, true) => IntCC::SignedGreaterThanOrEqual,
                    (BinOp::Ge, false) => IntCC::UnsignedGreaterThanOrEqual,
                    _ => unreachable!("comparison operator"),
                };
                self.builder.ins().icmp(cc, lhs, rhs)
            };
            return Ok((val, TypeKind::BOOL));
        }

        if !self.registry.types_compatible(lt, rt) {
            return Err(self.err(format!(
                "cannot perform arithmetic on incompatible types '{}' and '{}'",
                self.type_name(lt),
                self.type_name(rt)
            )));
        }
        let val = if is_float {
            match op {
                BinOp::Add => self.builder.ins().fadd(lhs, rhs),
                BinOp::Sub => self.builder.ins().fsub(lhs, rhs),
                BinOp::Mul => self.builder.ins().fmul(lhs, rhs),
                BinOp::Div => self.builder.ins().fdiv(lhs, rhs),
                _ => unreachable!("arithmetic operator"),
            }
        } else {
            match op {
                BinOp::Add => self.builder.ins().iadd(lhs, rhs),
                BinOp::Sub => self.builder.ins().isub(lhs, rhs),
                BinOp::Mul => self.builder.ins().imul(lhs, rhs),
                BinOp::Div => {
                    if info.signed {
                        self.builder.ins().sdiv(lhs, rhs)
                    } else {
                        self.builder.ins().udiv(lhs, rhs)
                    }
                }
                _ => unreachable!("arithmetic operator"),
            }
        };
        Ok((val, lt))
    }

    fn lower_unary(&mut self, op: UnOp, operand: &Expr) -> Result<(Value, TypeKind), CodegenError> {
        match op {
            UnOp::AddressOf => {
                // The operand must name a variable: the slot itself is the
                // address, no load happens.
                let Expr::Identifier { name, .. } = operand else {
                    return Err(self.err("the address-of operator can only be applied to variables"));
                };
                let binding = self
                    .lookup(name)
                    .ok_or_else(|| self.err(format!("unknown variable '{name}'")))?;
                let ty = make_pointer(binding.ty);
                if ty == TypeKind::Unknown {
                    return Err(self.err(format!(
                        "cannot take the address of a value of type '{}'",
                        self.type_name(binding.ty)
                    )));
                }
                let addr = self.binding_addr(&binding);
                Ok((addr, ty))
            }
            UnOp::Dereference => {
                let (ptr, pty) = self.lower_expr(operand)?;
                let TypeKind::Ptr(scalar) = pty else {
                    return Err(self.err(format!(
                        "cannot dereference non-pointer type '{}'",
                        self.type_name(pty)
                    )));
                };
                let cl = scalar_cl_type(scalar, self.ptr_type)
                    .ok_or_else(|| self.err("cannot dereference a '*void' pointer"))?;
                let val = self.builder.ins().load(cl, MemFlags::new(), ptr, 0);
                Ok((val, TypeKind::Scalar(scalar)))
            }
        }
    }

    fn lower_call(&mut self, callee: &str, args: &[Expr]) -> Result<(Value, TypeKind), CodegenError> {
        match callee {
            "std.print" => self.builtin_print(args, false),
            "std.println" => self.builtin_print(args, true),
            "std.input" => self.builtin_input(args),
            "std.readln" => self.builtin_readln(args),
            "std.to_int" => self.builtin_to_number(args, false),
            "std.to_i64" => self.builtin_to_number(args, true),
            "std.to_string" => self.builtin_to_string(args),
            "std.malloc" => self.builtin_malloc(args),
            "std.free" => self.builtin_free(args),
            "cast" => self.builtin_cast(args),
            _ => self.lower_user_call(callee, args),
        }
    }

    fn lower_user_call(
        &mut self,
        callee: &str,
        args: &[Expr],
    ) -> Result<(Value, TypeKind), CodegenError> {
        let info = self
            .funcs
            .get(callee)
            .cloned()
            .ok_or_else(|| self.err(format!("unknown function '{callee}'")))?;
        if info.is_method {
            return Err(self.err(format!(
                "'{callee}' is a method; call it on a record value"
            )));
        }
        if args.len() != info.params.len() {
            return Err(self.err(format!(
                "function '{callee}' expects {} argument(s), got {}",
                info.params.len(),
                args.len()
            )));
        }
        let mut vals = Vec::with_capacity(args.len());
        for (arg, &pty) in args.iter().zip(&info.params) {
            let (v, vty) = self.lower_expr(arg)?;
            let v = if pty.is_record() {
                v
            } else {
                self.convert_for_store(v, vty, pty)
            };
            vals.push(v);
        }
        let fref = self.func_ref(info.id);
        let call = self.builder.ins().call(fref, &vals);
        if info.ret == TypeKind::VOID {
            Ok(self.void_value())
        } else {
            let result = self.builder.inst_results(call)[0];
            Ok((result, info.ret))
        }
    }

    fn lower_field_access(
        &mut self,
        object: &Expr,
        field: &str,
    ) -> Result<(Value, TypeKind), CodegenError> {
        let (addr, oty) = self.lower_object_addr(object)?;
        let TypeKind::Record(id) = oty else {
            return Err(self.err(format!(
                "cannot access field on non-record type '{}'",
                self.type_name(oty)
            )));
        };
        let record_name = self.registry.record(id).map(|r| r.name.clone()).unwrap_or_default();
        let offset = self
            .registry
            .field_offset(id, field)
            .ok_or_else(|| self.err(format!("unknown field '{field}' on record '{record_name}'")))?;
        let fty = self
            .registry
            .field_type(id, field)
            .expect("offset lookup succeeded");
        if fty.is_record() {
            let fa = self.builder.ins().iadd_imm(addr, offset as i64);
            return Ok((fa, fty));
        }
        let cl = self.cl_type(fty)?;
        let val = self
            .builder
            .ins()
            .load(cl, MemFlags::new(), addr, offset as i32);
        Ok((val, fty))
    }

    /// The address of a record-valued expression. Identifier objects use
    /// the variable slot directly, which preserves addressability; any
    /// other record-valued expression already evaluates to an address.
    fn lower_object_addr(&mut self, object: &Expr) -> Result<(Value, TypeKind), CodegenError> {
        if let Expr::Identifier { name, .. } = object {
            let binding = self
                .lookup(name)
                .ok_or_else(|| self.err(format!("unknown variable '{name}'")))?;
            let addr = self.binding_addr(&binding);
            return Ok((addr, binding.ty));
        }
        self.lower_expr(object)
    }

    fn lower_method_call(
        &mut self,
        object: &Expr,
        method: &str,
        args: &[Expr],
    ) -> Result<(Value, TypeKind), CodegenError> {
        let Expr::Identifier { name, .. } = object else {
            return Err(self.err("method calls on complex expressions are not supported"));
        };
        let binding = self
            .lookup(name)
            .ok_or_else(|| self.err(format!("unknown variable '{name}'")))?;
        let TypeKind::Record(id) = binding.ty else {
            return Err(self.err(format!(
                "cannot call a method on non-record type '{}'",
                self.type_name(binding.ty)
            )));
        };
        let record_name = self
            .registry
            .record(id)
            .map(|r| r.name.clone())
            .unwrap_or_default();
        let mangled = format!("{record_name}_{method}");
        let info = self.funcs.get(&mangled).cloned().ok_or_else(|| {
            self.err(format!("unknown method '{method}' on record '{record_name}'"))
        })?;
        if args.len() != info.params.len() {
            return Err(self.err(format!(
                "method '{method}' expects {} argument(s), got {}",
                info.params.len(),
                args.len()
            )));
        }
        let mut vals = Vec::with_capacity(args.len() + 1);
        vals.push(self.binding_addr(&binding));
        for (arg, &pty) in args.iter().zip(&info.params) {
            let (v, vty) = self.lower_expr(arg)?;
            let v = if pty.is_record() {
                v
            } else {
                self.convert_for_store(v, vty, pty)
            };
            vals.push(v);
        }
        let fref = self.func_ref(info.id);
        let call = self.builder.ins().call(fref, &vals);
        if info.ret == TypeKind::VOID {
            Ok(self.void_value())
        } else {
            let result = self.builder.inst_results(call)[0];
            Ok((result, info.ret))
        }
    }

    /// A record literal allocates a record-shaped slot, stores each named
    /// field at its packed offset, and evaluates to the slot address.
    fn lower_struct_literal(
        &mut self,
        type_name: &str,
        fields: &[(String, Expr)],
        resolved_ty: TypeKind,
    ) -> Result<(Value, TypeKind), CodegenError> {
        let TypeKind::Record(id) = resolved_ty else {
            return Err(self.err(format!("unknown record type '{type_name}'")));
        };
        let total = self
            .registry
            .record(id)
            .map(|r| r.total_size)
            .unwrap_or(0);
        let slot = self.create_slot(total);
        let base = self.builder.ins().stack_addr(self.ptr_type, slot, 0);
        for (field_name, value) in fields {
            let offset = self.registry.field_offset(id, field_name).ok_or_else(|| {
                self.err(format!(
                    "unknown field '{field_name}' on record '{type_name}'"
                ))
            })?;
            let fty = self
                .registry
                .field_type(id, field_name)
                .expect("offset lookup succeeded");
            let (val, vty) = self.lower_expr(value)?;
            if let TypeKind::Record(inner) = fty {
                let dst = self.builder.ins().iadd_imm(base, offset as i64);
                self.copy_record(val, dst, inner)?;
            } else {
                let val = self.convert_for_store(val, vty, fty);
                self.builder
                    .ins()
                    .store(MemFlags::new(), val, base, offset as i32);
            }
        }
        Ok((base, resolved_ty))
    }

    // ── Builtins ──

    /// printf format selected from the argument's resolved type.
    fn print_spec(&self, ty: TypeKind, builtin: &str) -> Result<&'static str, CodegenError> {
        let fmt = match ty {
            TypeKind::STRING => "%s",
            TypeKind::Scalar(Scalar::I8) => "%hhd",
            TypeKind::Scalar(Scalar::I16) => "%hd",
            TypeKind::Scalar(Scalar::I32) => "%d",
            TypeKind::Scalar(Scalar::I64) => "%ld",
            TypeKind::Scalar(Scalar::U8) => "%hhu",
            TypeKind::Scalar(Scalar::U16) => "%hu",
            TypeKind::Scalar(Scalar::U32) => "%u",
            TypeKind::Scalar(Scalar::U64) => "%lu",
            TypeKind::Scalar(Scalar::I128) | TypeKind::Scalar(Scalar::U128) => {
                return Err(self.err(format!(
                    "{builtin}: 128-bit integers cannot be printed"
                )))
            }
            _ => {
                return Err(self.err(format!(
                    "unsupported type for {builtin}: '{}'",
                    self.type_name(ty)
                )))
            }
        };
        Ok(fmt)
    }

    /// The argument as a 64-bit printf vararg, with the format to use.
    fn format_arg(
        &mut self,
        val: Value,
        ty: TypeKind,
        builtin: &str,
    ) -> Result<(&'static str, Value), CodegenError> {
        if ty == TypeKind::BOOL {
            // Booleans print as the words, through a selector.
            let t = self.string_data(b"true")?;
            let f = self.string_data(b"false")?;
            return Ok(("%s", self.builder.ins().select(val, t, f)));
        }
        let fmt = self.print_spec(ty, builtin)?;
        let arg = match ty {
            TypeKind::Scalar(s) if s.is_integer() => self.widen_int(val, s),
            _ => val,
        };
        Ok((fmt, arg))
    }

    fn builtin_print(
        &mut self,
        args: &[Expr],
        newline: bool,
    ) -> Result<(Value, TypeKind), CodegenError> {
        let builtin = if newline { "std.println()" } else { "std.print()" };
        if args.len() != 1 {
            return Err(self.err(format!("{builtin} expects exactly 1 argument")));
        }
        let (val, ty) = self.lower_expr(&args[0])?;
        let (fmt, arg) = self.format_arg(val, ty, builtin)?;
        let fmt_bytes = if newline {
            format!("{fmt}\n")
        } else {
            fmt.to_string()
        };
        let fmt_ptr = self.string_data(fmt_bytes.as_bytes())?;
        let printf = self.shims.printf;
        self.call_shim(printf, &[fmt_ptr, arg]);
        Ok(self.void_value())
    }

    /// `std.input()`: scanf into a 256-byte stack buffer.
    fn builtin_input(&mut self, args: &[Expr]) -> Result<(Value, TypeKind), CodegenError> {
        if !args.is_empty() {
            return Err(self.err("std.input() expects no arguments"));
        }
        let slot = self.create_slot(256);
        let buf = self.builder.ins().stack_addr(self.ptr_type, slot, 0);
        let fmt = self.string_data(b"%255s")?;
        let scanf = self.shims.scanf;
        self.call_shim(scanf, &[fmt, buf]);
        Ok((buf, TypeKind::STRING))
    }

    /// `std.readln()`: getline through the external `stdin` handle.
    fn builtin_readln(&mut self, args: &[Expr]) -> Result<(Value, TypeKind), CodegenError> {
        if !args.is_empty() {
            return Err(self.err("std.readln() expects no arguments"));
        }
        let line_slot = self.create_slot(8);
        let size_slot = self.create_slot(8);
        let null = self.builder.ins().iconst(self.ptr_type, 0);
        self.builder.ins().stack_store(null, line_slot, 0);
        let zero = self.builder.ins().iconst(types::I64, 0);
        self.builder.ins().stack_store(zero, size_slot, 0);

        let stdin_id = self.stdin_data;
        let gv = self.data_gv(stdin_id);
        let stdin_addr = self.builder.ins().symbol_value(self.ptr_type, gv);
        let stdin_val = self
            .builder
            .ins()
            .load(self.ptr_type, MemFlags::new(), stdin_addr, 0);

        let line_addr = self.builder.ins().stack_addr(self.ptr_type, line_slot, 0);
        let size_addr = self.builder.ins().stack_addr(self.ptr_type, size_slot, 0);
        let getline = self.shims.getline;
        self.call_shim(getline, &[line_addr, size_addr, stdin_val]);

        let line = self.builder.ins().stack_load(self.ptr_type, line_slot, 0);
        Ok((line, TypeKind::STRING))
    }

    fn builtin_to_number(
        &mut self,
        args: &[Expr],
        wide: bool,
    ) -> Result<(Value, TypeKind), CodegenError> {
        let builtin = if wide { "std.to_i64()" } else { "std.to_int()" };
        if args.len() != 1 {
            return Err(self.err(format!("{builtin} expects exactly 1 argument")));
        }
        let (val, _) = self.lower_expr(&args[0])?;
        if wide {
            let atol = self.shims.atol;
            let call = self.call_shim(atol, &[val]);
            let result = self.builder.inst_results(call)[0];
            Ok((result, TypeKind::I64))
        } else {
            let atoi = self.shims.atoi;
            let call = self.call_shim(atoi, &[val]);
            let result = self.builder.inst_results(call)[0];
            Ok((result, TypeKind::I32))
        }
    }

    /// `std.to_string(x)`: sprintf into a 32-byte stack buffer; strings
    /// pass through unchanged.
    fn builtin_to_string(&mut self, args: &[Expr]) -> Result<(Value, TypeKind), CodegenError> {
        if args.len() != 1 {
            return Err(self.err("std.to_string() expects exactly 1 argument"));
        }
        let (val, ty) = self.lower_expr(&args[0])?;
        if ty == TypeKind::STRING {
            return Ok((val, ty));
        }
        let (fmt, arg) = self.format_arg(val, ty, "std.to_string()")?;
        let slot = self.create_slot(32);
        let buf = self.builder.ins().stack_addr(self.ptr_type, slot, 0);
        let fmt_ptr = self.string_data(fmt.as_bytes())?;
        let sprintf = self.shims.sprintf;
        self.call_shim(sprintf, &[buf, fmt_ptr, arg]);
        Ok((buf, TypeKind::STRING))
    }

    fn builtin_malloc(&mut self, args: &[Expr]) -> Result<(Value, TypeKind), CodegenError> {
        if args.len() != 1 {
            return Err(self.err("std.malloc() expects exactly 1 argument (size)"));
        }
        let (val, ty) = self.lower_expr(&args[0])?;
        let size = match ty {
            TypeKind::Scalar(s) if s.is_integer() => {
                let from = scalar_cl_type(s, self.ptr_type).expect("integer has a type");
                self.int_resize(val, from, types::I64, s.info().signed)
            }
            _ => {
                return Err(self.err(format!(
                    "std.malloc() expects a numeric size, got '{}'",
                    self.type_name(ty)
                )))
            }
        };
        let malloc = self.shims.malloc;
        let call = self.call_shim(malloc, &[size]);
        let result = self.builder.inst_results(call)[0];
        Ok((result, TypeKind::Ptr(Scalar::Void)))
    }

    fn builtin_free(&mut self, args: &[Expr]) -> Result<(Value, TypeKind), CodegenError> {
        if args.len() != 1 {
            return Err(self.err("std.free() expects exactly 1 argument (pointer)"));
        }
        let (val, ty) = self.lower_expr(&args[0])?;
        if !ty.is_pointer() && ty != TypeKind::STRING {
            return Err(self.err(format!(
                "std.free() expects a pointer, got '{}'",
                self.type_name(ty)
            )));
        }
        let free = self.shims.free;
        self.call_shim(free, &[val]);
        Ok(self.void_value())
    }

    /// `cast(value, type_name)`: the only user-visible conversion path.
    fn builtin_cast(&mut self, args: &[Expr]) -> Result<(Value, TypeKind), CodegenError> {
        if args.len() != 2 {
            return Err(self.err("cast() expects exactly 2 arguments: cast(value, type_name)"));
        }
        let target_name = match &args[1] {
            Expr::Identifier { name, .. } => name.clone(),
            Expr::Literal { text, ty, .. } if ty == "string" => text.clone(),
            _ => {
                return Err(
                    self.err("cast() second argument must be a type name (identifier or string)")
                )
            }
        };
        let target = self.registry.type_from_name(&target_name);
        if target == TypeKind::Unknown {
            return Err(self.err(format!("cast(): unknown target type '{target_name}'")));
        }
        let (val, src) = self.lower_expr(&args[0])?;
        if src == target {
            return Ok((val, target));
        }

        match (src, target) {
            (TypeKind::Scalar(f), TypeKind::Scalar(t)) if f.is_integer() && t.is_integer() => {
                let from = scalar_cl_type(f, self.ptr_type).expect("integer has a type");
                let to = scalar_cl_type(t, self.ptr_type).expect("integer has a type");
                // Widening extends by source signedness; narrowing
                // truncates; same width is a bit-level reinterpretation.
                let out = self.int_resize(val, from, to, f.info().signed);
                Ok((out, target))
            }
            (TypeKind::Scalar(Scalar::F32), TypeKind::Scalar(Scalar::F64)) => {
                Ok((self.builder.ins().fpromote(types::F64, val), target))
            }
            (TypeKind::Scalar(Scalar::F64), TypeKind::Scalar(Scalar::F32)) => {
                Ok((self.builder.ins().fdemote(types::F32, val), target))
            }
            (TypeKind::Ptr(_), TypeKind::Ptr(_)) => Ok((val, target)),
            (TypeKind::Scalar(f), TypeKind::Ptr(_)) if f.is_integer() => {
                let from = scalar_cl_type(f, self.ptr_type).expect("integer has a type");
                let out = self.int_resize(val, from, self.ptr_type, false);
                Ok((out, target))
            }
            (TypeKind::Ptr(_), TypeKind::Scalar(t)) if t.is_integer() => {
                let to = scalar_cl_type(t, self.ptr_type).expect("integer has a type");
                let out = self.int_resize(val, self.ptr_type, to, false);
                Ok((out, target))
            }
            _ => Err(self.err(format!(
                "cast(): conversion from '{}' to '{}' is not supported",
                self.type_name(src),
                target_name
            ))),
        }
    }
}
