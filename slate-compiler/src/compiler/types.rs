//! The Slate type system: scalar kinds, one-level pointers, and the record
//! registry with packed field layout.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum_macros::EnumIter;
use thiserror::Error;

/// Scalar (non-pointer, non-record) types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
pub enum Scalar {
    Void,
    Bool,
    I8,
    I16,
    I32,
    I64,
    I128,
    U8,
    U16,
    U32,
    U64,
    U128,
    F32,
    F64,
    Char,
    String,
}

impl Scalar {
    pub fn name(self) -> &'static str {
        match self {
            Scalar::Void => "void",
            Scalar::Bool => "bool",
            Scalar::I8 => "i8",
            Scalar::I16 => "i16",
            Scalar::I32 => "i32",
            Scalar::I64 => "i64",
            Scalar::I128 => "i128",
            Scalar::U8 => "u8",
            Scalar::U16 => "u16",
            Scalar::U32 => "u32",
            Scalar::U64 => "u64",
            Scalar::U128 => "u128",
            Scalar::F32 => "f32",
            Scalar::F64 => "f64",
            Scalar::Char => "char",
            Scalar::String => "string",
        }
    }

    pub fn from_name(name: &str) -> Option<Scalar> {
        let s = match name {
            "void" => Scalar::Void,
            "bool" => Scalar::Bool,
            "i8" => Scalar::I8,
            "i16" => Scalar::I16,
            "i32" => Scalar::I32,
            "i64" => Scalar::I64,
            "i128" => Scalar::I128,
            "u8" => Scalar::U8,
            "u16" => Scalar::U16,
            "u32" => Scalar::U32,
            "u64" => Scalar::U64,
            "u128" => Scalar::U128,
            "f32" => Scalar::F32,
            "f64" => Scalar::F64,
            "char" => Scalar::Char,
            "string" => Scalar::String,
            _ => return None,
        };
        Some(s)
    }

    /// Static type properties. Strings compare with `==`/`!=` only; chars
    /// are ordered but not numeric.
    pub fn info(self) -> TypeInfo {
        let (size, signed, numeric, comparable, ordered) = match self {
            Scalar::Void => (0, false, false, false, false),
            Scalar::Bool => (1, false, false, true, false),
            Scalar::I8 => (1, true, true, true, true),
            Scalar::I16 => (2, true, true, true, true),
            Scalar::I32 => (4, true, true, true, true),
            Scalar::I64 => (8, true, true, true, true),
            Scalar::I128 => (16, true, true, true, true),
            Scalar::U8 => (1, false, true, true, true),
            Scalar::U16 => (2, false, true, true, true),
            Scalar::U32 => (4, false, true, true, true),
            Scalar::U64 => (8, false, true, true, true),
            Scalar::U128 => (16, false, true, true, true),
            Scalar::F32 => (4, true, true, true, true),
            Scalar::F64 => (8, true, true, true, true),
            Scalar::Char => (1, false, false, true, true),
            Scalar::String => (8, false, false, true, false),
        };
        TypeInfo {
            size_bytes: size,
            signed,
            numeric,
            comparable,
            ordered,
            is_pointer: false,
            pointed_to: None,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Scalar::I8
                | Scalar::I16
                | Scalar::I32
                | Scalar::I64
                | Scalar::I128
                | Scalar::U8
                | Scalar::U16
                | Scalar::U32
                | Scalar::U64
                | Scalar::U128
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Scalar::F32 | Scalar::F64)
    }
}

/// Identifier of a registered record type; an index into the registry.
pub type RecordId = u32;

/// A resolved type: a scalar, a one-level pointer to a scalar, or a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Scalar(Scalar),
    Ptr(Scalar),
    Record(RecordId),
    Unknown,
}

impl Default for TypeKind {
    fn default() -> Self {
        TypeKind::Unknown
    }
}

impl TypeKind {
    pub const VOID: TypeKind = TypeKind::Scalar(Scalar::Void);
    pub const BOOL: TypeKind = TypeKind::Scalar(Scalar::Bool);
    pub const I32: TypeKind = TypeKind::Scalar(Scalar::I32);
    pub const I64: TypeKind = TypeKind::Scalar(Scalar::I64);
    pub const U32: TypeKind = TypeKind::Scalar(Scalar::U32);
    pub const F32: TypeKind = TypeKind::Scalar(Scalar::F32);
    pub const STRING: TypeKind = TypeKind::Scalar(Scalar::String);

    pub fn is_pointer(self) -> bool {
        matches!(self, TypeKind::Ptr(_))
    }

    pub fn is_record(self) -> bool {
        matches!(self, TypeKind::Record(_))
    }
}

/// Per-type property block, the shape the rest of the compiler consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeInfo {
    pub size_bytes: u32,
    pub signed: bool,
    pub numeric: bool,
    pub comparable: bool,
    pub ordered: bool,
    pub is_pointer: bool,
    pub pointed_to: Option<Scalar>,
}

const POINTER_SIZE: u32 = 8;

/// Pointers are exactly one indirection level: taking a pointer to a
/// pointer, a record, or an unknown type yields `Unknown`.
pub fn make_pointer(base: TypeKind) -> TypeKind {
    match base {
        TypeKind::Scalar(s) => TypeKind::Ptr(s),
        _ => TypeKind::Unknown,
    }
}

pub fn pointed_to(ty: TypeKind) -> TypeKind {
    match ty {
        TypeKind::Ptr(s) => TypeKind::Scalar(s),
        _ => TypeKind::Unknown,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    pub ty: TypeKind,
    /// Byte offset from the start of the record (packed layout).
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordInfo {
    pub id: RecordId,
    pub name: String,
    pub fields: Vec<RecordField>,
    pub total_size: u32,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("record '{0}' is already defined")]
    DuplicateRecord(String),
}

/// Registry of user-declared record types, scoped to one compilation and
/// append-only within it. Field offsets are assigned at registration by
/// summing field sizes in declaration order, with no padding.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    records: Vec<RecordInfo>,
    by_name: HashMap<String, RecordId>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_record(
        &mut self,
        name: &str,
        fields: Vec<(String, TypeKind)>,
    ) -> Result<RecordId, TypeError> {
        if self.by_name.contains_key(name) {
            return Err(TypeError::DuplicateRecord(name.to_string()));
        }
        let id = self.records.len() as RecordId;
        let mut offset = 0u32;
        let mut laid_out = Vec::with_capacity(fields.len());
        for (field_name, ty) in fields {
            let size = self.info(ty).size_bytes;
            laid_out.push(RecordField {
                name: field_name,
                ty,
                offset,
            });
            offset += size;
        }
        self.records.push(RecordInfo {
            id,
            name: name.to_string(),
            fields: laid_out,
            total_size: offset,
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn record(&self, id: RecordId) -> Option<&RecordInfo> {
        self.records.get(id as usize)
    }

    pub fn record_by_name(&self, name: &str) -> Option<&RecordInfo> {
        self.by_name.get(name).and_then(|&id| self.record(id))
    }

    pub fn field_offset(&self, id: RecordId, field: &str) -> Option<u32> {
        self.record(id)?
            .fields
            .iter()
            .find(|f| f.name == field)
            .map(|f| f.offset)
    }

    pub fn field_type(&self, id: RecordId, field: &str) -> Option<TypeKind> {
        self.record(id)?
            .fields
            .iter()
            .find(|f| f.name == field)
            .map(|f| f.ty)
    }

    /// Resolve a textual type name: primitives, registered record names,
    /// and a single leading `*` for pointers. Unknown names yield `Unknown`.
    pub fn type_from_name(&self, name: &str) -> TypeKind {
        if let Some(base) = name.strip_prefix('*') {
            return make_pointer(self.type_from_name(base));
        }
        if let Some(scalar) = Scalar::from_name(name) {
            return TypeKind::Scalar(scalar);
        }
        match self.by_name.get(name) {
            Some(&id) => TypeKind::Record(id),
            None => TypeKind::Unknown,
        }
    }

    /// Inverse of `type_from_name`.
    pub fn type_name(&self, ty: TypeKind) -> String {
        match ty {
            TypeKind::Scalar(s) => s.name().to_string(),
            TypeKind::Ptr(s) => format!("*{}", s.name()),
            TypeKind::Record(id) => self
                .record(id)
                .map(|r| r.name.clone())
                .unwrap_or_else(|| "unknown".to_string()),
            TypeKind::Unknown => "unknown".to_string(),
        }
    }

    pub fn info(&self, ty: TypeKind) -> TypeInfo {
        match ty {
            TypeKind::Scalar(s) => s.info(),
            TypeKind::Ptr(s) => TypeInfo {
                size_bytes: POINTER_SIZE,
                signed: false,
                numeric: false,
                comparable: true,
                ordered: false,
                is_pointer: true,
                pointed_to: Some(s),
            },
            TypeKind::Record(id) => TypeInfo {
                size_bytes: self.record(id).map(|r| r.total_size).unwrap_or(0),
                signed: false,
                numeric: false,
                comparable: false,
                ordered: false,
                is_pointer: false,
                pointed_to: None,
            },
            TypeKind::Unknown => TypeInfo {
                size_bytes: 0,
                signed: false,
                numeric: false,
                comparable: false,
                ordered: false,
                is_pointer: false,
                pointed_to: None,
            },
        }
    }

    /// Strict compatibility: the operand types must be equal and numeric.
    /// `cast` is the only conversion path visible to users.
    pub fn types_compatible(&self, a: TypeKind, b: TypeKind) -> bool {
        a == b && self.info(a).numeric
    }

    /// Comparability requires equal types and a comparable kind.
    pub fn types_comparable(&self, a: TypeKind, b: TypeKind) -> bool {
        a == b && self.info(a).comparable
    }

    /// Result type of a binary operation: `bool` for comparisons, the
    /// common operand type for arithmetic on equal numeric types, and
    /// `Unknown` otherwise.
    pub fn binary_result_type(&self, a: TypeKind, b: TypeKind, is_comparison: bool) -> TypeKind {
        if is_comparison {
            return TypeKind::BOOL;
        }
        if a == b && self.info(a).numeric {
            return a;
        }
        TypeKind::Unknown
    }
}
