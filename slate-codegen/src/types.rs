//! Mapping from Slate types to Cranelift IR types.

use cranelift_codegen::ir::types;
use cranelift_codegen::ir::Type as ClifType;
use slate_compiler::compiler::types::{Scalar, TypeKind};

/// Convert a scalar type to the corresponding Cranelift IR type.
///
/// Integers map to the matching N-bit int and `bool` to I8 (Cranelift has
/// no i1). `char` is an 8-bit int and `string` a pointer to 8-bit ints.
/// `void` has no runtime representation and returns `None`.
pub fn scalar_cl_type(scalar: Scalar, pointer_type: ClifType) -> Option<ClifType> {
    let ty = match scalar {
        Scalar::Void => return None,
        Scalar::Bool | Scalar::I8 | Scalar::U8 | Scalar::Char => types::I8,
        Scalar::I16 | Scalar::U16 => types::I16,
        Scalar::I32 | Scalar::U32 => types::I32,
        Scalar::I64 | Scalar::U64 => types::I64,
        Scalar::I128 | Scalar::U128 => types::I128,
        Scalar::F32 => types::F32,
        Scalar::F64 => types::F64,
        Scalar::String => pointer_type,
    };
    Some(ty)
}

/// Convert a resolved Slate type to the corresponding Cranelift IR type.
///
/// Pointers use the target pointer type. Records are storage-only
/// aggregates; as SSA values they are carried as addresses, so they map to
/// the pointer type as well. `Unknown` and `void` have no representation.
pub fn cl_type_of(ty: TypeKind, pointer_type: ClifType) -> Option<ClifType> {
    match ty {
        TypeKind::Scalar(s) => scalar_cl_type(s, pointer_type),
        TypeKind::Ptr(_) => Some(pointer_type),
        TypeKind::Record(_) => Some(pointer_type),
        TypeKind::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PTR: ClifType = types::I64;

    #[test]
    fn integer_type_mapping() {
        assert_eq!(cl_type_of(TypeKind::Scalar(Scalar::I8), PTR), Some(types::I8));
        assert_eq!(cl_type_of(TypeKind::Scalar(Scalar::U16), PTR), Some(types::I16));
        assert_eq!(cl_type_of(TypeKind::I32, PTR), Some(types::I32));
        assert_eq!(cl_type_of(TypeKind::Scalar(Scalar::U64), PTR), Some(types::I64));
        assert_eq!(cl_type_of(TypeKind::Scalar(Scalar::I128), PTR), Some(types::I128));
    }

    #[test]
    fn bool_and_char_are_bytes() {
        assert_eq!(cl_type_of(TypeKind::BOOL, PTR), Some(types::I8));
        assert_eq!(cl_type_of(TypeKind::Scalar(Scalar::Char), PTR), Some(types::I8));
    }

    #[test]
    fn floats_map_directly() {
        assert_eq!(cl_type_of(TypeKind::F32, PTR), Some(types::F32));
        assert_eq!(cl_type_of(TypeKind::Scalar(Scalar::F64), PTR), Some(types::F64));
    }

    #[test]
    fn strings_pointers_and_records_are_pointer_sized() {
        assert_eq!(cl_type_of(TypeKind::STRING, PTR), Some(PTR));
        assert_eq!(cl_type_of(TypeKind::Ptr(Scalar::I32), PTR), Some(PTR));
        assert_eq!(cl_type_of(TypeKind::Record(0), PTR), Some(PTR));
    }

    #[test]
    fn void_and_unknown_have_no_representation() {
        assert_eq!(cl_type_of(TypeKind::VOID, PTR), None);
        assert_eq!(cl_type_of(TypeKind::Unknown, PTR), None);
    }
}
