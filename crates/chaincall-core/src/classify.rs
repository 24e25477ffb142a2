//! ABI type classification for failed sub-calls.
//!
//! When a sub-call reports `success = false` its return data is never
//! decoded. Each declared return type gets a zero value of the right shape
//! instead, picked from the type's class.

use alloy_primitives::{I256, U256};

use crate::types::Value;

/// Coarse class of an ABI type string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    Bool,
    Str,
    Address,
    Int,
    Array,
    Other,
}

/// Classify an ABI type such as `uint256`, `address` or `bytes32[]`.
///
/// Sequences are recognised first, so `uint256[]` is an array.
pub fn classify(ty: &str) -> TypeClass {
    let ty = ty.trim();
    if ty.ends_with(']') {
        return TypeClass::Array;
    }
    match ty {
        "bool" => TypeClass::Bool,
        "string" => TypeClass::Str,
        "address" => TypeClass::Address,
        _ if ty.starts_with("uint") || ty.starts_with("int") => TypeClass::Int,
        _ => TypeClass::Other,
    }
}

/// Zero value substituted for a failed sub-call's output of type `ty`.
///
/// Integers keep their signedness so the fallback compares equal to a
/// decoded zero of the same type.
pub fn fallback_value(ty: &str) -> Value {
    match classify(ty) {
        TypeClass::Bool => Value::Bool(false),
        TypeClass::Str | TypeClass::Address => Value::Str(String::new()),
        TypeClass::Int if ty.trim().starts_with("int") => Value::Int(I256::ZERO),
        TypeClass::Int => Value::Uint(U256::ZERO),
        TypeClass::Array => Value::Array(vec![]),
        TypeClass::Other => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_literals() {
        assert_eq!(classify("bool"), TypeClass::Bool);
        assert_eq!(classify("string"), TypeClass::Str);
        assert_eq!(classify("address"), TypeClass::Address);
    }

    #[test]
    fn classify_integer_families() {
        for ty in ["uint", "uint8", "uint256", "int", "int24", "int256"] {
            assert_eq!(classify(ty), TypeClass::Int, "{ty}");
        }
    }

    #[test]
    fn classify_sequences_before_integers() {
        assert_eq!(classify("uint256[]"), TypeClass::Array);
        assert_eq!(classify("bytes32[]"), TypeClass::Array);
        assert_eq!(classify("address[3]"), TypeClass::Array);
    }

    #[test]
    fn classify_other() {
        assert_eq!(classify("bytes32"), TypeClass::Other);
        assert_eq!(classify("bytes"), TypeClass::Other);
        assert_eq!(classify("(uint256,bool)"), TypeClass::Other);
    }

    #[test]
    fn fallbacks_per_class() {
        assert_eq!(fallback_value("bool"), Value::Bool(false));
        assert_eq!(fallback_value("string"), Value::Str(String::new()));
        assert_eq!(fallback_value("address"), Value::Str(String::new()));
        assert_eq!(fallback_value("uint256"), Value::Uint(U256::ZERO));
        assert_eq!(fallback_value("int128"), Value::Int(I256::ZERO));
        assert_eq!(fallback_value("address[]"), Value::Array(vec![]));
        assert_eq!(fallback_value("bytes32"), Value::Null);
    }
}
