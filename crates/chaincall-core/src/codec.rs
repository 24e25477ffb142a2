//! Bridge between [`Value`] and alloy's dynamic ABI values.
//!
//! Arguments go `Value → DynSolValue → bytes`, return data goes
//! `bytes → DynSolValue → Value`. String arguments are coerced against the
//! declared type, so `"0xd8dA…"` works for `address` and `"1000"` for
//! `uint256`.

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{B256, I256};

use crate::types::Value;

/// Parse a single ABI type string.
pub fn parse_type(ty: &str) -> Result<DynSolType, String> {
    ty.trim().parse::<DynSolType>().map_err(|e| e.to_string())
}

/// ABI-encode `values` as a parameter list of `types` (no selector).
pub fn encode_params(types: &[DynSolType], values: &[Value]) -> Result<Vec<u8>, String> {
    if types.len() != values.len() {
        return Err(format!(
            "{} type(s) for {} value(s)",
            types.len(),
            values.len()
        ));
    }
    let tokens = types
        .iter()
        .zip(values)
        .enumerate()
        .map(|(i, (ty, v))| to_sol_value(v, ty).map_err(|e| format!("argument {i}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DynSolValue::Tuple(tokens).abi_encode_params())
}

/// ABI-decode a parameter list of `types` from `data`.
pub fn decode_params(types: &[DynSolType], data: &[u8]) -> Result<Vec<Value>, String> {
    if types.is_empty() {
        return Ok(vec![]);
    }
    let decoded = DynSolType::Tuple(types.to_vec())
        .abi_decode_params(data)
        .map_err(|e| e.to_string())?;
    Ok(match decoded {
        DynSolValue::Tuple(values) => values.into_iter().map(from_sol_value).collect(),
        other => vec![from_sol_value(other)],
    })
}

/// Convert a `Value` to the alloy `DynSolValue` for the given expected type.
pub fn to_sol_value(val: &Value, expected: &DynSolType) -> Result<DynSolValue, String> {
    match (val, expected) {
        (Value::Str(s), ty) => ty.coerce_str(s).map_err(|e| e.to_string()),

        (Value::Bool(b), DynSolType::Bool) => Ok(DynSolValue::Bool(*b)),

        (Value::Uint(u), DynSolType::Uint(bits)) => Ok(DynSolValue::Uint(*u, *bits)),
        (Value::Uint(u), DynSolType::Int(bits)) => {
            let i = I256::from_raw(*u);
            if i.is_negative() {
                return Err(format!("{u} overflows int{bits}"));
            }
            Ok(DynSolValue::Int(i, *bits))
        }
        (Value::Int(i), DynSolType::Int(bits)) => Ok(DynSolValue::Int(*i, *bits)),
        (Value::Int(i), DynSolType::Uint(bits)) => {
            if i.is_negative() {
                return Err(format!("negative value {i} for uint{bits}"));
            }
            Ok(DynSolValue::Uint(i.into_raw(), *bits))
        }

        (Value::Address(a), DynSolType::Address) => Ok(DynSolValue::Address(*a)),

        (Value::Bytes(b), DynSolType::Bytes) => Ok(DynSolValue::Bytes(b.clone())),
        (Value::Bytes(b), DynSolType::FixedBytes(n)) => {
            if b.len() > *n {
                return Err(format!("bytes{n}: got {} bytes", b.len()));
            }
            let mut word = B256::ZERO;
            word[..b.len()].copy_from_slice(b);
            Ok(DynSolValue::FixedBytes(word, *n))
        }

        (Value::Array(elems), DynSolType::Array(inner)) => {
            let items: Result<Vec<_>, _> = elems.iter().map(|e| to_sol_value(e, inner)).collect();
            Ok(DynSolValue::Array(items?))
        }
        (Value::Array(elems), DynSolType::FixedArray(inner, len)) => {
            if elems.len() != *len {
                return Err(format!(
                    "fixed array length mismatch: expected {len}, got {}",
                    elems.len()
                ));
            }
            let items: Result<Vec<_>, _> = elems.iter().map(|e| to_sol_value(e, inner)).collect();
            Ok(DynSolValue::FixedArray(items?))
        }

        (Value::Tuple(fields) | Value::Array(fields), DynSolType::Tuple(types)) => {
            if fields.len() != types.len() {
                return Err(format!(
                    "tuple arity mismatch: expected {}, got {}",
                    types.len(),
                    fields.len()
                ));
            }
            let items: Result<Vec<_>, _> = fields
                .iter()
                .zip(types)
                .map(|(v, t)| to_sol_value(v, t))
                .collect();
            Ok(DynSolValue::Tuple(items?))
        }

        _ => Err(format!("cannot convert {val:?} to {expected}")),
    }
}

/// Convert a decoded `DynSolValue` into a `Value`.
pub fn from_sol_value(val: DynSolValue) -> Value {
    match val {
        DynSolValue::Bool(b) => Value::Bool(b),
        DynSolValue::Int(i, _) => Value::Int(i),
        DynSolValue::Uint(u, _) => Value::Uint(u),
        DynSolValue::FixedBytes(word, size) => Value::Bytes(word[..size].to_vec()),
        DynSolValue::Bytes(b) => Value::Bytes(b),
        DynSolValue::String(s) => Value::Str(s),
        DynSolValue::Address(a) => Value::Address(a),
        DynSolValue::Array(vals) | DynSolValue::FixedArray(vals) => {
            Value::Array(vals.into_iter().map(from_sol_value).collect())
        }
        DynSolValue::Tuple(fields) => Value::Tuple(fields.into_iter().map(from_sol_value).collect()),
        // function pointers (address ++ selector) surface as raw bytes
        DynSolValue::Function(f) => Value::Bytes(f.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};

    fn types(list: &[&str]) -> Vec<DynSolType> {
        list.iter().map(|t| parse_type(t).unwrap()).collect()
    }

    #[test]
    fn string_arguments_are_coerced() {
        let ty = types(&["address", "uint256"]);
        let encoded = encode_params(
            &ty,
            &[
                Value::from("0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045"),
                Value::from("1000000"),
            ],
        )
        .unwrap();
        assert_eq!(encoded.len(), 64);
        assert_eq!(
            hex::encode(&encoded[32..]),
            "00000000000000000000000000000000000000000000000000000000000f4240"
        );
    }

    #[test]
    fn decode_mixed_outputs() {
        let ty = types(&["uint256", "bool", "string"]);
        let data = DynSolValue::Tuple(vec![
            DynSolValue::Uint(U256::from(42u64), 256),
            DynSolValue::Bool(true),
            DynSolValue::String("WETH".into()),
        ])
        .abi_encode_params();
        let values = decode_params(&ty, &data).unwrap();
        assert_eq!(
            values,
            vec![Value::from(42u64), Value::Bool(true), Value::from("WETH")]
        );
    }

    #[test]
    fn decode_dynamic_array_output() {
        let ty = types(&["address[]"]);
        let data = DynSolValue::Tuple(vec![DynSolValue::Array(vec![
            DynSolValue::Address(Address::repeat_byte(0x11)),
            DynSolValue::Address(Address::repeat_byte(0x22)),
        ])])
        .abi_encode_params();
        let values = decode_params(&ty, &data).unwrap();
        assert_eq!(
            values,
            vec![Value::Array(vec![
                Value::Address(Address::repeat_byte(0x11)),
                Value::Address(Address::repeat_byte(0x22)),
            ])]
        );
    }

    #[test]
    fn truncated_data_is_an_error() {
        let ty = types(&["uint256"]);
        assert!(decode_params(&ty, &[0u8; 4]).is_err());
    }

    #[test]
    fn negative_int_rejected_for_uint() {
        let ty = parse_type("uint256").unwrap();
        let neg = Value::Int(I256::try_from(-1i64).unwrap());
        assert!(to_sol_value(&neg, &ty).is_err());
    }

    #[test]
    fn fixed_bytes_are_left_aligned() {
        let ty = parse_type("bytes4").unwrap();
        let v = to_sol_value(&Value::Bytes(vec![0xde, 0xad]), &ty).unwrap();
        match v {
            DynSolValue::FixedBytes(word, 4) => assert_eq!(&word[..4], &[0xde, 0xad, 0, 0]),
            other => panic!("unexpected {other:?}"),
        }
    }
}
