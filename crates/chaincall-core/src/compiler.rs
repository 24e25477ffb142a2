//! Call compiler: `CallDescriptor` → `CompiledCall`.
//!
//! A method signature has the form `name(argTypes)(returnTypes)`. The text
//! inside the first parenthesis pair lists the argument types, the optional
//! second pair lists the return types. Nested tuple types are not supported
//! in signatures.

use alloy_dyn_abi::DynSolType;
use alloy_primitives::Address;
use indexmap::IndexMap;

use crate::codec;
use crate::error::AggregateError;
use crate::selector::selector;
use crate::types::{CallDescriptor, Value};

/// Return key → the argument values of the call that produced it.
pub type ArgumentKeyMap = IndexMap<String, Vec<Value>>;

/// A descriptor resolved against a target and ready to be packed.
#[derive(Debug, Clone)]
pub struct CompiledCall {
    pub target: Address,
    /// `name(argTypes)`, the string the selector is hashed from.
    pub signature: String,
    /// Argument values paired with their declared types.
    pub args: Vec<(Value, String)>,
    pub return_types: Vec<String>,
    /// Return keys in declaration order.
    pub returns: Vec<String>,
    /// Selector followed by the ABI-encoded arguments.
    pub calldata: Vec<u8>,
    pub(crate) decoder: Vec<DynSolType>,
}

impl CompiledCall {
    pub fn arg_types(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(|(_, ty)| ty.as_str())
    }

    pub(crate) fn return_sol_types(&self) -> &[DynSolType] {
        &self.decoder
    }
}

/// Compile one descriptor. Calls without a target go to `default_target`.
pub fn compile(call: &CallDescriptor, default_target: Address) -> Result<CompiledCall, AggregateError> {
    let groups = paren_groups(&call.method);
    let (arg_group, ret_group) = match groups.as_slice() {
        [] => {
            return Err(AggregateError::InvalidSignature {
                method: call.method.clone(),
            })
        }
        [args] => (*args, ""),
        [args, rets, ..] => (*args, *rets),
    };

    let arg_types = split_types(arg_group);
    if arg_types.len() != call.args.len() {
        return Err(AggregateError::ArityMismatch {
            method: call.method.clone(),
            expected: arg_types.len(),
            got: call.args.len(),
        });
    }
    let return_types = split_types(ret_group);

    let arg_sol = parse_all(&arg_types)?;
    let decoder = parse_all(&return_types)?;

    let signature = signature_of(&call.method);
    let mut calldata = selector(&signature).to_vec();
    if !call.args.is_empty() {
        let encoded = codec::encode_params(&arg_sol, &call.args).map_err(|reason| {
            AggregateError::Encode {
                method: call.method.clone(),
                reason,
            }
        })?;
        calldata.extend_from_slice(&encoded);
    }

    Ok(CompiledCall {
        target: call.target.unwrap_or(default_target),
        signature,
        args: call.args.iter().cloned().zip(arg_types).collect(),
        return_types,
        returns: call.returns.iter().map(|r| r.key.clone()).collect(),
        calldata,
        decoder,
    })
}

/// Compile a whole call set, failing on the first bad descriptor.
pub fn compile_all(
    calls: &[CallDescriptor],
    default_target: Address,
) -> Result<Vec<CompiledCall>, AggregateError> {
    calls.iter().map(|c| compile(c, default_target)).collect()
}

/// Build the key → args map for every call that took arguments.
///
/// A key declared by more than one such call maps to the arguments of the
/// last one.
pub fn key_to_args(calls: &[CallDescriptor]) -> ArgumentKeyMap {
    let mut map = ArgumentKeyMap::new();
    for call in calls.iter().filter(|c| !c.args.is_empty()) {
        for ret in &call.returns {
            map.insert(ret.key.clone(), call.args.clone());
        }
    }
    map
}

/// Contents of each `(...)` group, non-nested, left to right.
fn paren_groups(method: &str) -> Vec<&str> {
    let mut groups = Vec::new();
    let mut rest = method;
    while let Some(open) = rest.find('(') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(')') else { break };
        groups.push(&after[..close]);
        rest = &after[close + 1..];
    }
    groups
}

fn split_types(group: &str) -> Vec<String> {
    group
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_all(types: &[String]) -> Result<Vec<DynSolType>, AggregateError> {
    types
        .iter()
        .map(|ty| {
            codec::parse_type(ty).map_err(|reason| AggregateError::InvalidType {
                ty: ty.clone(),
                reason,
            })
        })
        .collect()
}

/// Everything up to and including the first `)`, whitespace removed.
fn signature_of(method: &str) -> String {
    let end = method.find(')').map(|i| i + 1).unwrap_or(method.len());
    method[..end].chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTICALL: Address = Address::repeat_byte(0xaa);

    #[test]
    fn compiles_balance_of() {
        let owner = "0x86dd9a218780c64f934799a530371795d46f1a8a";
        let call = CallDescriptor::new("balanceOf(address)(uint256)")
            .target(Address::repeat_byte(0x01))
            .arg(owner)
            .returns("BALANCE");
        let compiled = compile(&call, MULTICALL).unwrap();
        assert_eq!(compiled.target, Address::repeat_byte(0x01));
        assert_eq!(compiled.signature, "balanceOf(address)");
        assert_eq!(compiled.return_types, vec!["uint256"]);
        assert_eq!(compiled.arg_types().collect::<Vec<_>>(), vec!["address"]);
        assert_eq!(hex::encode(&compiled.calldata[..4]), "70a08231");
        assert_eq!(compiled.calldata.len(), 4 + 32);
        assert!(hex::encode(&compiled.calldata).ends_with(&owner[2..]));
    }

    #[test]
    fn missing_target_defaults_to_multicall() {
        let call = CallDescriptor::new("getBlockNumber()(uint256)").returns("BLOCK");
        let compiled = compile(&call, MULTICALL).unwrap();
        assert_eq!(compiled.target, MULTICALL);
        assert_eq!(compiled.calldata.len(), 4);
        assert!(compiled.args.is_empty());
    }

    #[test]
    fn multiple_return_types() {
        let call = CallDescriptor::new("getReserves()(uint112, uint112, uint32)")
            .returns("R0")
            .returns("R1")
            .returns("TS");
        let compiled = compile(&call, MULTICALL).unwrap();
        assert_eq!(compiled.return_types, vec!["uint112", "uint112", "uint32"]);
        assert_eq!(compiled.returns, vec!["R0", "R1", "TS"]);
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let call = CallDescriptor::new("balanceOf(address)(uint256)").returns("B");
        let err = compile(&call, MULTICALL).unwrap_err();
        assert!(matches!(
            err,
            AggregateError::ArityMismatch {
                expected: 1,
                got: 0,
                ..
            }
        ));
        assert!(err.is_construction());
    }

    #[test]
    fn signature_without_parens_is_rejected() {
        let call = CallDescriptor::new("balanceOf");
        assert!(matches!(
            compile(&call, MULTICALL),
            Err(AggregateError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let call = CallDescriptor::new("f(uint256[)").arg(1u64);
        assert!(matches!(
            compile(&call, MULTICALL),
            Err(AggregateError::InvalidType { .. })
        ));
    }

    #[test]
    fn bad_argument_value_is_an_encode_error() {
        let call = CallDescriptor::new("balanceOf(address)(uint256)")
            .arg("not an address")
            .returns("B");
        assert!(matches!(
            compile(&call, MULTICALL),
            Err(AggregateError::Encode { .. })
        ));
    }

    #[test]
    fn later_keys_overwrite_argument_map() {
        let calls = vec![
            CallDescriptor::new("balanceOf(address)(uint256)")
                .arg("0x0000000000000000000000000000000000000001")
                .returns("BAL"),
            CallDescriptor::new("getBlockNumber()(uint256)").returns("BLOCK"),
            CallDescriptor::new("balanceOf(address)(uint256)")
                .arg("0x0000000000000000000000000000000000000002")
                .returns("BAL"),
        ];
        let map = key_to_args(&calls);
        assert_eq!(map.len(), 1);
        assert_eq!(
            map["BAL"],
            vec![Value::from("0x0000000000000000000000000000000000000002")]
        );
        assert!(!map.contains_key("BLOCK"));
    }

    #[test]
    fn paren_groups_are_non_greedy() {
        assert_eq!(paren_groups("f(a,b)(c)"), vec!["a,b", "c"]);
        assert_eq!(paren_groups("f()"), vec![""]);
        assert!(paren_groups("f").is_empty());
        assert_eq!(signature_of("transfer(address, uint256)(bool)"), "transfer(address,uint256)");
    }
}
