//! Aggregation executor.
//!
//! Packs a call set into one `tryBlockAndAggregate(bool,(address,bytes)[])`
//! call, submits it through an [`RpcTransport`] and decodes the
//! `(uint256 blockNumber, bytes32 blockHash, (bool,bytes)[] results)`
//! envelope into per-key values.
//!
//! Sub-calls that report `success = false` are never decoded. Every
//! declared output of such a call gets the zero value of its type class
//! (see [`crate::classify`]), so a caller passing `require_success = false`
//! always receives a full row of keys.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::B256;
use indexmap::IndexMap;
use serde::Serialize;

use crate::cache::{CallSetKey, CalldataCache, CompiledSet};
use crate::classify::fallback_value;
use crate::codec;
use crate::compiler::{self, ArgumentKeyMap, CompiledCall};
use crate::config::Endpoint;
use crate::error::AggregateError;
use crate::presets::PresetRegistry;
use crate::selector::{selector, AGGREGATE_SIGNATURE};
use crate::transport::RpcTransport;
use crate::types::{CallDescriptor, Value};

/// Decoded values of one aggregate call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationResult {
    pub block_number: u64,
    pub block_hash: B256,
    /// Values as decoded (or fallback values for failed sub-calls).
    pub original: IndexMap<String, Value>,
    /// Values after each key's transform; equal to `original` without one.
    pub transformed: IndexMap<String, Value>,
}

/// Result of [`Aggregator::aggregate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregation {
    pub results: AggregationResult,
    pub key_to_args: ArgumentKeyMap,
}

/// Runs aggregate calls against any endpoint through one transport.
///
/// Holds the preset table and a bounded calldata cache, so repeated calls
/// with an unchanged call set skip compilation.
pub struct Aggregator {
    transport: Arc<dyn RpcTransport>,
    presets: PresetRegistry,
    cache: Mutex<CalldataCache>,
    next_id: AtomicU64,
}

impl Aggregator {
    /// Create an aggregator using the built-in presets.
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self::with_presets(transport, PresetRegistry::builtin())
    }

    pub fn with_presets(transport: Arc<dyn RpcTransport>, presets: PresetRegistry) -> Self {
        Self {
            transport,
            presets,
            cache: Mutex::new(CalldataCache::default()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn presets(&self) -> &PresetRegistry {
        &self.presets
    }

    pub fn transport(&self) -> &Arc<dyn RpcTransport> {
        &self.transport
    }

    /// Compile `calls` and pack them into aggregate calldata without any
    /// network I/O. Fails with construction errors only.
    pub fn prepare(
        &self,
        calls: &[CallDescriptor],
        require_success: bool,
        endpoint: &Endpoint,
    ) -> Result<Arc<CompiledSet>, AggregateError> {
        let resolved = endpoint.resolve(&self.presets)?;
        let key = CallSetKey::new(calls, require_success, resolved.multicall_address);

        if let Some(hit) = self.lock_cache().get(&key) {
            tracing::trace!(calls = calls.len(), "calldata cache hit");
            return Ok(hit);
        }

        let compiled = compiler::compile_all(calls, resolved.multicall_address)?;
        check_return_arity(&compiled)?;
        let set = Arc::new(CompiledSet {
            calldata: pack(&compiled, require_success),
            calls: compiled,
        });
        self.lock_cache().insert(key, set.clone());
        Ok(set)
    }

    /// Run one aggregate call.
    ///
    /// `calls` may be a single [`CallDescriptor`] or a `Vec` of them.
    /// Construction errors are returned before anything is sent.
    pub async fn aggregate(
        &self,
        calls: impl Into<Vec<CallDescriptor>>,
        require_success: bool,
        endpoint: &Endpoint,
    ) -> Result<Aggregation, AggregateError> {
        let calls: Vec<CallDescriptor> = calls.into();
        let resolved = endpoint.resolve(&self.presets)?;
        let set = self.prepare(&calls, require_success, endpoint)?;
        let key_to_args = compiler::key_to_args(&calls);

        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            request_id,
            calls = calls.len(),
            require_success,
            url = %resolved.rpc_url,
            transport = self.transport.name(),
            "submitting aggregate call"
        );

        let raw = self
            .transport
            .eth_call(
                &resolved.rpc_url,
                request_id,
                resolved.multicall_address,
                &set.calldata,
            )
            .await
            .map_err(|e| {
                if require_success && e.is_revert() {
                    AggregateError::Reverted {
                        reason: e.to_string(),
                    }
                } else {
                    AggregateError::Transport(e)
                }
            })?;

        let results = decode(&raw, &set.calls, &calls)?;
        tracing::debug!(
            request_id,
            block = results.block_number,
            keys = results.original.len(),
            "aggregate call decoded"
        );
        Ok(Aggregation {
            results,
            key_to_args,
        })
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, CalldataCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One-shot convenience: aggregate with a fresh [`Aggregator`] and the
/// built-in presets.
pub async fn aggregate(
    transport: Arc<dyn RpcTransport>,
    calls: impl Into<Vec<CallDescriptor>>,
    require_success: bool,
    endpoint: &Endpoint,
) -> Result<Aggregation, AggregateError> {
    Aggregator::new(transport)
        .aggregate(calls, require_success, endpoint)
        .await
}

fn check_return_arity(calls: &[CompiledCall]) -> Result<(), AggregateError> {
    let declared_types: usize = calls.iter().map(|c| c.return_types.len()).sum();
    let declared_keys: usize = calls.iter().map(|c| c.returns.len()).sum();
    if declared_types != declared_keys {
        return Err(AggregateError::ReturnArityMismatch {
            declared_types,
            declared_keys,
        });
    }
    Ok(())
}

/// `selector ++ abi(requireSuccess, (target, calldata)[])`
fn pack(calls: &[CompiledCall], require_success: bool) -> Vec<u8> {
    let entries = calls
        .iter()
        .map(|c| {
            DynSolValue::Tuple(vec![
                DynSolValue::Address(c.target),
                DynSolValue::Bytes(c.calldata.clone()),
            ])
        })
        .collect();
    let params = DynSolValue::Tuple(vec![
        DynSolValue::Bool(require_success),
        DynSolValue::Array(entries),
    ]);
    let mut out = selector(AGGREGATE_SIGNATURE).to_vec();
    out.extend_from_slice(&params.abi_encode_params());
    out
}

/// `(uint256, bytes32, (bool, bytes)[])`
fn envelope_type() -> DynSolType {
    DynSolType::Tuple(vec![
        DynSolType::Uint(256),
        DynSolType::FixedBytes(32),
        DynSolType::Array(Box::new(DynSolType::Tuple(vec![
            DynSolType::Bool,
            DynSolType::Bytes,
        ]))),
    ])
}

fn decode_error(reason: impl Into<String>) -> AggregateError {
    AggregateError::Decode {
        reason: reason.into(),
    }
}

fn decode(
    raw: &[u8],
    compiled: &[CompiledCall],
    descriptors: &[CallDescriptor],
) -> Result<AggregationResult, AggregateError> {
    let envelope = envelope_type()
        .abi_decode_params(raw)
        .map_err(|e| decode_error(e.to_string()))?;

    let DynSolValue::Tuple(mut parts) = envelope else {
        return Err(decode_error("envelope is not a tuple"));
    };
    let (
        Some(DynSolValue::Array(rows)),
        Some(DynSolValue::FixedBytes(hash, _)),
        Some(DynSolValue::Uint(number, _)),
    ) = (parts.pop(), parts.pop(), parts.pop())
    else {
        return Err(decode_error("unexpected envelope layout"));
    };
    let block_number = u64::try_from(number)
        .map_err(|_| decode_error(format!("block number {number} overflows u64")))?;

    if rows.len() != compiled.len() {
        return Err(decode_error(format!(
            "{} result(s) for {} call(s)",
            rows.len(),
            compiled.len()
        )));
    }

    let mut values = Vec::new();
    for (call, row) in compiled.iter().zip(rows) {
        let (success, data) = match row {
            DynSolValue::Tuple(mut pair) if pair.len() == 2 => match (pair.pop(), pair.pop()) {
                (Some(DynSolValue::Bytes(data)), Some(DynSolValue::Bool(success))) => {
                    (success, data)
                }
                _ => return Err(decode_error("malformed result row")),
            },
            _ => return Err(decode_error("malformed result row")),
        };
        values.extend(decode_call(call, success, &data)?);
    }

    let specs = descriptors.iter().flat_map(|d| d.returns.iter());
    let mut original = IndexMap::new();
    let mut transformed = IndexMap::new();
    for (spec, value) in specs.zip(values) {
        transformed.insert(spec.key.clone(), spec.apply(&value));
        original.insert(spec.key.clone(), value);
    }

    Ok(AggregationResult {
        block_number,
        block_hash: hash,
        original,
        transformed,
    })
}

fn decode_call(call: &CompiledCall, success: bool, data: &[u8]) -> Result<Vec<Value>, AggregateError> {
    if !success {
        tracing::trace!(
            signature = %call.signature,
            to = %call.target,
            "sub-call failed, using fallbacks"
        );
        return Ok(call.return_types.iter().map(|t| fallback_value(t)).collect());
    }
    let decoded = codec::decode_params(call.return_sol_types(), data)
        .map_err(|e| decode_error(format!("{}: {e}", call.signature)))?;
    Ok(decoded
        .into_iter()
        .zip(&call.return_types)
        .map(|(v, ty)| normalize_bool(v, ty))
        .collect())
}

/// A declared `bool` output is always a real boolean.
fn normalize_bool(value: Value, ty: &str) -> Value {
    match value {
        Value::Bool(_) => value,
        other if ty == "bool" => Value::Bool(other.to_string() == "true"),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};

    #[test]
    fn pack_starts_with_aggregate_selector() {
        let call = CallDescriptor::new("getBlockNumber()(uint256)").returns("B");
        let compiled = compiler::compile_all(&[call], Address::ZERO).unwrap();
        let data = pack(&compiled, true);
        assert_eq!(data[..4], selector(AGGREGATE_SIGNATURE));
        // bool word = 1
        assert_eq!(data[4 + 31], 1);
    }

    #[test]
    fn return_arity_is_checked_across_the_set() {
        let calls = vec![CallDescriptor::new("getReserves()(uint112,uint112)").returns("R0")];
        let compiled = compiler::compile_all(&calls, Address::ZERO).unwrap();
        assert!(matches!(
            check_return_arity(&compiled),
            Err(AggregateError::ReturnArityMismatch {
                declared_types: 2,
                declared_keys: 1
            })
        ));
    }

    #[test]
    fn bool_outputs_are_normalized() {
        assert_eq!(normalize_bool(Value::from("true"), "bool"), Value::Bool(true));
        assert_eq!(normalize_bool(Value::from("yes"), "bool"), Value::Bool(false));
        assert_eq!(normalize_bool(Value::Bool(true), "bool"), Value::Bool(true));
        assert_eq!(normalize_bool(Value::from(1u64), "uint256"), Value::from(1u64));
    }

    #[test]
    fn decode_rejects_row_count_mismatch() {
        let raw = DynSolValue::Tuple(vec![
            DynSolValue::Uint(U256::from(10), 256),
            DynSolValue::FixedBytes(B256::ZERO, 32),
            DynSolValue::Array(vec![]),
        ])
        .abi_encode_params();
        let calls = vec![CallDescriptor::new("getBlockNumber()(uint256)").returns("B")];
        let compiled = compiler::compile_all(&calls, Address::ZERO).unwrap();
        assert!(matches!(
            decode(&raw, &compiled, &calls),
            Err(AggregateError::Decode { .. })
        ));
    }
}
