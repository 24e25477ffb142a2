//! Function selector computation.
//!
//! The selector of a function is the first four bytes of the keccak256 hash
//! of its canonical signature string, e.g.:
//!   keccak256("balanceOf(address)")[..4] → 0x70a08231

use tiny_keccak::{Hasher, Keccak};

/// Signature of the aggregator entry point used for every aggregate call.
pub const AGGREGATE_SIGNATURE: &str = "tryBlockAndAggregate(bool,(address,bytes)[])";

/// keccak256 of an arbitrary byte string.
pub fn keccak256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(input);
    hasher.finalize(&mut output);
    output
}

/// 4-byte selector for `name(type1,type2,...)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}
