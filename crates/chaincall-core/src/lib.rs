//! chaincall-core: multicall aggregation for EVM chains.
//!
//! # Overview
//!
//! Many independent read-only contract calls are bundled into a single
//! `eth_call` against an on-chain aggregator contract, and the packed
//! response is decoded back into one value per named output.
//!
//! - [`CallDescriptor`]: `name(argTypes)(returnTypes)` plus arguments and
//!   output keys
//! - [`compiler`]: descriptor → [`CompiledCall`] (selector + encoded args)
//! - [`Aggregator`]: packs, submits and decodes an aggregate call
//! - [`classify`]: fallback values for failed sub-calls
//! - [`RpcTransport`]: the async seam every transport implements
//! - [`PresetRegistry`] / [`Endpoint`]: where calls go
//!
//! ```no_run
//! # async fn run(transport: std::sync::Arc<dyn chaincall_core::RpcTransport>) -> Result<(), chaincall_core::AggregateError> {
//! use chaincall_core::{Aggregator, CallDescriptor, Endpoint};
//!
//! let aggregator = Aggregator::new(transport);
//! let call = CallDescriptor::new("getEthBalance(address)(uint256)")
//!     .arg("0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045")
//!     .returns("VITALIK_ETH");
//! let out = aggregator.aggregate(call, false, &Endpoint::preset("ethereum")).await?;
//! println!("{} at block {}", out.results.transformed["VITALIK_ETH"], out.results.block_number);
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod cache;
pub mod classify;
pub mod codec;
pub mod compiler;
pub mod config;
pub mod error;
pub mod presets;
pub mod request;
pub mod selector;
pub mod transport;
pub mod types;

pub use aggregate::{aggregate, Aggregation, AggregationResult, Aggregator};
pub use classify::{classify, fallback_value, TypeClass};
pub use compiler::{ArgumentKeyMap, CompiledCall};
pub use config::Endpoint;
pub use error::{AggregateError, TransportError};
pub use presets::{Preset, PresetRegistry};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use transport::RpcTransport;
pub use types::{CallDescriptor, ReturnSpec, Transform, Value};

pub use alloy_primitives::{Address, B256, I256, U256};
