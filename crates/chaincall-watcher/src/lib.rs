//! chaincall-watcher: a live view over aggregated contract calls.
//!
//! A [`Watcher`] re-runs an aggregate call on a timer (and, optionally, on
//! every new block), keeps the last accepted values and tells listeners
//! what changed:
//!
//! - [`Watcher::subscribe`]: one call per changed key
//! - [`Watcher::batch`]: one call per cycle with every changed key
//! - [`Watcher::on_new_block`] / [`Watcher::on_poll`] / [`Watcher::on_error`]
//!
//! Responses for a block not newer than the last accepted one are treated
//! as node lag: nothing is published and the next poll comes sooner.
//! Failures are reported to error listeners and retried indefinitely.
//!
//! ```no_run
//! # async fn run(transport: std::sync::Arc<dyn chaincall_core::RpcTransport>) {
//! use chaincall_core::{CallDescriptor, Endpoint};
//! use chaincall_watcher::{create_watcher, WatcherConfig};
//!
//! let calls = vec![CallDescriptor::new("getBlockNumber()(uint256)").returns("BLOCK")];
//! let watcher = create_watcher(transport, calls, false, WatcherConfig::new(Endpoint::preset("ethereum")));
//! watcher.subscribe(|u| println!("{} = {}", u.key, u.value));
//! watcher.start();
//! watcher.await_initial_fetch().await.ok();
//! # }
//! ```

pub mod config;
pub mod diff;
pub mod error;
pub mod events;
mod hub;
pub mod watcher;

pub use config::WatcherConfig;
pub use error::WatchError;
pub use events::{EventKind, PollInfo, Update, WatchEvent, WatcherSnapshot};
pub use hub::Subscription;
pub use watcher::{create_watcher, FetchHandle, Watcher};
