//! chaincall-ws: best-effort block notifications over WebSocket.
//!
//! [`NewHeads`] subscribes to `newHeads` and yields block numbers as a
//! `futures::Stream`, reconnecting with exponential backoff. A watcher uses
//! it to poll as soon as a block lands instead of waiting for its timer.

pub mod heads;

pub use heads::{parse_head, NewHeads, NewHeadsConfig};
