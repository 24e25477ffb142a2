//! Events delivered to watcher listeners.

use std::fmt;

use chaincall_core::Value;
use indexmap::IndexMap;
use serde::Serialize;

use crate::error::WatchError;

/// One changed key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Update {
    #[serde(rename = "type")]
    pub key: String,
    /// The transformed value.
    pub value: Value,
    /// Arguments of the call that produced `key`; empty for calls without
    /// arguments.
    pub args: Vec<Value>,
}

/// Emitted at the start of every poll attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollInfo {
    pub id: u64,
    pub latest_block_number: Option<u64>,
    /// Consecutive failed attempts so far; `None` on a first attempt.
    pub retry: Option<u32>,
}

/// Watcher state handed to error listeners.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherSnapshot {
    pub block_number: Option<u64>,
    pub request_id: u64,
    pub calls: usize,
    /// Last accepted transformed values.
    pub store: IndexMap<String, Value>,
    /// The same values before transforms.
    pub original: IndexMap<String, Value>,
}

#[derive(Debug, Clone)]
pub enum WatchEvent {
    Update(Update),
    Batch(Vec<Update>),
    NewBlock(u64),
    Poll(PollInfo),
    Error(WatchError, WatcherSnapshot),
}

impl WatchEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Update(_) => EventKind::Update,
            Self::Batch(_) => EventKind::Batch,
            Self::NewBlock(_) => EventKind::NewBlock,
            Self::Poll(_) => EventKind::Poll,
            Self::Error(..) => EventKind::Error,
        }
    }
}

/// Listener registry an event is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Update,
    Batch,
    NewBlock,
    Poll,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Update,
        EventKind::Batch,
        EventKind::NewBlock,
        EventKind::Poll,
        EventKind::Error,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Update => "update",
            Self::Batch => "batch",
            Self::NewBlock => "new-block",
            Self::Poll => "poll",
            Self::Error => "error",
        })
    }
}
