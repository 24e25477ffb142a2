//! Listener registries and the cached store they are fed from.
//!
//! The hub is shared between the watcher handle (registration, snapshots)
//! and the actor (store updates, dispatch). Callbacks never run while the
//! registry lock is held, and a panicking callback is caught and reported
//! to the error listeners instead of unwinding into the actor.
//!
//! Every invocation holds the read side of a dispatch gate; `stop` takes
//! the write side after raising the stopped flag, so once it returns no
//! callback is running or will run.

use std::any::Any;
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, Weak};

use chaincall_core::{ArgumentKeyMap, Value};
use indexmap::IndexMap;

use crate::diff;
use crate::error::WatchError;
use crate::events::{EventKind, WatchEvent, WatcherSnapshot};

type Callback = Box<dyn FnMut(&WatchEvent) + Send>;
type Listener = Arc<Mutex<Callback>>;

thread_local! {
    /// Callbacks currently running on this thread. Nested dispatch (a
    /// listener registering another, or calling `stop`) must not touch the
    /// gate again.
    static DISPATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
}

fn in_dispatch() -> bool {
    DISPATCH_DEPTH.with(|d| d.get() > 0)
}

/// Last accepted cycle.
#[derive(Debug, Default)]
pub(crate) struct Store {
    pub transformed: IndexMap<String, Value>,
    pub original: IndexMap<String, Value>,
    pub key_to_args: ArgumentKeyMap,
    pub block_number: Option<u64>,
    pub request_id: u64,
    pub calls: usize,
}

impl Store {
    pub fn snapshot(&self) -> WatcherSnapshot {
        WatcherSnapshot {
            block_number: self.block_number,
            request_id: self.request_id,
            calls: self.calls,
            store: self.transformed.clone(),
            original: self.original.clone(),
        }
    }
}

#[derive(Default)]
struct State {
    registries: [Vec<(u64, Listener)>; 5],
    store: Store,
}

#[derive(Default)]
pub(crate) struct Hub {
    state: Mutex<State>,
    gate: RwLock<()>,
    next_id: AtomicU64,
    stopped: AtomicBool,
}

impl Hub {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `callback` for `kind`, first replaying whatever `replay`
    /// derives from the current store.
    ///
    /// The listener's own lock is held until the replay is delivered, so a
    /// concurrent dispatch cannot overtake it.
    pub fn register(
        self: &Arc<Self>,
        kind: EventKind,
        callback: Callback,
        replay: impl FnOnce(&Store) -> Vec<WatchEvent>,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let listener: Listener = Arc::new(Mutex::new(callback));
        let mut guard = listener.lock().unwrap_or_else(|e| e.into_inner());

        let initial = {
            let mut state = self.lock();
            let initial = if self.is_stopped() {
                vec![]
            } else {
                replay(&state.store)
            };
            if !self.is_stopped() {
                state.registries[kind.index()].push((id, listener.clone()));
            }
            initial
        };

        for event in &initial {
            match self.dispatch(&mut guard, event) {
                None => break,
                Some(Ok(())) => {}
                Some(Err(message)) => {
                    drop(guard);
                    self.report_panic(kind, message);
                    break;
                }
            }
        }

        Subscription {
            hub: Arc::downgrade(self),
            kind,
            id,
        }
    }

    fn unregister(&self, kind: EventKind, id: u64) {
        self.lock().registries[kind.index()].retain(|(i, _)| *i != id);
    }

    #[cfg(test)]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.lock().registries[kind.index()].len()
    }

    /// Deliver `event` to every listener of its kind, in registration order.
    pub fn emit(&self, event: &WatchEvent) {
        let kind = event.kind();
        let listeners: Vec<Listener> = {
            let state = self.lock();
            state.registries[kind.index()]
                .iter()
                .map(|(_, l)| l.clone())
                .collect()
        };
        for listener in listeners {
            let mut guard = listener.lock().unwrap_or_else(|e| e.into_inner());
            match self.dispatch(&mut guard, event) {
                None => return,
                Some(Ok(())) => {}
                Some(Err(message)) => {
                    drop(guard);
                    self.report_panic(kind, message);
                }
            }
        }
    }

    /// Run one callback under the dispatch gate. `None` once stopped.
    fn dispatch(&self, callback: &mut Callback, event: &WatchEvent) -> Option<Result<(), String>> {
        let _gate: Option<RwLockReadGuard<'_, ()>> =
            (!in_dispatch()).then(|| self.gate.read().unwrap_or_else(|e| e.into_inner()));
        if self.is_stopped() {
            return None;
        }
        DISPATCH_DEPTH.with(|d| d.set(d.get() + 1));
        let result = invoke(callback, event);
        DISPATCH_DEPTH.with(|d| d.set(d.get() - 1));
        Some(result)
    }

    fn report_panic(&self, kind: EventKind, message: String) {
        tracing::warn!(%kind, %message, "listener panicked");
        // a panicking error listener is only logged
        if kind == EventKind::Error {
            return;
        }
        let snapshot = self.snapshot();
        self.emit(&WatchEvent::Error(
            WatchError::ListenerPanicked { kind, message },
            snapshot,
        ));
    }

    pub fn with_store<R>(&self, f: impl FnOnce(&mut Store) -> R) -> R {
        f(&mut self.lock().store)
    }

    pub fn snapshot(&self) -> WatcherSnapshot {
        self.lock().store.snapshot()
    }

    pub fn replay_updates(store: &Store) -> Vec<crate::events::Update> {
        diff::replay(&store.transformed, &store.key_to_args)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stop all delivery and drop every listener.
    ///
    /// Waits for callbacks running on other threads to return, unless
    /// called from inside a callback.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if !in_dispatch() {
            drop(self.gate.write().unwrap_or_else(|e| e.into_inner()));
        }
        let mut state = self.lock();
        for registry in state.registries.iter_mut() {
            registry.clear();
        }
    }
}

fn invoke(callback: &mut Callback, event: &WatchEvent) -> Result<(), String> {
    catch_unwind(AssertUnwindSafe(|| callback(event))).map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle for one registered listener.
///
/// Dropping it leaves the listener registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[derive(Debug)]
pub struct Subscription {
    hub: Weak<Hub>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn unsubscribe(self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unregister(self.kind, self.id);
        }
    }
}
