//! The watcher: a handle plus a single-owner actor task.
//!
//! All state mutation happens on the actor. The handle only sends
//! commands, registers listeners and reads snapshots, so `tap`, `recreate`,
//! `stop` and the poll loop are serialized without sharing locks across
//! the I/O path.
//!
//! Every in-flight request is tagged with the generation it was issued
//! under. `tap` and `recreate` bump the generation; a response whose tag
//! no longer matches is dropped unread and a fresh cycle starts.

use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use chaincall_core::{AggregateError, Aggregation, Aggregator, CallDescriptor, RpcTransport};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};

use crate::config::WatcherConfig;
use crate::diff;
use crate::error::WatchError;
use crate::events::{EventKind, PollInfo, Update, WatchEvent, WatcherSnapshot};
use crate::hub::{Hub, Subscription};

type Outcome = Result<u64, WatchError>;
type Waiter = oneshot::Sender<Outcome>;
type ModelFn = Box<dyn FnOnce(Vec<CallDescriptor>) -> Vec<CallDescriptor> + Send>;

/// Deferred outcome of [`Watcher::poll`], [`Watcher::tap`] or
/// [`Watcher::recreate`], yielding a block number.
///
/// A `poll` handle settles with the next completed cycle: the new block,
/// the last accepted block on a stale read, or the cycle's error. `tap` and
/// `recreate` handles wait until a cycle built from the new call set lands.
/// Every handle fails with [`WatchError::Stopped`] if the watcher stops
/// first, or with the aggregate error if the call set cannot be compiled.
#[must_use = "a fetch handle does nothing unless awaited"]
pub struct FetchHandle {
    rx: oneshot::Receiver<Outcome>,
}

impl FetchHandle {
    fn ready(outcome: Outcome) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self { rx }
    }
}

impl Future for FetchHandle {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(WatchError::Stopped)))
    }
}

enum Command {
    Start,
    Poll(Waiter),
    Tap(ModelFn, Waiter),
    Recreate {
        calls: Vec<CallDescriptor>,
        config: WatcherConfig,
        epoch: u64,
        waiter: Waiter,
    },
    BlockSource(BoxStream<'static, u64>),
    Stop,
}

#[derive(Debug, Clone, Copy, Default)]
struct Progress {
    /// Latest epoch whose first cycle has completed.
    done_epoch: Option<u64>,
    stopped: bool,
}

struct Shared {
    hub: Arc<Hub>,
    running: AtomicBool,
    stopped: AtomicBool,
    /// Bumped by `recreate`; `await_initial_fetch` waits for this epoch.
    epoch: AtomicU64,
    progress: watch::Sender<Progress>,
    model: Mutex<Vec<CallDescriptor>>,
}

impl Shared {
    fn set_model(&self, calls: &[CallDescriptor]) {
        *self.model.lock().unwrap_or_else(|e| e.into_inner()) = calls.to_vec();
    }
}

/// A live, continuously refreshed view over a set of calls.
///
/// Cloning yields another handle to the same watcher. The actor task ends
/// on [`stop`](Self::stop) or once every handle is dropped.
#[derive(Clone)]
pub struct Watcher {
    shared: Arc<Shared>,
    cmd_tx: mpsc::UnboundedSender<Command>,
}

/// Create a watcher over `calls` using a fresh [`Aggregator`] with the
/// built-in presets. Polling begins at [`Watcher::start`].
pub fn create_watcher(
    transport: Arc<dyn RpcTransport>,
    calls: impl Into<Vec<CallDescriptor>>,
    require_success: bool,
    config: WatcherConfig,
) -> Watcher {
    Watcher::new(Arc::new(Aggregator::new(transport)), calls, require_success, config)
}

impl Watcher {
    /// Create a watcher. Must be called inside a tokio runtime; the actor
    /// task is spawned immediately but stays idle until `start`.
    pub fn new(
        aggregator: Arc<Aggregator>,
        calls: impl Into<Vec<CallDescriptor>>,
        require_success: bool,
        config: WatcherConfig,
    ) -> Self {
        let calls: Vec<CallDescriptor> = calls.into();
        let (progress, _) = watch::channel(Progress::default());
        let shared = Arc::new(Shared {
            hub: Arc::new(Hub::default()),
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            progress,
            model: Mutex::new(calls.clone()),
        });
        shared.hub.with_store(|s| s.calls = calls.len());

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let actor = Actor {
            aggregator,
            shared: shared.clone(),
            cmd_rx,
            calls,
            require_success,
            config,
            running: false,
            generation: 0,
            epoch: 0,
            epoch_done: false,
            request_id: 0,
            retry: 0,
            accept_equal_block: false,
            everything_changed: true,
            paused: false,
            in_flight: None,
            next_poll: None,
            poll_waiters: Vec::new(),
            waiters: Vec::new(),
            heads: None,
        };
        tokio::spawn(actor.run());

        Self { shared, cmd_tx }
    }

    fn send(&self, cmd: Command) {
        // a closed channel means the actor is gone; waiters see `Stopped`
        let _ = self.cmd_tx.send(cmd);
    }

    /// Begin polling. The first cycle runs immediately. No-op when already
    /// running or stopped.
    pub fn start(&self) {
        if self.shared.stopped.load(Ordering::SeqCst) {
            return;
        }
        if !self.shared.running.swap(true, Ordering::SeqCst) {
            self.send(Command::Start);
        }
    }

    /// Stop for good: no further polls, and no listener is invoked after
    /// this returns. Idempotent.
    pub fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.hub.stop();
        self.shared.progress.send_modify(|p| p.stopped = true);
        self.send(Command::Stop);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Run a cycle now (or join the one in flight). Also resumes polling
    /// paused by a rejected call set.
    pub fn poll(&self) -> FetchHandle {
        if self.shared.stopped.load(Ordering::SeqCst) {
            return FetchHandle::ready(Err(WatchError::Stopped));
        }
        if !self.is_running() {
            return FetchHandle::ready(Err(WatchError::NotRunning));
        }
        let (tx, rx) = oneshot::channel();
        self.send(Command::Poll(tx));
        FetchHandle { rx }
    }

    /// Replace the call set with `f(current)` and force a fresh cycle.
    ///
    /// A request already in flight is discarded on arrival. The handle
    /// resolves once a cycle built from the new call set lands.
    pub fn tap<F>(&self, f: F) -> FetchHandle
    where
        F: FnOnce(Vec<CallDescriptor>) -> Vec<CallDescriptor> + Send + 'static,
    {
        if self.shared.stopped.load(Ordering::SeqCst) {
            return FetchHandle::ready(Err(WatchError::Stopped));
        }
        let (tx, rx) = oneshot::channel();
        self.send(Command::Tap(Box::new(f), tx));
        FetchHandle { rx }
    }

    /// Replace both the call set and the configuration, reset the store
    /// and block baseline, and restart as [`start`](Self::start) does.
    pub fn recreate(
        &self,
        calls: impl Into<Vec<CallDescriptor>>,
        config: WatcherConfig,
    ) -> FetchHandle {
        if self.shared.stopped.load(Ordering::SeqCst) {
            return FetchHandle::ready(Err(WatchError::Stopped));
        }
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.running.store(true, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.send(Command::Recreate {
            calls: calls.into(),
            config,
            epoch,
            waiter: tx,
        });
        FetchHandle { rx }
    }

    /// Wait for the first cycle after the latest `start`/`recreate` to
    /// finish, successfully or not.
    pub async fn await_initial_fetch(&self) -> Result<(), WatchError> {
        let target = self.shared.epoch.load(Ordering::SeqCst);
        let mut rx = self.shared.progress.subscribe();
        let reached = |p: &Progress| p.done_epoch.is_some_and(|d| d >= target);
        let progress = *rx
            .wait_for(|p| p.stopped || reached(p))
            .await
            .map_err(|_| WatchError::Stopped)?;
        if reached(&progress) {
            Ok(())
        } else {
            Err(WatchError::Stopped)
        }
    }

    /// Feed new block numbers from `source`; a block newer than the last
    /// accepted one triggers a poll ahead of the timer.
    pub fn with_block_source<S>(&self, source: S)
    where
        S: Stream<Item = u64> + Send + 'static,
    {
        self.send(Command::BlockSource(source.boxed()));
    }

    /// Per-key listener. The cached store is replayed to it immediately.
    pub fn subscribe<F>(&self, mut f: F) -> Subscription
    where
        F: FnMut(&Update) + Send + 'static,
    {
        self.shared.hub.register(
            EventKind::Update,
            Box::new(move |ev| {
                if let WatchEvent::Update(u) = ev {
                    f(u)
                }
            }),
            |store| {
                Hub::replay_updates(store)
                    .into_iter()
                    .map(WatchEvent::Update)
                    .collect()
            },
        )
    }

    /// One call per cycle with every changed key; the cached store is
    /// replayed as one batch if non-empty.
    pub fn batch<F>(&self, mut f: F) -> Subscription
    where
        F: FnMut(&[Update]) + Send + 'static,
    {
        self.shared.hub.register(
            EventKind::Batch,
            Box::new(move |ev| {
                if let WatchEvent::Batch(updates) = ev {
                    f(updates)
                }
            }),
            |store| {
                let updates = Hub::replay_updates(store);
                if updates.is_empty() {
                    vec![]
                } else {
                    vec![WatchEvent::Batch(updates)]
                }
            },
        )
    }

    pub fn on_new_block<F>(&self, mut f: F) -> Subscription
    where
        F: FnMut(u64) + Send + 'static,
    {
        self.shared.hub.register(
            EventKind::NewBlock,
            Box::new(move |ev| {
                if let WatchEvent::NewBlock(n) = ev {
                    f(*n)
                }
            }),
            |_| vec![],
        )
    }

    pub fn on_poll<F>(&self, mut f: F) -> Subscription
    where
        F: FnMut(&PollInfo) + Send + 'static,
    {
        self.shared.hub.register(
            EventKind::Poll,
            Box::new(move |ev| {
                if let WatchEvent::Poll(info) = ev {
                    f(info)
                }
            }),
            |_| vec![],
        )
    }

    pub fn on_error<F>(&self, mut f: F) -> Subscription
    where
        F: FnMut(&WatchError, &WatcherSnapshot) + Send + 'static,
    {
        self.shared.hub.register(
            EventKind::Error,
            Box::new(move |ev| {
                if let WatchEvent::Error(e, snapshot) = ev {
                    f(e, snapshot)
                }
            }),
            |_| vec![],
        )
    }

    /// The current call set.
    pub fn schemas(&self) -> Vec<CallDescriptor> {
        self.shared
            .model
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn snapshot(&self) -> WatcherSnapshot {
        self.shared.hub.snapshot()
    }
}

struct InFlight {
    generation: u64,
    request_id: u64,
    fut: BoxFuture<'static, Result<Aggregation, AggregateError>>,
}

struct Actor {
    aggregator: Arc<Aggregator>,
    shared: Arc<Shared>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    calls: Vec<CallDescriptor>,
    require_success: bool,
    config: WatcherConfig,
    running: bool,
    generation: u64,
    epoch: u64,
    epoch_done: bool,
    request_id: u64,
    /// Consecutive failures of the current cycle.
    retry: u32,
    /// After `tap` the same block may legitimately be re-read.
    accept_equal_block: bool,
    /// First cycle after start/recreate reports every key.
    everything_changed: bool,
    /// Set after a construction error; only `poll`, `tap` or `recreate`
    /// resume polling.
    paused: bool,
    in_flight: Option<InFlight>,
    next_poll: Option<Instant>,
    /// `poll()` handles: settled by the next completed cycle.
    poll_waiters: Vec<Waiter>,
    /// `tap`/`recreate` handles: settled once their call set lands.
    waiters: Vec<Waiter>,
    heads: Option<BoxStream<'static, u64>>,
}

impl Actor {
    async fn run(mut self) {
        loop {
            let timer_armed = !self.paused && self.in_flight.is_none() && self.next_poll.is_some();
            tokio::select! {
                biased;

                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Stop) | None => break,
                    Some(cmd) => self.handle(cmd),
                },
                (generation, request_id, res) = wait_in_flight(&mut self.in_flight) => {
                    self.in_flight = None;
                    self.on_result(generation, request_id, res);
                }
                _ = wait_until(self.next_poll), if timer_armed => self.begin_cycle(),
                head = next_head(&mut self.heads) => self.on_head(head),
            }
        }
        self.shutdown();
    }

    fn stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    fn handle(&mut self, cmd: Command) {
        if self.stopped() {
            return;
        }
        match cmd {
            Command::Start => {
                if !self.running {
                    self.running = true;
                    tracing::info!(calls = self.calls.len(), "watcher started");
                    self.restart();
                }
            }
            Command::Poll(waiter) => {
                self.paused = false;
                self.poll_waiters.push(waiter);
                if self.in_flight.is_none() {
                    self.begin_cycle();
                }
            }
            Command::Tap(f, waiter) => {
                let model = std::mem::take(&mut self.calls);
                self.calls = f(model);
                self.shared.set_model(&self.calls);
                self.shared.hub.with_store(|s| s.calls = self.calls.len());
                self.generation += 1;
                self.accept_equal_block = true;
                self.paused = false;
                self.waiters.push(waiter);
                tracing::debug!(
                    calls = self.calls.len(),
                    generation = self.generation,
                    "call set tapped"
                );
                if self.running {
                    self.restart();
                }
            }
            Command::Recreate {
                calls,
                config,
                epoch,
                waiter,
            } => {
                self.calls = calls;
                self.config = config;
                self.shared.set_model(&self.calls);
                self.generation += 1;
                self.epoch = epoch;
                self.epoch_done = false;
                self.retry = 0;
                self.accept_equal_block = false;
                self.everything_changed = true;
                self.paused = false;
                let count = self.calls.len();
                self.shared.hub.with_store(|s| {
                    s.transformed.clear();
                    s.original.clear();
                    s.key_to_args.clear();
                    s.block_number = None;
                    s.calls = count;
                });
                self.waiters.push(waiter);
                self.running = true;
                tracing::info!(
                    calls = count,
                    generation = self.generation,
                    "watcher recreated"
                );
                self.restart();
            }
            Command::BlockSource(stream) => self.heads = Some(stream),
            Command::Stop => {}
        }
    }

    /// Poll now unless a request is in flight; its result will be
    /// discarded on arrival and a new cycle started then.
    fn restart(&mut self) {
        if self.in_flight.is_none() {
            self.begin_cycle();
        }
    }

    fn begin_cycle(&mut self) {
        self.next_poll = None;
        let info = PollInfo {
            id: self.request_id,
            latest_block_number: self.last_block(),
            retry: (self.retry > 0).then_some(self.retry),
        };
        tracing::debug!(request_id = info.id, retry = self.retry, "polling");
        self.shared.hub.emit(&WatchEvent::Poll(info));

        let aggregator = self.aggregator.clone();
        let calls = self.calls.clone();
        let require_success = self.require_success;
        let endpoint = self.config.endpoint.clone();
        self.in_flight = Some(InFlight {
            generation: self.generation,
            request_id: self.request_id,
            fut: async move { aggregator.aggregate(calls, require_success, &endpoint).await }
                .boxed(),
        });
    }

    fn schedule(&mut self, delay: std::time::Duration) {
        self.next_poll = Some(Instant::now() + delay);
    }

    fn last_block(&self) -> Option<u64> {
        self.shared.hub.with_store(|s| s.block_number)
    }

    fn on_result(
        &mut self,
        generation: u64,
        request_id: u64,
        res: Result<Aggregation, AggregateError>,
    ) {
        if self.stopped() {
            return;
        }
        if generation != self.generation {
            tracing::debug!(request_id, generation, "discarding superseded result");
            self.begin_cycle();
            return;
        }
        match res {
            Ok(aggregation) => self.on_success(aggregation),
            Err(e) => self.on_failure(e.into()),
        }
    }

    fn on_success(&mut self, aggregation: Aggregation) {
        let Aggregation {
            results,
            key_to_args,
        } = aggregation;
        let block = results.block_number;
        let last = self.last_block();
        let advanced = last.map_or(true, |l| block > l);
        let repeated = self.accept_equal_block && last == Some(block);

        self.request_id += 1;
        if !advanced && !repeated {
            tracing::debug!(block, last, "stale block, retrying sooner");
            // the cycle completed; `poll()` callers get the last accepted block
            let accepted = last.unwrap_or(block);
            for waiter in self.poll_waiters.drain(..) {
                let _ = waiter.send(Ok(accepted));
            }
            self.schedule(self.config.stale_block_retry_wait());
            return;
        }
        self.accept_equal_block = false;
        self.retry = 0;

        let request_id = self.request_id;
        let everything = self.everything_changed;
        let updates = self.shared.hub.with_store(|s| {
            let updates =
                diff::diff(&s.transformed, &results.transformed, &key_to_args, everything);
            s.transformed = results.transformed;
            s.original = results.original;
            s.key_to_args = key_to_args;
            s.block_number = Some(block);
            s.request_id = request_id;
            updates
        });
        self.everything_changed = false;

        tracing::debug!(block, changed = updates.len(), "poll landed");
        if advanced {
            self.shared.hub.emit(&WatchEvent::NewBlock(block));
        }
        for update in &updates {
            self.shared.hub.emit(&WatchEvent::Update(update.clone()));
        }
        if !updates.is_empty() {
            self.shared.hub.emit(&WatchEvent::Batch(updates));
        }

        self.finish_epoch();
        for waiter in self.poll_waiters.drain(..).chain(self.waiters.drain(..)) {
            let _ = waiter.send(Ok(block));
        }
        self.schedule(self.config.interval());
    }

    fn on_failure(&mut self, err: WatchError) {
        let snapshot = self.shared.hub.snapshot();
        if err.is_construction() {
            tracing::error!(error = %err, "call set rejected, polling paused");
            self.shared.hub.emit(&WatchEvent::Error(err.clone(), snapshot));
            self.finish_epoch();
            self.paused = true;
            self.next_poll = None;
            for waiter in self.poll_waiters.drain(..).chain(self.waiters.drain(..)) {
                let _ = waiter.send(Err(err.clone()));
            }
            return;
        }

        self.retry += 1;
        let delay = self.config.error_retry_wait();
        tracing::warn!(
            retry = self.retry,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "poll failed"
        );
        self.shared.hub.emit(&WatchEvent::Error(err.clone(), snapshot));
        self.finish_epoch();
        for waiter in self.poll_waiters.drain(..) {
            let _ = waiter.send(Err(err.clone()));
        }
        self.schedule(delay);
    }

    fn finish_epoch(&mut self) {
        if !self.epoch_done {
            self.epoch_done = true;
            let epoch = self.epoch;
            self.shared.progress.send_modify(|p| {
                p.done_epoch = Some(p.done_epoch.map_or(epoch, |d| d.max(epoch)));
            });
        }
    }

    fn on_head(&mut self, head: Option<u64>) {
        let Some(block) = head else {
            tracing::debug!("block source ended");
            self.heads = None;
            return;
        };
        let newer = self.last_block().map_or(true, |l| block > l);
        if self.running && !self.paused && newer && self.in_flight.is_none() {
            tracing::trace!(block, "new block notification, polling early");
            self.begin_cycle();
        }
    }

    fn shutdown(&mut self) {
        self.in_flight = None;
        self.heads = None;
        self.next_poll = None;
        self.running = false;
        for waiter in self.poll_waiters.drain(..).chain(self.waiters.drain(..)) {
            let _ = waiter.send(Err(WatchError::Stopped));
        }
        tracing::info!("watcher stopped");
    }
}

async fn wait_in_flight(
    slot: &mut Option<InFlight>,
) -> (u64, u64, Result<Aggregation, AggregateError>) {
    match slot {
        Some(f) => {
            let res = (&mut f.fut).await;
            (f.generation, f.request_id, res)
        }
        None => pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}

async fn next_head(heads: &mut Option<BoxStream<'static, u64>>) -> Option<u64> {
    match heads {
        Some(stream) => stream.next().await,
        None => pending().await,
    }
}
