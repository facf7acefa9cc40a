//! Connection pool implementation

use std::collections::{HashMap, VecDeque};
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use basalt_core::{
    BasaltError, Connection, ConnectionFactory, ExecResult, QueryResult, Result, Transaction,
    Value,
};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;

use super::config::PoolConfig;
use super::slot::PoolSlot;
use super::stats::PoolStats;
use crate::health::ping_connection;

/// How the pool obtains adapters for its slots
///
/// Exactly one strategy is supplied at construction; the enum makes
/// "neither" and "both" unrepresentable.
pub enum ConnectStrategy {
    /// Every slot wraps the same pre-existing adapter.
    ///
    /// This fits single-writer embedded stores: the pool serializes logical
    /// holders and applies backpressure, but does not add physical
    /// concurrency, since every slot funnels onto one handle. The shared
    /// handle is never closed by the pool; its owner closes it.
    Shared(Arc<dyn Connection>),
    /// A constructor produces an independent adapter per slot, created
    /// lazily as the pool grows. Fits networked multi-connection stores.
    Factory(Arc<dyn ConnectionFactory>),
}

impl ConnectStrategy {
    /// Shared-adapter strategy over an existing connection
    pub fn shared(connection: Arc<dyn Connection>) -> Self {
        Self::Shared(connection)
    }

    /// Per-slot strategy over an async connection constructor
    pub fn factory<F: ConnectionFactory>(factory: F) -> Self {
        Self::Factory(Arc::new(factory))
    }
}

/// A queued acquire request
///
/// The grant (a slot sent through `tx`) and the caller's timeout race;
/// whichever happens first wins and the loser observes the entry already
/// gone, so exactly one outcome fires per entry.
struct Waiter {
    id: u64,
    tx: oneshot::Sender<PoolSlot>,
}

/// Mutable pool state, all behind one lock
///
/// Every slot/queue transition happens under this mutex, which is what makes
/// the capacity and mutual-exclusion invariants check-then-act atomic.
struct PoolState {
    /// Current slot ceiling (runtime-resizable)
    max_size: usize,
    next_slot_id: u64,
    next_waiter_id: u64,
    /// Slots available for reuse
    idle: VecDeque<PoolSlot>,
    /// Adapters of checked-out slots, keyed by slot id
    active: HashMap<u64, Arc<dyn Connection>>,
    /// Creations in flight; they count toward the ceiling so concurrent
    /// acquires cannot overshoot it while a factory call is pending
    creating: usize,
    /// FIFO wait queue of blocked acquires
    waiting: VecDeque<Waiter>,
    draining: bool,
}

impl PoolState {
    fn new(max_size: usize) -> Self {
        Self {
            max_size,
            next_slot_id: 1,
            next_waiter_id: 1,
            idle: VecDeque::new(),
            active: HashMap::new(),
            creating: 0,
            waiting: VecDeque::new(),
            draining: false,
        }
    }

    fn total(&self) -> usize {
        self.idle.len() + self.active.len() + self.creating
    }

    fn alloc_slot_id(&mut self) -> u64 {
        let id = self.next_slot_id;
        self.next_slot_id += 1;
        id
    }

    fn alloc_waiter_id(&mut self) -> u64 {
        let id = self.next_waiter_id;
        self.next_waiter_id += 1;
        id
    }
}

enum AcquirePlan {
    Reuse(PoolSlot),
    Create,
    Wait(u64, oneshot::Receiver<PoolSlot>),
}

struct PoolShared {
    config: PoolConfig,
    strategy: ConnectStrategy,
    state: Mutex<PoolState>,
    /// Signalled by release when the pool is draining and the last active
    /// slot comes home, so drain wakes on the event instead of polling
    drained: Notify,
    pool_hits: AtomicU64,
    pool_misses: AtomicU64,
    total_queries: AtomicU64,
    total_latency_micros: AtomicU64,
    /// Self-reference for timers and background tasks
    me: Weak<PoolShared>,
}

impl PoolShared {
    fn per_slot(&self) -> bool {
        matches!(self.strategy, ConnectStrategy::Factory(_))
    }

    async fn create_connection(&self) -> Result<Arc<dyn Connection>> {
        match &self.strategy {
            ConnectStrategy::Shared(conn) => Ok(conn.clone()),
            ConnectStrategy::Factory(factory) => factory.create().await,
        }
    }

    async fn validate(&self, conn: &Arc<dyn Connection>) -> bool {
        match &self.strategy {
            ConnectStrategy::Shared(_) => !conn.is_closed(),
            ConnectStrategy::Factory(factory) => factory.validate(conn.as_ref()).await,
        }
    }

    /// Decide how to satisfy one acquire, atomically against all other
    /// slot/queue transitions
    fn plan_acquire(&self) -> Result<AcquirePlan> {
        let mut state = self.state.lock();

        if state.draining {
            return Err(BasaltError::PoolDraining);
        }

        if let Some(mut slot) = state.idle.pop_front() {
            slot.cancel_reaper();
            state.active.insert(slot.id(), slot.connection().clone());
            return Ok(AcquirePlan::Reuse(slot));
        }

        if state.total() < state.max_size {
            state.creating += 1;
            self.pool_misses.fetch_add(1, Ordering::Relaxed);
            return Ok(AcquirePlan::Create);
        }

        if state.waiting.len() >= self.config.max_wait_queue() {
            return Err(BasaltError::QueueFull(state.waiting.len()));
        }

        let (tx, rx) = oneshot::channel();
        let id = state.alloc_waiter_id();
        state.waiting.push_back(Waiter { id, tx });
        self.pool_misses.fetch_add(1, Ordering::Relaxed);
        Ok(AcquirePlan::Wait(id, rx))
    }

    /// Finish an acquire that reserved a creation
    async fn create_for_caller(&self, shared: Arc<PoolShared>) -> Result<PooledConnection> {
        match self.create_connection().await {
            Ok(conn) => {
                let slot = {
                    let mut state = self.state.lock();
                    state.creating -= 1;
                    if state.draining {
                        None
                    } else {
                        let id = state.alloc_slot_id();
                        state.active.insert(id, conn.clone());
                        Some(PoolSlot::new(id, conn.clone()))
                    }
                };
                match slot {
                    Some(slot) => {
                        tracing::debug!(slot_id = slot.id(), "created new pooled connection");
                        Ok(PooledConnection::new(shared, slot))
                    }
                    None => {
                        // Drain began while the factory was running; the
                        // fresh connection is not admitted.
                        self.close_in_background(conn);
                        Err(BasaltError::PoolDraining)
                    }
                }
            }
            Err(e) => {
                // The attempted slot never counts toward the ceiling.
                self.state.lock().creating -= 1;
                Err(e)
            }
        }
    }

    /// Wait in the queue until granted a slot, the per-call timeout fires,
    /// or drain rejects the queue
    async fn wait_for_slot(
        &self,
        shared: Arc<PoolShared>,
        waiter_id: u64,
        mut rx: oneshot::Receiver<PoolSlot>,
        wait: Duration,
    ) -> Result<PooledConnection> {
        match tokio::time::timeout(wait, &mut rx).await {
            Ok(Ok(slot)) => Ok(PooledConnection::new(shared, slot)),
            // Sender dropped: drain cleared the queue.
            Ok(Err(_)) => Err(BasaltError::PoolDraining),
            Err(_) => {
                let removed = {
                    let mut state = self.state.lock();
                    match state.waiting.iter().position(|w| w.id == waiter_id) {
                        Some(pos) => {
                            state.waiting.remove(pos);
                            true
                        }
                        None => false,
                    }
                };
                if removed {
                    tracing::debug!(waiter_id, "acquire timed out in wait queue");
                    return Err(BasaltError::AcquireTimeout(wait));
                }
                // The entry is already gone: a grant or drain won the race,
                // and this timeout is a no-op.
                match rx.try_recv() {
                    Ok(slot) => Ok(PooledConnection::new(shared, slot)),
                    Err(_) => Err(BasaltError::PoolDraining),
                }
            }
        }
    }

    /// Return a slot to the pool
    fn release_slot(&self, mut slot: PoolSlot) {
        let mut state = self.state.lock();
        state.active.remove(&slot.id());

        if state.draining {
            let last = state.active.is_empty();
            drop(state);
            tracing::debug!(slot_id = slot.id(), "destroying connection released during drain");
            self.destroy_slot(slot);
            if last {
                self.drained.notify_waiters();
            }
            return;
        }

        slot.touch();

        // A dead adapter is not recycled and never handed to a waiter. If
        // someone is waiting and the freed capacity allows it, build a
        // replacement in the background so the waiter is not stranded.
        if slot.connection().is_closed() {
            let refill = usize::from(!state.waiting.is_empty() && state.total() < state.max_size);
            state.creating += refill;
            drop(state);
            tracing::debug!(slot_id = slot.id(), "discarding closed connection on release");
            self.destroy_slot(slot);
            self.spawn_fill(refill);
            return;
        }

        // Serve the longest-waiting caller first; the slot skips the idle
        // state entirely in that case.
        while let Some(waiter) = state.waiting.pop_front() {
            let Waiter { id: waiter_id, tx } = waiter;
            let slot_id = slot.id();
            state.active.insert(slot_id, slot.connection().clone());
            match tx.send(slot) {
                Ok(()) => {
                    self.pool_hits.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(slot_id, waiter_id, "slot handed to waiter");
                    return;
                }
                Err(returned) => {
                    // Waiter gave up; take the slot back and try the next.
                    state.active.remove(&slot_id);
                    slot = returned;
                }
            }
        }

        // Lazily enforce a shrunken ceiling as connections come home.
        if state.total() >= state.max_size {
            drop(state);
            tracing::debug!(
                slot_id = slot.id(),
                "destroying connection over the resized ceiling"
            );
            self.destroy_slot(slot);
            return;
        }

        if let Some(handle) = self.schedule_reap(slot.id()) {
            slot.set_reaper(handle);
        }
        state.idle.push_back(slot);
    }

    /// Arm the idle-reap timer for a slot about to go idle
    fn schedule_reap(&self, slot_id: u64) -> Option<JoinHandle<()>> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let weak = self.me.clone();
        let idle_timeout = self.config.idle_timeout();
        Some(handle.spawn(async move {
            tokio::time::sleep(idle_timeout).await;
            if let Some(shared) = weak.upgrade() {
                shared.reap_idle(slot_id);
            }
        }))
    }

    /// Retire one idle slot if it is still idle and the pool is above its
    /// floor
    fn reap_idle(&self, slot_id: u64) {
        let slot = {
            let mut state = self.state.lock();
            if state.draining || state.total() <= self.config.min_size() {
                return;
            }
            let Some(pos) = state.idle.iter().position(|s| s.id() == slot_id) else {
                return;
            };
            state.idle.remove(pos)
        };
        if let Some(slot) = slot {
            tracing::debug!(
                slot_id,
                idle_for_ms = slot.last_used_at().elapsed().as_millis() as u64,
                "retiring idle connection"
            );
            self.destroy_slot(slot);
        }
    }

    /// Spawn background creations whose results go to the oldest waiters
    ///
    /// `state.creating` must already account for `count`.
    fn spawn_fill(&self, count: usize) {
        if count == 0 {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.state.lock().creating -= count;
            return;
        };
        for _ in 0..count {
            let Some(shared) = self.me.upgrade() else {
                self.state.lock().creating -= 1;
                continue;
            };
            handle.spawn(async move {
                match shared.create_connection().await {
                    Ok(conn) => shared.install_background(conn),
                    Err(e) => {
                        shared.state.lock().creating -= 1;
                        tracing::warn!(error = %e, "background connection creation failed");
                    }
                }
            });
        }
    }

    /// Hand a freshly created connection to the oldest waiter, or park it
    fn install_background(&self, conn: Arc<dyn Connection>) {
        let mut state = self.state.lock();
        state.creating -= 1;

        if state.draining {
            drop(state);
            self.close_in_background(conn);
            return;
        }

        let id = state.alloc_slot_id();
        let mut slot = PoolSlot::new(id, conn.clone());

        while let Some(waiter) = state.waiting.pop_front() {
            let Waiter { id: waiter_id, tx } = waiter;
            state.active.insert(id, conn.clone());
            match tx.send(slot) {
                Ok(()) => {
                    tracing::debug!(slot_id = id, waiter_id, "new slot handed to waiter");
                    return;
                }
                Err(returned) => {
                    state.active.remove(&id);
                    slot = returned;
                }
            }
        }

        if state.total() >= state.max_size {
            drop(state);
            self.destroy_slot(slot);
            return;
        }
        if let Some(handle) = self.schedule_reap(id) {
            slot.set_reaper(handle);
        }
        state.idle.push_back(slot);
    }

    /// Tear a slot down; the slot's reap timer dies with it
    fn destroy_slot(&self, slot: PoolSlot) {
        self.close_in_background(slot.connection().clone());
    }

    /// Close a per-slot connection without blocking the caller
    ///
    /// Close errors are logged, never propagated: teardown must not cascade.
    /// The shared handle is left alone; its owner closes it.
    fn close_in_background(&self, conn: Arc<dyn Connection>) {
        if !self.per_slot() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        handle.spawn(async move {
            if let Err(e) = conn.close().await {
                tracing::warn!(error = %e, "error closing pooled connection");
            }
        });
    }

    /// Close a per-slot connection, waiting for it
    async fn close_connection(&self, conn: Arc<dyn Connection>) {
        if !self.per_slot() {
            return;
        }
        if let Err(e) = conn.close().await {
            tracing::warn!(error = %e, "error closing pooled connection during drain");
        }
    }
}

/// A connection pool multiplexing bounded slots across unbounded callers
///
/// Cloning is cheap and clones share the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Create a new pool and eagerly pre-warm `min_size` slots
    pub async fn new(config: PoolConfig, strategy: ConnectStrategy) -> Result<Self> {
        let shared = Arc::new_cyclic(|me| PoolShared {
            state: Mutex::new(PoolState::new(config.max_size())),
            config,
            strategy,
            drained: Notify::new(),
            pool_hits: AtomicU64::new(0),
            pool_misses: AtomicU64::new(0),
            total_queries: AtomicU64::new(0),
            total_latency_micros: AtomicU64::new(0),
            me: me.clone(),
        });
        let pool = Self { shared };
        pool.warm_up().await?;
        Ok(pool)
    }

    /// Create a pool in shared-adapter mode over an existing connection
    pub async fn with_shared(config: PoolConfig, connection: Arc<dyn Connection>) -> Result<Self> {
        Self::new(config, ConnectStrategy::shared(connection)).await
    }

    /// Create a pool in per-slot mode over a connection factory
    pub async fn with_factory<F: ConnectionFactory>(
        config: PoolConfig,
        factory: F,
    ) -> Result<Self> {
        Self::new(config, ConnectStrategy::factory(factory)).await
    }

    async fn warm_up(&self) -> Result<()> {
        let min = self.shared.config.min_size();
        for _ in 0..min {
            let conn = self.shared.create_connection().await?;
            let mut state = self.shared.state.lock();
            let id = state.alloc_slot_id();
            let mut slot = PoolSlot::new(id, conn);
            if let Some(handle) = self.shared.schedule_reap(id) {
                slot.set_reaper(handle);
            }
            state.idle.push_back(slot);
        }
        if min > 0 {
            tracing::debug!(count = min, "pre-warmed pool to its floor");
        }
        Ok(())
    }

    /// Get a connection from the pool using the configured acquire timeout
    ///
    /// In strict priority order this reuses an idle slot, creates a new slot
    /// below the ceiling, or joins the FIFO wait queue. The returned guard
    /// gives the slot back when dropped.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        self.acquire_with_timeout(self.shared.config.acquire_timeout())
            .await
    }

    /// Get a connection, waiting in the queue at most `wait`
    ///
    /// Each queued request carries its own timeout; timing out removes
    /// exactly that entry without disturbing other waiters.
    pub async fn acquire_with_timeout(&self, wait: Duration) -> Result<PooledConnection> {
        loop {
            match self.shared.plan_acquire()? {
                AcquirePlan::Reuse(slot) => {
                    if self.shared.validate(slot.connection()).await {
                        self.shared.pool_hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(PooledConnection::new(self.shared.clone(), slot));
                    }
                    tracing::debug!(
                        slot_id = slot.id(),
                        "idle connection failed validation, discarding"
                    );
                    {
                        let mut state = self.shared.state.lock();
                        state.active.remove(&slot.id());
                    }
                    self.shared.destroy_slot(slot);
                }
                AcquirePlan::Create => {
                    return self.shared.create_for_caller(self.shared.clone()).await;
                }
                AcquirePlan::Wait(waiter_id, rx) => {
                    return self
                        .shared
                        .wait_for_slot(self.shared.clone(), waiter_id, rx, wait)
                        .await;
                }
            }
        }
    }

    /// Run a query on a pooled connection
    ///
    /// The slot is released whether the query succeeds or fails.
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let mut conn = self.acquire().await?;
        let start = Instant::now();
        let result = conn.query(sql, params).await;
        self.record_query(&mut conn, start.elapsed());
        result
    }

    /// Run a statement on a pooled connection
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        let mut conn = self.acquire().await?;
        let start = Instant::now();
        let result = conn.execute(sql, params).await;
        self.record_query(&mut conn, start.elapsed());
        result
    }

    /// Run a closure inside a transaction on a pooled connection
    ///
    /// Commits on `Ok`, rolls back on `Err`, and releases the slot either
    /// way. The closure receives a transaction scoped to the acquired
    /// slot's adapter.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t dyn Transaction) -> BoxFuture<'t, Result<T>> + Send,
    {
        let mut conn = self.acquire().await?;
        let start = Instant::now();
        let result = run_transaction(&conn, f).await;
        self.record_query(&mut conn, start.elapsed());
        result
    }

    /// Acquire a slot, ping it with a minimal query, and release it
    pub async fn ping(&self) -> Result<Duration> {
        let conn = self.acquire().await?;
        ping_connection(&*conn)
            .await
            .map_err(|e| BasaltError::Connection(e.to_string()))
    }

    /// Change the slot ceiling at runtime
    ///
    /// Shrinking retires idle slots immediately; active slots over the new
    /// ceiling are reclaimed lazily as they are released. Growing creates
    /// connections for queued waiters, oldest first.
    pub fn resize(&self, new_max: usize) -> Result<()> {
        if new_max == 0 {
            return Err(BasaltError::InvalidPoolSize(new_max));
        }

        let mut to_destroy = Vec::new();
        let fill = {
            let mut state = self.shared.state.lock();
            let old_max = state.max_size;
            state.max_size = new_max;

            if new_max < old_max {
                while state.total() > new_max {
                    match state.idle.pop_front() {
                        Some(slot) => to_destroy.push(slot),
                        // Active slots are never force-closed here.
                        None => break,
                    }
                }
                0
            } else if new_max > old_max && !state.waiting.is_empty() {
                let fill = new_max
                    .saturating_sub(state.total())
                    .min(state.waiting.len());
                state.creating += fill;
                fill
            } else {
                0
            }
        };

        if !to_destroy.is_empty() {
            tracing::info!(
                retired = to_destroy.len(),
                new_max,
                "pool ceiling shrunk, retiring idle connections"
            );
            for slot in to_destroy {
                self.shared.destroy_slot(slot);
            }
        }
        if fill > 0 {
            tracing::info!(
                creating = fill,
                new_max,
                "pool ceiling grown, creating connections for waiters"
            );
            self.shared.spawn_fill(fill);
        }
        Ok(())
    }

    /// Shut the pool down
    ///
    /// Rejects all queued and future acquires, closes idle connections,
    /// then waits (bounded by the drain timeout) for active slots to come
    /// home; stragglers are force-closed rather than hanging forever.
    /// Afterward the pool reports zero connections.
    pub async fn drain(&self) {
        let idle_slots = {
            let mut state = self.shared.state.lock();
            if !state.draining {
                tracing::info!("draining connection pool");
                state.draining = true;
            }
            // Dropping the queued senders rejects every waiting acquire.
            state.waiting.clear();
            state.idle.drain(..).collect::<Vec<_>>()
        };
        for slot in idle_slots {
            let conn = slot.connection().clone();
            drop(slot);
            self.shared.close_connection(conn).await;
        }

        let deadline = tokio::time::Instant::now() + self.shared.config.drain_timeout();
        loop {
            let notified = self.shared.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.state.lock().active.is_empty() {
                break;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let leftovers = {
                    let mut state = self.shared.state.lock();
                    state.active.drain().map(|(_, conn)| conn).collect::<Vec<_>>()
                };
                tracing::warn!(
                    active = leftovers.len(),
                    "drain timeout elapsed, force-closing connections still in use"
                );
                for conn in leftovers {
                    self.shared.close_connection(conn).await;
                }
                break;
            }
        }

        let mut state = self.shared.state.lock();
        state.idle.clear();
        state.active.clear();
        state.creating = 0;
        drop(state);
        tracing::info!("connection pool drained");
    }

    /// Get a point-in-time statistics snapshot
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        let total_queries = self.shared.total_queries.load(Ordering::Relaxed);
        let total_latency_micros = self.shared.total_latency_micros.load(Ordering::Relaxed);
        let avg_latency_ms = if total_queries == 0 {
            0.0
        } else {
            (total_latency_micros as f64 / 1_000.0) / total_queries as f64
        };
        PoolStats {
            total: state.total(),
            idle: state.idle.len(),
            active: state.active.len(),
            waiting: state.waiting.len(),
            max_size: state.max_size,
            total_queries,
            avg_latency_ms,
            pool_hits: self.shared.pool_hits.load(Ordering::Relaxed),
            pool_misses: self.shared.pool_misses.load(Ordering::Relaxed),
        }
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    fn record_query(&self, conn: &mut PooledConnection, elapsed: Duration) {
        conn.mark_query();
        self.shared.total_queries.fetch_add(1, Ordering::Relaxed);
        self.shared
            .total_latency_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ConnectionPool")
            .field("idle", &state.idle.len())
            .field("active", &state.active.len())
            .field("waiting", &state.waiting.len())
            .field("max_size", &state.max_size)
            .field("draining", &state.draining)
            .finish()
    }
}

async fn run_transaction<T, F>(conn: &PooledConnection, f: F) -> Result<T>
where
    F: for<'t> FnOnce(&'t dyn Transaction) -> BoxFuture<'t, Result<T>> + Send,
{
    let tx = conn.begin_transaction().await?;
    match f(tx.as_ref()).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback failed after transaction error");
            }
            Err(e)
        }
    }
}

/// A connection borrowed from the pool
///
/// Dropping the guard returns the slot; `release` does the same with a name
/// at the call site. Because the guard is move-only, releasing the same
/// acquisition twice cannot be expressed.
pub struct PooledConnection {
    slot: Option<PoolSlot>,
    shared: Arc<PoolShared>,
}

impl PooledConnection {
    fn new(shared: Arc<PoolShared>, slot: PoolSlot) -> Self {
        Self {
            slot: Some(slot),
            shared,
        }
    }

    /// Get the underlying connection as an Arc
    pub fn inner(&self) -> &Arc<dyn Connection> {
        self.slot.as_ref().expect("slot taken").connection()
    }

    /// Identity of the slot backing this acquisition
    pub fn slot_id(&self) -> u64 {
        self.slot.as_ref().expect("slot taken").id()
    }

    /// When the backing slot was created
    pub fn created_at(&self) -> Instant {
        self.slot.as_ref().expect("slot taken").created_at()
    }

    /// Queries served by the backing slot so far
    pub fn query_count(&self) -> u64 {
        self.slot.as_ref().expect("slot taken").query_count()
    }

    /// Give the connection back to the pool
    pub fn release(self) {}

    pub(super) fn mark_query(&mut self) {
        if let Some(slot) = self.slot.as_mut() {
            slot.record_query();
        }
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.slot.as_ref().expect("slot taken").connection().as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.shared.release_slot(slot);
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("slot", &self.slot)
            .finish()
    }
}
