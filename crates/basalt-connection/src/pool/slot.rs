//! Pool slot lifecycle

use std::sync::Arc;
use std::time::Instant;

use basalt_core::Connection;
use tokio::task::JoinHandle;

/// One pool-managed unit of connection capacity
///
/// Wraps an adapter (shared or dedicated, depending on the pool strategy)
/// together with its bookkeeping. A slot is owned either by the pool's idle
/// list or, while checked out, by the `PooledConnection` guard; it is never
/// in both places at once.
pub(super) struct PoolSlot {
    id: u64,
    connection: Arc<dyn Connection>,
    created_at: Instant,
    last_used_at: Instant,
    query_count: u64,
    /// Pending idle-reap timer. Owned by the slot so the cancel happens as
    /// part of whichever state transition invalidates it.
    reaper: Option<JoinHandle<()>>,
}

impl PoolSlot {
    pub(super) fn new(id: u64, connection: Arc<dyn Connection>) -> Self {
        let now = Instant::now();
        Self {
            id,
            connection,
            created_at: now,
            last_used_at: now,
            query_count: 0,
            reaper: None,
        }
    }

    pub(super) fn id(&self) -> u64 {
        self.id
    }

    pub(super) fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub(super) fn created_at(&self) -> Instant {
        self.created_at
    }

    pub(super) fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    pub(super) fn query_count(&self) -> u64 {
        self.query_count
    }

    /// Stamp the slot as just used
    pub(super) fn touch(&mut self) {
        self.last_used_at = Instant::now();
    }

    pub(super) fn record_query(&mut self) {
        self.query_count += 1;
        self.touch();
    }

    /// Arm the idle-reap timer for this slot
    pub(super) fn set_reaper(&mut self, handle: JoinHandle<()>) {
        self.cancel_reaper();
        self.reaper = Some(handle);
    }

    /// Cancel a pending idle-reap timer, if any
    pub(super) fn cancel_reaper(&mut self) {
        if let Some(handle) = self.reaper.take() {
            handle.abort();
        }
    }
}

impl Drop for PoolSlot {
    fn drop(&mut self) {
        self.cancel_reaper();
    }
}

impl std::fmt::Debug for PoolSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolSlot")
            .field("id", &self.id)
            .field("driver", &self.connection.driver_name())
            .field("query_count", &self.query_count)
            .finish()
    }
}
