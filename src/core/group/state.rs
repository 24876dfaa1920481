// src/core/group/state.rs

//! Shared state between the group, its discovery consumer and teardown tasks.

use super::partition::Partition;
use super::table::PartitionTable;
use crate::core::client::PartitionClient;
use crate::core::discovery::Address;
use crate::core::errors::ClientError;
use crate::core::partition::{PartitionIndex, PartitionKey};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinSet;
use tracing::{error, warn};

pub(crate) type CloseOutcome = (PartitionKey, Result<(), ClientError>);

pub(crate) struct GroupState<C: PartitionClient, A, I> {
    pub(crate) table: ArcSwap<PartitionTable<C, A, I>>,
    /// Closes started by the consumer that nobody has awaited yet.
    teardown: Mutex<JoinSet<CloseOutcome>>,
    /// Failures of teardowns reaped before the aggregate close collected them.
    teardown_failures: Mutex<Vec<(PartitionKey, ClientError)>>,
    next_id: AtomicU64,
}

impl<C: PartitionClient, A: Address, I: PartitionIndex> GroupState<C, A, I> {
    pub(crate) fn new(index: I) -> Self {
        Self {
            table: ArcSwap::from_pointee(PartitionTable::new(index)),
            teardown: Mutex::new(JoinSet::new()),
            teardown_failures: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Closes `partition` in the background without waiting for it.
    pub(crate) fn spawn_teardown(&self, partition: Arc<Partition<C, A>>) {
        let mut tasks = self.teardown.lock();
        while let Some(done) = tasks.try_join_next() {
            self.record_reaped(done);
        }
        tasks.spawn(close_partition(partition));
    }

    /// Hands every pending teardown to the caller.
    pub(crate) fn take_teardowns(&self) -> JoinSet<CloseOutcome> {
        std::mem::take(&mut *self.teardown.lock())
    }

    pub(crate) fn take_teardown_failures(&self) -> Vec<(PartitionKey, ClientError)> {
        std::mem::take(&mut *self.teardown_failures.lock())
    }

    fn record_reaped(&self, done: Result<CloseOutcome, tokio::task::JoinError>) {
        match done {
            Ok((_, Ok(()))) => {}
            Ok((key, Err(e))) => self.teardown_failures.lock().push((key, e)),
            Err(e) => error!("Partition teardown task failed: {}", e),
        }
    }
}

impl<C: PartitionClient, A, I> Drop for GroupState<C, A, I> {
    fn drop(&mut self) {
        // Teardowns outlive the group; dropping the set would abort them.
        self.teardown.get_mut().detach_all();
    }
}

/// Closes one partition and reports the outcome under its key.
pub(crate) async fn close_partition<C: PartitionClient, A: Address>(
    partition: Arc<Partition<C, A>>,
) -> CloseOutcome {
    let result = partition.close().await;
    if let Err(e) = &result {
        warn!(
            "Failed to close partition {} (#{}): {}",
            partition.key(),
            partition.id(),
            e
        );
    }
    (partition.key().clone(), result)
}
