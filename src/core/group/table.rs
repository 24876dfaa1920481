// src/core/group/table.rs

//! The immutable partition table readers resolve keys against.

use super::handle::ClientHandle;
use super::partition::Partition;
use crate::core::client::PartitionClient;
use crate::core::discovery::Address;
use crate::core::partition::{PartitionIndex, PartitionKey};
use std::collections::HashMap;
use std::sync::Arc;

/// What a full partition key is currently bound to.
pub(crate) enum Slot<C: PartitionClient, A> {
    Live(Arc<Partition<C, A>>),
    /// The key was live once and has been torn down.
    Closed,
}

impl<C: PartitionClient, A> Clone for Slot<C, A> {
    fn clone(&self) -> Self {
        match self {
            Slot::Live(p) => Slot::Live(Arc::clone(p)),
            Slot::Closed => Slot::Closed,
        }
    }
}

/// One published version of the group state.
///
/// Only the discovery consumer and the aggregate close build new tables. They
/// clone the current one, mutate the copy through `Arc::make_mut` and publish it
/// in a single store.
pub(crate) struct PartitionTable<C: PartitionClient, A, I> {
    pub(crate) entries: Arc<HashMap<PartitionKey, Slot<C, A>>>,
    pub(crate) index: Arc<I>,
    /// Discovery events applied to produce this table.
    pub(crate) applied: u64,
    pub(crate) closed: bool,
}

impl<C: PartitionClient, A, I> Clone for PartitionTable<C, A, I> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            index: Arc::clone(&self.index),
            applied: self.applied,
            closed: self.closed,
        }
    }
}

impl<C: PartitionClient, A: Address, I: PartitionIndex> PartitionTable<C, A, I> {
    pub(crate) fn new(index: I) -> Self {
        Self {
            entries: Arc::new(HashMap::new()),
            index: Arc::new(index),
            applied: 0,
            closed: false,
        }
    }

    pub(crate) fn lookup(&self, key: &PartitionKey) -> ClientHandle<C, A> {
        let mut tombstoned = false;
        for candidate in self.index.candidates(key) {
            match self.entries.get(candidate) {
                Some(Slot::Live(p)) => return ClientHandle::Live(Arc::clone(p)),
                Some(Slot::Closed) => tombstoned = true,
                None => {}
            }
        }
        if tombstoned {
            ClientHandle::Closed(key.clone())
        } else {
            ClientHandle::Unknown(key.clone())
        }
    }
}

/// A consistent, point-in-time view of the group.
///
/// Every answer a snapshot gives reflects the same prefix of the discovery feed.
pub struct GroupSnapshot<C: PartitionClient, A, I> {
    table: Arc<PartitionTable<C, A, I>>,
}

impl<C: PartitionClient, A, I> Clone for GroupSnapshot<C, A, I> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<C: PartitionClient, A: Address, I: PartitionIndex> GroupSnapshot<C, A, I> {
    pub(crate) fn new(table: Arc<PartitionTable<C, A, I>>) -> Self {
        Self { table }
    }

    pub fn get(&self, key: &PartitionKey) -> ClientHandle<C, A> {
        self.table.lookup(key)
    }

    /// How many discovery events had been applied when this snapshot was taken.
    pub fn applied_events(&self) -> u64 {
        self.table.applied
    }

    pub fn live_partitions(&self) -> usize {
        self.table
            .entries
            .values()
            .filter(|slot| matches!(slot, Slot::Live(_)))
            .count()
    }

    /// Every key the group has seen, live or closed, in registration order.
    pub fn partition_keys(&self) -> Vec<PartitionKey> {
        self.table
            .index
            .registered_keys()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Whether the snapshot was taken after the group closed.
    pub fn is_closed(&self) -> bool {
        self.table.closed
    }
}
