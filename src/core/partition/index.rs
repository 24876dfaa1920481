// src/core/partition/index.rs

//! Partition lookup strategies.
//!
//! An index never owns clients. It only maps a lookup key to the full keys of the
//! partitions that can serve it; the group resolves those full keys against its own
//! table, which is what keeps each full key bound to at most one live handle.

use super::key::PartitionKey;
use indexmap::IndexSet;
use std::collections::HashMap;
use tracing::warn;

/// The largest key the power-set index expands. Larger keys are indexed exactly.
pub const MAX_POWER_SET_ATTRIBUTES: usize = 8;

/// A pluggable strategy for resolving lookup keys to partition keys.
///
/// Implementations are cloned when the group publishes a new table snapshot, so
/// they should be cheap to clone or rarely mutated.
pub trait PartitionIndex: Clone + Send + Sync + 'static {
    /// Registers a full partition key. Registering the same key twice is a no-op.
    fn register(&mut self, key: &PartitionKey);

    /// Returns the full keys that may serve `lookup`, in order of preference.
    fn candidates<'a>(&'a self, lookup: &PartitionKey) -> Vec<&'a PartitionKey>;

    /// Every full key registered so far, in registration order.
    fn registered_keys(&self) -> Vec<&PartitionKey>;

    /// Returns `true` if `key` has been registered as a full key.
    fn contains(&self, key: &PartitionKey) -> bool {
        self.registered_keys().contains(&key)
    }
}

/// Indexes each partition only under its complete attribute set.
#[derive(Debug, Clone, Default)]
pub struct ExactIndex {
    keys: IndexSet<PartitionKey>,
}

impl PartitionIndex for ExactIndex {
    fn register(&mut self, key: &PartitionKey) {
        self.keys.insert(key.clone());
    }

    fn candidates<'a>(&'a self, lookup: &PartitionKey) -> Vec<&'a PartitionKey> {
        self.keys.get(lookup).into_iter().collect()
    }

    fn registered_keys(&self) -> Vec<&PartitionKey> {
        self.keys.iter().collect()
    }

    fn contains(&self, key: &PartitionKey) -> bool {
        self.keys.contains(key)
    }
}

/// Indexes each partition under its full attribute set and every non-empty subset
/// of it, so a request may address a partition with a coarser key.
///
/// For `{dc=east, shard=1}` the lookups `{dc=east}`, `{shard=1}` and
/// `{dc=east, shard=1}` all resolve to that partition. When several partitions
/// share a subset, an exact match comes first, then partitions in the order they
/// were registered.
#[derive(Debug, Clone, Default)]
pub struct PowerSetIndex {
    subsets: HashMap<PartitionKey, IndexSet<PartitionKey>>,
    keys: IndexSet<PartitionKey>,
}

impl PartitionIndex for PowerSetIndex {
    fn register(&mut self, key: &PartitionKey) {
        if !self.keys.insert(key.clone()) {
            return;
        }
        match key.subsets() {
            Ok(subsets) => {
                for subset in subsets {
                    self.subsets.entry(subset).or_default().insert(key.clone());
                }
            }
            Err(e) => {
                warn!("{}; indexing it exactly.", e);
                self.subsets
                    .entry(key.clone())
                    .or_default()
                    .insert(key.clone());
            }
        }
    }

    fn contains(&self, key: &PartitionKey) -> bool {
        self.keys.contains(key)
    }

    fn candidates<'a>(&'a self, lookup: &PartitionKey) -> Vec<&'a PartitionKey> {
        let Some(matches) = self.subsets.get(lookup) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(matches.len());
        if let Some(exact) = matches.get(lookup) {
            out.push(exact);
        }
        out.extend(matches.iter().filter(|k| *k != lookup));
        out
    }

    fn registered_keys(&self) -> Vec<&PartitionKey> {
        self.keys.iter().collect()
    }
}
