// src/core/partition/mod.rs

//! Partition identity, lookup strategies and request-to-partition resolution.

pub mod index;
pub mod key;
pub mod resolver;

pub use index::{ExactIndex, PartitionIndex, PowerSetIndex};
pub use key::{PartitionKey, PartitionKeyBuilder};
pub use resolver::{AttributeResolver, PartitionKeyResolver};
