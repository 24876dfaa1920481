// src/core/partition/key.rs

//! Defines `PartitionKey`, the immutable attribute set that identifies a partition.

use super::index::MAX_POWER_SET_ATTRIBUTES;
use crate::core::errors::ClientError;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A single named attribute of a partition key.
pub type Attribute = (Arc<str>, Bytes);

/// An immutable, order-irrelevant set of named attributes identifying one partition.
///
/// Attributes are stored sorted by name, so two keys built from the same pairs in a
/// different order are equal and hash identically. Cloning is cheap: the attribute
/// storage is shared.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    attrs: Arc<[Attribute]>,
}

impl PartitionKey {
    /// Starts building a new key.
    pub fn builder() -> PartitionKeyBuilder {
        PartitionKeyBuilder::default()
    }

    /// Returns the empty key. It never matches any partition.
    pub fn empty() -> Self {
        Self {
            attrs: Arc::from(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Returns the value of the attribute with the given name.
    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.attrs
            .binary_search_by(|(n, _)| n.as_ref().cmp(name))
            .ok()
            .map(|i| &self.attrs[i].1)
    }

    /// Iterates over the attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.attrs.iter().map(|(n, v)| (n.as_ref(), v))
    }

    /// Returns `true` if every attribute of `self` is present with the same value in `other`.
    pub fn is_subset_of(&self, other: &PartitionKey) -> bool {
        self.iter().all(|(name, value)| other.get(name) == Some(value))
    }

    /// Returns every non-empty subset of this key, including the key itself.
    ///
    /// The number of subsets is `2^len - 1`, so keys wider than
    /// [`MAX_POWER_SET_ATTRIBUTES`] are rejected with `InvalidRequest`.
    pub fn subsets(&self) -> Result<Vec<PartitionKey>, ClientError> {
        let n = self.attrs.len();
        if n > MAX_POWER_SET_ATTRIBUTES {
            return Err(ClientError::InvalidRequest(format!(
                "partition key {} has {} attributes, at most {} can be expanded into subsets",
                self, n, MAX_POWER_SET_ATTRIBUTES
            )));
        }
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut subsets = Vec::with_capacity((1usize << n) - 1);
        for mask in 1..(1u64 << n) {
            let attrs: Vec<Attribute> = self
                .attrs
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, attr)| attr.clone())
                .collect();
            // Filtering a sorted slice keeps it sorted.
            subsets.push(PartitionKey {
                attrs: Arc::from(attrs),
            });
        }
        Ok(subsets)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", name, String::from_utf8_lossy(value))?;
        }
        f.write_str("}")
    }
}

impl fmt::Debug for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartitionKey{self}")
    }
}

/// Accumulates attributes for a `PartitionKey`. Setting a name twice keeps the last value.
#[derive(Debug, Clone, Default)]
pub struct PartitionKeyBuilder {
    attrs: BTreeMap<Arc<str>, Bytes>,
}

impl PartitionKeyBuilder {
    pub fn attr(mut self, name: impl AsRef<str>, value: impl Into<Bytes>) -> Self {
        self.insert(name, value);
        self
    }

    /// Non-consuming variant of [`attr`](Self::attr) for use in loops.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<Bytes>) -> &mut Self {
        self.attrs.insert(Arc::from(name.as_ref()), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn build(self) -> PartitionKey {
        let attrs: Vec<Attribute> = self.attrs.into_iter().collect();
        PartitionKey {
            attrs: Arc::from(attrs),
        }
    }
}

impl<N, V> FromIterator<(N, V)> for PartitionKey
where
    N: AsRef<str>,
    V: Into<Bytes>,
{
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut builder = PartitionKeyBuilder::default();
        for (name, value) in iter {
            builder.insert(name, value);
        }
        builder.build()
    }
}
