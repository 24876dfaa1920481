// src/core/errors.rs

//! Defines the error type shared by routing, partition lifecycle and pipelining.

use crate::core::partition::PartitionKey;
use crate::core::protocol::ProtocolVersion;
use std::sync::Arc;
use thiserror::Error;

/// Every failure a caller of this crate can observe.
/// All variants surface as the `Err` of the caller's own future; nothing is swallowed.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The key was never announced by the discovery feed.
    #[error("Partition unknown: {key}")]
    UnknownPartition { key: PartitionKey },

    /// The partition existed but has been torn down.
    #[error("Partition closed: {key}")]
    ClosedPartition { key: PartitionKey },

    /// Pipelining was requested for a protocol that cannot guarantee ordering.
    #[error("Pipelining unsupported in protocol version: {0}")]
    ProtocolMismatch(ProtocolVersion),

    /// The pipelined connection already has the maximum number of outstanding requests.
    #[error("Pipeline capacity exceeded: {max} requests already outstanding")]
    CapacityExceeded { max: usize },

    /// A transport-level fault. The connection that produced it must be discarded.
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    /// The per-partition client factory failed.
    #[error("Failed to construct client for partition {key}: {reason}")]
    ConstructionFailure { key: PartitionKey, reason: String },

    /// The request metadata could not be turned into a partition key.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Internal Error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Whether retrying the same operation later can succeed without outside intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::CapacityExceeded { .. } | ClientError::ConstructionFailure { .. }
        )
    }

    /// The partition key this error refers to, if any.
    pub fn partition_key(&self) -> Option<&PartitionKey> {
        match self {
            ClientError::UnknownPartition { key }
            | ClientError::ClosedPartition { key }
            | ClientError::ConstructionFailure { key, .. } => Some(key),
            _ => None,
        }
    }
}

// `std::io::Error` is not cloneable, so it is shared through an `Arc`.
impl Clone for ClientError {
    fn clone(&self) -> Self {
        match self {
            ClientError::UnknownPartition { key } => {
                ClientError::UnknownPartition { key: key.clone() }
            }
            ClientError::ClosedPartition { key } => ClientError::ClosedPartition { key: key.clone() },
            ClientError::ProtocolMismatch(v) => ClientError::ProtocolMismatch(*v),
            ClientError::CapacityExceeded { max } => ClientError::CapacityExceeded { max: *max },
            ClientError::ConnectionFailure(s) => ClientError::ConnectionFailure(s.clone()),
            ClientError::ConstructionFailure { key, reason } => ClientError::ConstructionFailure {
                key: key.clone(),
                reason: reason.clone(),
            },
            ClientError::InvalidRequest(s) => ClientError::InvalidRequest(s.clone()),
            ClientError::Io(e) => ClientError::Io(Arc::clone(e)),
            ClientError::Internal(s) => ClientError::Internal(s.clone()),
        }
    }
}

impl PartialEq for ClientError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                ClientError::UnknownPartition { key: k1 },
                ClientError::UnknownPartition { key: k2 },
            ) => k1 == k2,
            (ClientError::ClosedPartition { key: k1 }, ClientError::ClosedPartition { key: k2 }) => {
                k1 == k2
            }
            (ClientError::ProtocolMismatch(v1), ClientError::ProtocolMismatch(v2)) => v1 == v2,
            (
                ClientError::CapacityExceeded { max: m1 },
                ClientError::CapacityExceeded { max: m2 },
            ) => m1 == m2,
            (ClientError::ConnectionFailure(s1), ClientError::ConnectionFailure(s2)) => s1 == s2,
            (
                ClientError::ConstructionFailure {
                    key: k1,
                    reason: r1,
                },
                ClientError::ConstructionFailure {
                    key: k2,
                    reason: r2,
                },
            ) => k1 == k2 && r1 == r2,
            (ClientError::InvalidRequest(s1), ClientError::InvalidRequest(s2)) => s1 == s2,
            (ClientError::Io(e1), ClientError::Io(e2)) => e1.to_string() == e2.to_string(),
            (ClientError::Internal(s1), ClientError::Internal(s2)) => s1 == s2,
            _ => false,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Io(Arc::new(e))
    }
}
