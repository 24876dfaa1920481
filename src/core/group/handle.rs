// src/core/group/handle.rs

use super::partition::Partition;
use crate::core::client::PartitionClient;
use crate::core::discovery::Address;
use crate::core::errors::ClientError;
use crate::core::partition::PartitionKey;
use crate::core::protocol::{Request, Response};
use std::fmt;
use std::sync::Arc;

/// The result of looking a key up in the group.
///
/// `Closed` and `Unknown` are sentinels: every operation on them fails with the
/// matching error, carrying the key that was looked up.
pub enum ClientHandle<C: PartitionClient, A> {
    Live(Arc<Partition<C, A>>),
    Closed(PartitionKey),
    Unknown(PartitionKey),
}

impl<C: PartitionClient, A> Clone for ClientHandle<C, A> {
    fn clone(&self) -> Self {
        match self {
            ClientHandle::Live(p) => ClientHandle::Live(Arc::clone(p)),
            ClientHandle::Closed(key) => ClientHandle::Closed(key.clone()),
            ClientHandle::Unknown(key) => ClientHandle::Unknown(key.clone()),
        }
    }
}

impl<C: PartitionClient, A: Address> ClientHandle<C, A> {
    /// The live partition's full key, or the key the sentinel was looked up with.
    pub fn key(&self) -> &PartitionKey {
        match self {
            ClientHandle::Live(p) => p.key(),
            ClientHandle::Closed(key) | ClientHandle::Unknown(key) => key,
        }
    }

    /// True for a live handle whose partition has not been closed yet.
    pub fn is_live(&self) -> bool {
        matches!(self, ClientHandle::Live(p) if !p.is_closed())
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ClientHandle::Closed(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ClientHandle::Unknown(_))
    }

    /// The identity of the live partition, if any.
    pub fn id(&self) -> Option<u64> {
        match self {
            ClientHandle::Live(p) => Some(p.id()),
            _ => None,
        }
    }

    pub fn partition(&self) -> Option<&Arc<Partition<C, A>>> {
        match self {
            ClientHandle::Live(p) => Some(p),
            _ => None,
        }
    }

    /// The error every operation on a sentinel fails with.
    pub fn sentinel_error(&self) -> Option<ClientError> {
        self.live().err()
    }

    pub async fn request(&self, request: Request) -> Result<Response, ClientError> {
        self.live()?.request(request).await
    }

    pub async fn reserve_connection(&self, request: &Request) -> Result<C::Connection, ClientError> {
        self.live()?.reserve_connection(request).await
    }

    /// Closes a live partition. Closing a sentinel is a no-op.
    pub async fn close(&self) -> Result<(), ClientError> {
        match self {
            ClientHandle::Live(p) => p.close().await,
            _ => Ok(()),
        }
    }

    fn live(&self) -> Result<&Arc<Partition<C, A>>, ClientError> {
        match self {
            ClientHandle::Live(p) => Ok(p),
            ClientHandle::Closed(key) => Err(ClientError::ClosedPartition { key: key.clone() }),
            ClientHandle::Unknown(key) => Err(ClientError::UnknownPartition { key: key.clone() }),
        }
    }
}

impl<C: PartitionClient, A> fmt::Debug for ClientHandle<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientHandle::Live(p) => f.debug_tuple("Live").field(p).finish(),
            ClientHandle::Closed(key) => f.debug_tuple("Closed").field(key).finish(),
            ClientHandle::Unknown(key) => f.debug_tuple("Unknown").field(key).finish(),
        }
    }
}
