// src/core/client.rs

//! The capability traits shared by per-partition clients and their factory.

use crate::core::discovery::AddressFeed;
use crate::core::errors::ClientError;
use crate::core::partition::PartitionKey;
use crate::core::protocol::{Request, Response};
use async_trait::async_trait;
use std::future::Future;

/// A client serving a single partition.
///
/// Live partitions, and through [`ClientHandle`](crate::core::group::ClientHandle)
/// the closed and unknown sentinels, all expose this same surface.
#[async_trait]
pub trait PartitionClient: Send + Sync + 'static {
    /// The connection handed out by [`reserve_connection`](Self::reserve_connection).
    type Connection: Send + 'static;

    async fn request(&self, request: Request) -> Result<Response, ClientError>;

    /// Reserves a connection suitable for `request` for exclusive use by the caller.
    async fn reserve_connection(&self, request: &Request)
    -> Result<Self::Connection, ClientError>;

    /// Releases every resource held by the client. Called at most once per client.
    async fn close(&self) -> Result<(), ClientError>;
}

/// Builds the client for a partition the first time it is needed.
///
/// `addresses` replays the partition's known addresses and then follows later
/// changes; the client owns address selection from then on. The factory is invoked
/// at most once per live partition while that partition has no client.
#[async_trait]
pub trait PartitionClientFactory<A>: Send + Sync + 'static {
    type Client: PartitionClient;

    async fn create(
        &self,
        key: PartitionKey,
        addresses: AddressFeed<A>,
    ) -> Result<Self::Client, ClientError>;
}

#[async_trait]
impl<A, C, F, Fut> PartitionClientFactory<A> for F
where
    A: Send + 'static,
    C: PartitionClient,
    F: Fn(PartitionKey, AddressFeed<A>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C, ClientError>> + Send + 'static,
{
    type Client = C;

    async fn create(&self, key: PartitionKey, addresses: AddressFeed<A>) -> Result<C, ClientError> {
        (self)(key, addresses).await
    }
}
