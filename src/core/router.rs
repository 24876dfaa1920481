// src/core/router.rs

//! The partition-routing front door.

use crate::core::client::PartitionClient;
use crate::core::discovery::Address;
use crate::core::errors::ClientError;
use crate::core::group::{CloseReport, PartitionedClientGroup};
use crate::core::partition::{PartitionIndex, PartitionKeyResolver, PowerSetIndex};
use crate::core::protocol::{Request, Response};
use tracing::trace;

/// Resolves each request to a partition and forwards it to that partition's client.
///
/// Resolution failures and sentinel failures reach the caller the same way, as
/// the `Err` of the returned future.
pub struct PartitionedClient<C: PartitionClient, A: Address, R, I: PartitionIndex = PowerSetIndex> {
    group: PartitionedClientGroup<C, A, I>,
    resolver: R,
}

impl<C, A, R, I> PartitionedClient<C, A, R, I>
where
    C: PartitionClient,
    A: Address,
    R: PartitionKeyResolver,
    I: PartitionIndex,
{
    pub fn new(group: PartitionedClientGroup<C, A, I>, resolver: R) -> Self {
        Self { group, resolver }
    }

    pub async fn request(&self, request: Request) -> Result<Response, ClientError> {
        let key = self.resolver.resolve(&request.meta)?;
        trace!("Routing {} {} to partition {}.", request.meta.method, request.meta.path, key);
        self.group.get(&key).request(request).await
    }

    pub async fn reserve_connection(&self, request: &Request) -> Result<C::Connection, ClientError> {
        let key = self.resolver.resolve(&request.meta)?;
        self.group.get(&key).reserve_connection(request).await
    }

    pub async fn close(&self) -> CloseReport {
        self.group.close().await
    }

    pub async fn on_close(&self) {
        self.group.on_close().await
    }

    pub fn group(&self) -> &PartitionedClientGroup<C, A, I> {
        &self.group
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }
}
