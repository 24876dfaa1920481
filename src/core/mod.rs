// src/core/mod.rs

//! The central module containing partition routing, client lifecycle and pipelining.

pub mod client;
pub mod discovery;
pub mod errors;
pub mod group;
pub mod partition;
pub mod pipeline;
pub mod protocol;
pub mod router;

pub use client::{PartitionClient, PartitionClientFactory};
pub use discovery::{
    Address, AddressEvent, AddressFeed, DiscoveryEvent, DiscoverySender, EventKind,
    discovery_channel,
};
pub use errors::ClientError;
pub use group::{ClientHandle, CloseReport, GroupSnapshot, PartitionedClientGroup};
pub use partition::{PartitionKey, PartitionKeyResolver};
pub use pipeline::{PipelinedConnection, ResponseFuture};
pub use protocol::{ProtocolVersion, Request, Response};
pub use router::PartitionedClient;
