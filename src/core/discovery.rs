// src/core/discovery.rs

//! Discovery events and the feeds that carry them.
//!
//! A group consumes one ordered stream of [`DiscoveryEvent`]s. Each live partition
//! hands its client an [`AddressFeed`] that replays the partition's current
//! addresses and then follows every later change for that key.

use crate::core::errors::ClientError;
use crate::core::partition::PartitionKey;
use futures::Stream;
use std::fmt;
use std::hash::Hash;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Bounds required of a backend address type.
pub trait Address: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> Address for T where T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

/// Whether an address joined or left a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Available,
    Unavailable,
}

/// A membership change for one backend address of one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryEvent<A> {
    pub key: PartitionKey,
    pub address: A,
    pub kind: EventKind,
}

impl<A> DiscoveryEvent<A> {
    pub fn available(key: PartitionKey, address: A) -> Self {
        Self {
            key,
            address,
            kind: EventKind::Available,
        }
    }

    pub fn unavailable(key: PartitionKey, address: A) -> Self {
        Self {
            key,
            address,
            kind: EventKind::Unavailable,
        }
    }

    pub fn is_available(&self) -> bool {
        self.kind == EventKind::Available
    }
}

/// An address change delivered to a single partition's client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressEvent<A> {
    pub address: A,
    pub kind: EventKind,
}

/// The per-partition address feed handed to a client factory.
///
/// It starts with one `Available` event per address known when the client was
/// built and ends when the partition is closed.
#[derive(Debug)]
pub struct AddressFeed<A> {
    rx: mpsc::UnboundedReceiver<AddressEvent<A>>,
}

impl<A> AddressFeed<A> {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<AddressEvent<A>>) -> Self {
        Self { rx }
    }

    /// Receives the next address change, or `None` once the partition is closed.
    pub async fn recv(&mut self) -> Option<AddressEvent<A>> {
        self.rx.recv().await
    }

    /// Returns a change that is already queued without waiting.
    pub fn try_recv(&mut self) -> Option<AddressEvent<A>> {
        self.rx.try_recv().ok()
    }
}

impl<A> Stream for AddressFeed<A> {
    type Item = AddressEvent<A>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// The stream type returned by [`discovery_channel`].
pub type DiscoveryStream<A> = ReceiverStream<Result<DiscoveryEvent<A>, ClientError>>;

/// Creates a bounded discovery feed and the handle used to publish into it.
///
/// `capacity` is normally `DiscoveryConfig::max_queue_size`; publishers wait
/// while that many events are queued. The feed completes once every sender is
/// dropped.
pub fn discovery_channel<A>(capacity: usize) -> (DiscoverySender<A>, DiscoveryStream<A>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (DiscoverySender { tx }, ReceiverStream::new(rx))
}

/// Publishes membership changes into a feed created by [`discovery_channel`].
#[derive(Debug)]
pub struct DiscoverySender<A> {
    tx: mpsc::Sender<Result<DiscoveryEvent<A>, ClientError>>,
}

impl<A> Clone for DiscoverySender<A> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<A: Send> DiscoverySender<A> {
    /// Sends an event, waiting for queue space. Fails once the group stopped consuming.
    pub async fn send(&self, event: DiscoveryEvent<A>) -> Result<(), ClientError> {
        self.tx
            .send(Ok(event))
            .await
            .map_err(|_| ClientError::Internal("discovery consumer has stopped".to_string()))
    }

    pub async fn available(&self, key: PartitionKey, address: A) -> Result<(), ClientError> {
        self.send(DiscoveryEvent::available(key, address)).await
    }

    pub async fn unavailable(&self, key: PartitionKey, address: A) -> Result<(), ClientError> {
        self.send(DiscoveryEvent::unavailable(key, address)).await
    }

    /// Terminates the feed with an error.
    pub async fn fail(self, error: ClientError) -> Result<(), ClientError> {
        self.tx
            .send(Err(error))
            .await
            .map_err(|_| ClientError::Internal("discovery consumer has stopped".to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
