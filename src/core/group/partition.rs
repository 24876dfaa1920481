// src/core/group/partition.rs

//! A live partition: its address set, its lazily built client and its teardown.

use crate::core::client::{PartitionClient, PartitionClientFactory};
use crate::core::discovery::{Address, AddressEvent, AddressFeed, EventKind};
use crate::core::errors::ClientError;
use crate::core::partition::PartitionKey;
use crate::core::protocol::{Request, Response};
use indexmap::IndexSet;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{OnceCell, mpsc};
use tracing::{debug, info, warn};

/// The mutable address state of a partition, guarded by a single lock.
struct FeedState<A> {
    addresses: IndexSet<A>,
    /// Forwarding side of the client's `AddressFeed`, set once construction starts.
    sender: Option<mpsc::UnboundedSender<AddressEvent<A>>>,
    /// Bumped by every `Available` event.
    epoch: u64,
    /// The last construction failure and the epoch it was observed in.
    failure: Option<(u64, ClientError)>,
}

impl<A> FeedState<A> {
    fn forward(&mut self, event: AddressEvent<A>) {
        let gone = self
            .sender
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_err());
        if gone {
            self.sender = None;
        }
    }

    fn current_failure(&self) -> Option<&ClientError> {
        match &self.failure {
            Some((epoch, err)) if *epoch == self.epoch => Some(err),
            _ => None,
        }
    }
}

/// The handle bound to one partition key while it has at least one address.
///
/// Once closed a partition never reopens. A later `Available` event for the same
/// key creates a new `Partition` with a new id.
pub struct Partition<C: PartitionClient, A> {
    id: u64,
    key: PartitionKey,
    factory: Arc<dyn PartitionClientFactory<A, Client = C>>,
    feed: Mutex<FeedState<A>>,
    client: OnceCell<Arc<C>>,
    closed: AtomicBool,
    client_closed: AtomicBool,
}

impl<C: PartitionClient, A: Address> Partition<C, A> {
    pub(crate) fn new(
        id: u64,
        key: PartitionKey,
        first_address: A,
        factory: Arc<dyn PartitionClientFactory<A, Client = C>>,
    ) -> Self {
        let mut addresses = IndexSet::new();
        addresses.insert(first_address);
        Self {
            id,
            key,
            factory,
            feed: Mutex::new(FeedState {
                addresses,
                sender: None,
                epoch: 0,
                failure: None,
            }),
            client: OnceCell::new(),
            closed: AtomicBool::new(false),
            client_closed: AtomicBool::new(false),
        }
    }

    /// A group-unique identity. Two handles for the same key never share an id.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &PartitionKey {
        &self.key
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether the factory has produced a client for this partition.
    pub fn is_constructed(&self) -> bool {
        self.client.initialized()
    }

    /// The addresses currently known for this partition, in arrival order.
    pub fn addresses(&self) -> Vec<A> {
        self.feed.lock().addresses.iter().cloned().collect()
    }

    /// Applies an `Available` event. Also makes a failed construction eligible for retry.
    pub(crate) fn address_available(&self, address: A) {
        let mut feed = self.feed.lock();
        feed.epoch += 1;
        if feed.addresses.insert(address.clone()) {
            feed.forward(AddressEvent {
                address,
                kind: EventKind::Available,
            });
        }
    }

    /// Applies an `Unavailable` event and returns how many addresses remain.
    pub(crate) fn address_unavailable(&self, address: &A) -> usize {
        let mut feed = self.feed.lock();
        if feed.addresses.shift_remove(address) {
            feed.forward(AddressEvent {
                address: address.clone(),
                kind: EventKind::Unavailable,
            });
        }
        feed.addresses.len()
    }

    /// Returns the partition's client, building it on first use.
    ///
    /// Concurrent callers share one construction. A failed construction is
    /// reported to every caller until the next `Available` event.
    pub async fn client(&self) -> Result<Arc<C>, ClientError> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        let client = self.client.get_or_try_init(|| self.construct()).await?;
        if self.is_closed() {
            // Closed while the factory was running; the closer saw no client.
            if let Err(e) = self.close_client(client).await {
                warn!("Failed to close client of partition {}: {}", self.key, e);
            }
            return Err(self.closed_error());
        }
        Ok(Arc::clone(client))
    }

    async fn construct(&self) -> Result<Arc<C>, ClientError> {
        let (addresses, epoch) = {
            let mut feed = self.feed.lock();
            if let Some(err) = feed.current_failure() {
                return Err(err.clone());
            }
            if self.is_closed() {
                return Err(self.closed_error());
            }
            let (tx, rx) = mpsc::unbounded_channel();
            for address in &feed.addresses {
                let _ = tx.send(AddressEvent {
                    address: address.clone(),
                    kind: EventKind::Available,
                });
            }
            feed.sender = Some(tx);
            (AddressFeed::new(rx), feed.epoch)
        };

        debug!("Constructing client for partition {} (#{}).", self.key, self.id);
        match self.factory.create(self.key.clone(), addresses).await {
            Ok(client) => {
                info!("Client for partition {} (#{}) is ready.", self.key, self.id);
                Ok(Arc::new(client))
            }
            Err(e) => {
                let err = ClientError::ConstructionFailure {
                    key: self.key.clone(),
                    reason: e.to_string(),
                };
                warn!("{}", err);
                let mut feed = self.feed.lock();
                feed.sender = None;
                feed.failure = Some((epoch, err.clone()));
                Err(err)
            }
        }
    }

    pub async fn request(&self, request: Request) -> Result<Response, ClientError> {
        let client = self.client().await?;
        client.request(request).await
    }

    pub async fn reserve_connection(&self, request: &Request) -> Result<C::Connection, ClientError> {
        let client = self.client().await?;
        client.reserve_connection(request).await
    }

    /// Closes the partition and its client, if one was built. Idempotent.
    pub async fn close(&self) -> Result<(), ClientError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Ends the client's address feed.
        self.feed.lock().sender = None;
        debug!("Closing partition {} (#{}).", self.key, self.id);
        match self.client.get() {
            Some(client) => self.close_client(client).await,
            None => Ok(()),
        }
    }

    async fn close_client(&self, client: &Arc<C>) -> Result<(), ClientError> {
        if self.client_closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        client.close().await
    }

    fn closed_error(&self) -> ClientError {
        ClientError::ClosedPartition {
            key: self.key.clone(),
        }
    }
}

impl<C: PartitionClient, A> fmt::Debug for Partition<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .field("constructed", &self.client.initialized())
            .finish()
    }
}
