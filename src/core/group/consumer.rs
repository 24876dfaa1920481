// src/core/group/consumer.rs

//! The single task that applies discovery events to the partition table.

use super::partition::Partition;
use super::state::GroupState;
use super::table::{PartitionTable, Slot};
use crate::core::client::{PartitionClient, PartitionClientFactory};
use crate::core::discovery::{Address, DiscoveryEvent, EventKind};
use crate::core::errors::ClientError;
use crate::core::partition::PartitionIndex;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub(crate) type EventStream<A> = BoxStream<'static, Result<DiscoveryEvent<A>, ClientError>>;

pub(crate) struct DiscoveryConsumer<C: PartitionClient, A, I> {
    state: Arc<GroupState<C, A, I>>,
    factory: Arc<dyn PartitionClientFactory<A, Client = C>>,
    events: EventStream<A>,
    shutdown: CancellationToken,
}

impl<C: PartitionClient, A: Address, I: PartitionIndex> DiscoveryConsumer<C, A, I> {
    pub(crate) fn new(
        state: Arc<GroupState<C, A, I>>,
        factory: Arc<dyn PartitionClientFactory<A, Client = C>>,
        events: EventStream<A>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            state,
            factory,
            events,
            shutdown,
        }
    }

    /// Applies events in arrival order until the feed ends or the group shuts down.
    pub(crate) async fn run(mut self) {
        debug!("Discovery consumer started.");
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!("Discovery consumer shutting down.");
                    return;
                }
                next = self.events.next() => match next {
                    Some(Ok(event)) => self.apply(event),
                    Some(Err(e)) => {
                        warn!("Discovery feed failed: {}. Existing partitions keep serving.", e);
                        return;
                    }
                    None => {
                        info!("Discovery feed completed. Existing partitions keep serving.");
                        return;
                    }
                }
            }
        }
    }

    /// Builds and publishes the table that follows `event`.
    fn apply(&self, event: DiscoveryEvent<A>) {
        let current = self.state.table.load_full();
        let mut next = PartitionTable::clone(&current);
        let mut retired = None;
        let DiscoveryEvent { key, address, kind } = event;

        match (kind, current.entries.get(&key)) {
            (EventKind::Available, Some(Slot::Live(p))) => {
                trace!("Address {:?} available for partition {}.", address, key);
                p.address_available(address);
            }
            (EventKind::Available, _) => {
                let id = self.state.next_id();
                info!("Partition {} is available (#{}) at {:?}.", key, id, address);
                let partition = Partition::new(id, key.clone(), address, Arc::clone(&self.factory));
                if !next.index.contains(&key) {
                    Arc::make_mut(&mut next.index).register(&key);
                }
                Arc::make_mut(&mut next.entries).insert(key, Slot::Live(Arc::new(partition)));
            }
            (EventKind::Unavailable, Some(Slot::Live(p))) => {
                let remaining = p.address_unavailable(&address);
                trace!(
                    "Address {:?} unavailable for partition {}; {} left.",
                    address, key, remaining
                );
                if remaining == 0 {
                    info!(
                        "Partition {} (#{}) has no addresses left; closing it.",
                        key,
                        p.id()
                    );
                    retired = Some(Arc::clone(p));
                    Arc::make_mut(&mut next.entries).insert(key, Slot::Closed);
                }
            }
            (EventKind::Unavailable, _) => {
                debug!(
                    "Ignoring unavailable address {:?} for partition {}: it is not live.",
                    address, key
                );
            }
        }

        next.applied += 1;
        self.state.table.store(Arc::new(next));
        if let Some(partition) = retired {
            self.state.spawn_teardown(partition);
        }
    }
}
