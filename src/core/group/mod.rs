// src/core/group/mod.rs

//! The partitioned client group.
//!
//! A group owns one lazily built client per partition key announced by a
//! discovery feed. It hands out [`ClientHandle`]s from immutable snapshots that a
//! single background consumer replaces as events arrive, so readers never
//! observe a half-applied event and never two live handles for one key.

pub mod handle;
pub mod partition;
pub mod table;

mod consumer;
mod state;

pub use handle::ClientHandle;
pub use partition::Partition;
pub use table::GroupSnapshot;

use crate::config::GroupConfig;
use crate::core::client::{PartitionClient, PartitionClientFactory};
use crate::core::discovery::{Address, DiscoveryEvent};
use crate::core::errors::ClientError;
use crate::core::partition::{PartitionIndex, PartitionKey, PowerSetIndex};
use consumer::DiscoveryConsumer;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use state::GroupState;
use std::sync::Arc;
use std::time::Duration;
use table::{PartitionTable, Slot};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The outcome of an aggregate close.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloseReport {
    /// Partitions whose close completed successfully.
    pub closed: usize,
    /// Partitions whose close failed, with the cause.
    pub failures: Vec<(PartitionKey, ClientError)>,
    /// Whether `close_timeout` elapsed before every close finished.
    pub timed_out: bool,
}

impl CloseReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.timed_out
    }
}

/// Routes requests to one lazily built client per discovered partition.
pub struct PartitionedClientGroup<C: PartitionClient, A: Address, I: PartitionIndex = PowerSetIndex> {
    state: Arc<GroupState<C, A, I>>,
    shutdown: CancellationToken,
    consumer: Mutex<Option<JoinHandle<()>>>,
    report: OnceCell<CloseReport>,
    closed: CancellationToken,
    close_timeout: Duration,
}

impl<C: PartitionClient, A: Address> PartitionedClientGroup<C, A, PowerSetIndex> {
    /// Creates a group that resolves keys through a [`PowerSetIndex`].
    ///
    /// Must be called from within a tokio runtime; the discovery consumer is
    /// spawned immediately.
    ///
    /// The group consumes `feed` as given and does not buffer it. Queue bounds
    /// belong to the feed: build it with [`discovery_channel`] sized from
    /// `DiscoveryConfig::max_queue_size` to apply the configured backpressure.
    ///
    /// [`discovery_channel`]: crate::core::discovery::discovery_channel
    pub fn new<S, F>(feed: S, factory: F, config: &GroupConfig) -> Self
    where
        S: Stream<Item = Result<DiscoveryEvent<A>, ClientError>> + Send + 'static,
        F: PartitionClientFactory<A, Client = C>,
    {
        Self::with_index(feed, factory, PowerSetIndex::default(), config)
    }
}

impl<C: PartitionClient, A: Address, I: PartitionIndex> PartitionedClientGroup<C, A, I> {
    pub fn with_index<S, F>(feed: S, factory: F, index: I, config: &GroupConfig) -> Self
    where
        S: Stream<Item = Result<DiscoveryEvent<A>, ClientError>> + Send + 'static,
        F: PartitionClientFactory<A, Client = C>,
    {
        let state = Arc::new(GroupState::new(index));
        let shutdown = CancellationToken::new();
        let factory: Arc<dyn PartitionClientFactory<A, Client = C>> = Arc::new(factory);
        let consumer =
            DiscoveryConsumer::new(Arc::clone(&state), factory, feed.boxed(), shutdown.clone());
        let handle = tokio::spawn(consumer.run());
        Self {
            state,
            shutdown,
            consumer: Mutex::new(Some(handle)),
            report: OnceCell::new(),
            closed: CancellationToken::new(),
            close_timeout: config.close_timeout,
        }
    }

    /// Looks up the handle currently serving `key`. Never waits and never fails.
    pub fn get(&self, key: &PartitionKey) -> ClientHandle<C, A> {
        self.snapshot().get(key)
    }

    pub fn snapshot(&self) -> GroupSnapshot<C, A, I> {
        GroupSnapshot::new(self.state.table.load_full())
    }

    pub fn is_closed(&self) -> bool {
        self.report.initialized()
    }

    /// Closes every partition and stops consuming discovery events.
    ///
    /// Repeated and concurrent calls share one close and observe the same report.
    pub async fn close(&self) -> CloseReport {
        self.report.get_or_init(|| self.close_all()).await.clone()
    }

    /// Resolves once an aggregate close has completed.
    pub async fn on_close(&self) {
        self.closed.cancelled().await;
    }

    async fn close_all(&self) -> CloseReport {
        info!("Closing partitioned client group.");
        self.shutdown.cancel();
        let consumer = self.consumer.lock().take();
        if let Some(handle) = consumer
            && let Err(e) = handle.await
            && e.is_panic()
        {
            error!("Discovery consumer panicked: {}", e);
        }

        // The consumer is gone, so this is the last table anyone publishes.
        let current = self.state.table.load_full();
        let mut last = PartitionTable::clone(&current);
        let mut live = Vec::new();
        for slot in Arc::make_mut(&mut last.entries).values_mut() {
            if let Slot::Live(p) = slot {
                live.push(Arc::clone(p));
                *slot = Slot::Closed;
            }
        }
        last.closed = true;
        self.state.table.store(Arc::new(last));

        let mut tasks = self.state.take_teardowns();
        for partition in live {
            tasks.spawn(state::close_partition(partition));
        }

        let mut report = CloseReport {
            failures: self.state.take_teardown_failures(),
            ..CloseReport::default()
        };
        let collect = async {
            while let Some(done) = tasks.join_next().await {
                match done {
                    Ok((_, Ok(()))) => report.closed += 1,
                    Ok((key, Err(e))) => report.failures.push((key, e)),
                    Err(e) => error!("Partition close task failed: {}", e),
                }
            }
        };
        if tokio::time::timeout(self.close_timeout, collect).await.is_err() {
            warn!(
                "Timed out after {:?} waiting for {} partition(s) to close.",
                self.close_timeout,
                tasks.len()
            );
            report.timed_out = true;
            tasks.detach_all();
        }

        info!(
            "Partitioned client group closed: {} closed, {} failed{}.",
            report.closed,
            report.failures.len(),
            if report.timed_out { ", timed out" } else { "" }
        );
        self.closed.cancel();
        report
    }
}

impl<C: PartitionClient, A: Address, I: PartitionIndex> Drop for PartitionedClientGroup<C, A, I> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
