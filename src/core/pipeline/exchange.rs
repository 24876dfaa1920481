// src/core/pipeline/exchange.rs

//! Exchange bookkeeping shared by a pipelined connection and its I/O tasks.

use crate::core::errors::ClientError;
use crate::core::protocol::{Request, Response};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{Notify, OwnedSemaphorePermit, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type Reply = oneshot::Sender<Result<Response, ClientError>>;

/// Admitted but not yet handed to the transport.
struct Unwritten {
    seq: u64,
    request: Request,
    reply: Reply,
}

/// Written and waiting for its response.
struct InFlight {
    seq: u64,
    reply: Reply,
}

#[derive(Default)]
struct ExchangeQueue {
    next_seq: u64,
    unwritten: VecDeque<Unwritten>,
    in_flight: VecDeque<InFlight>,
    failure: Option<ClientError>,
}

/// State shared by the connection handle, the writer and the reader.
///
/// Both queues are in sequence order and every admitted exchange is in exactly
/// one of them until it resolves.
pub(crate) struct Exchanges {
    queue: Mutex<ExchangeQueue>,
    writable: Notify,
    shutdown: CancellationToken,
}

impl Exchanges {
    pub(crate) fn new(shutdown: CancellationToken) -> Self {
        Self {
            queue: Mutex::new(ExchangeQueue::default()),
            writable: Notify::new(),
            shutdown,
        }
    }

    pub(crate) fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub(crate) fn writable(&self) -> &Notify {
        &self.writable
    }

    pub(crate) fn failure(&self) -> Option<ClientError> {
        self.queue.lock().failure.clone()
    }

    /// Appends an exchange to the write queue, unless the connection has failed.
    ///
    /// `permit` is acquired under the queue lock so that admission and failure
    /// are ordered with respect to each other.
    pub(crate) fn admit(
        &self,
        request: Request,
        permit: impl FnOnce() -> Result<OwnedSemaphorePermit, ClientError>,
    ) -> Result<ResponseFuture, ClientError> {
        let mut queue = self.queue.lock();
        if let Some(err) = &queue.failure {
            return Err(err.clone());
        }
        let permit = permit()?;
        let seq = queue.next_seq;
        queue.next_seq += 1;
        let (reply, rx) = oneshot::channel();
        queue.unwritten.push_back(Unwritten {
            seq,
            request,
            reply,
        });
        drop(queue);
        self.writable.notify_one();
        Ok(ResponseFuture {
            seq,
            rx,
            _permit: permit,
        })
    }

    /// Moves the oldest live unwritten exchange to the in-flight queue and returns
    /// its request. Cancelled exchanges are dropped on the way.
    pub(crate) fn next_to_write(&self) -> Option<(u64, Request)> {
        let mut queue = self.queue.lock();
        if queue.failure.is_some() {
            return None;
        }
        while let Some(exchange) = queue.unwritten.pop_front() {
            if exchange.reply.is_closed() {
                debug!("Skipping cancelled exchange #{} before writing it.", exchange.seq);
                continue;
            }
            let Unwritten {
                seq,
                request,
                reply,
            } = exchange;
            queue.in_flight.push_back(InFlight { seq, reply });
            return Some((seq, request));
        }
        None
    }

    pub(crate) fn has_unwritten(&self) -> bool {
        !self.queue.lock().unwritten.is_empty()
    }

    /// Completes the oldest in-flight exchange with `response`.
    pub(crate) fn deliver(&self, response: Response) -> Result<(), ClientError> {
        let head = self.queue.lock().in_flight.pop_front();
        let Some(exchange) = head else {
            return Err(ClientError::ConnectionFailure(
                "received a response with no request in flight".to_string(),
            ));
        };
        if exchange.reply.send(Ok(response)).is_err() {
            debug!("Discarding response to cancelled exchange #{}.", exchange.seq);
        }
        Ok(())
    }

    /// Fails every pending exchange with `cause` and stops the I/O tasks.
    ///
    /// In-flight exchanges are failed before unwritten ones, each queue in
    /// sequence order. Only the first failure is recorded.
    pub(crate) fn fail(&self, cause: ClientError) {
        let (in_flight, unwritten) = {
            let mut queue = self.queue.lock();
            if queue.failure.is_some() {
                return;
            }
            queue.failure = Some(cause.clone());
            (
                std::mem::take(&mut queue.in_flight),
                std::mem::take(&mut queue.unwritten),
            )
        };
        let pending = in_flight.len() + unwritten.len();
        if self.shutdown.is_cancelled() {
            debug!("Pipelined connection closed with {} pending exchange(s).", pending);
        } else {
            warn!(
                "Pipelined connection failed with {} pending exchange(s): {}",
                pending, cause
            );
        }
        self.shutdown.cancel();

        let replies = in_flight
            .into_iter()
            .map(|e| e.reply)
            .chain(unwritten.into_iter().map(|e| e.reply));
        for reply in replies {
            let _ = reply.send(Err(cause.clone()));
        }
        self.writable.notify_one();
    }
}

/// Resolves to the response of one pipelined exchange.
///
/// Holding the future reserves one of the connection's pipeline slots; dropping
/// it releases the slot and cancels the exchange.
#[must_use = "dropping a ResponseFuture cancels its exchange"]
#[derive(Debug)]
pub struct ResponseFuture {
    seq: u64,
    rx: oneshot::Receiver<Result<Response, ClientError>>,
    _permit: OwnedSemaphorePermit,
}

impl ResponseFuture {
    /// The exchange's position in admission order on its connection.
    pub fn sequence(&self) -> u64 {
        self.seq
    }
}

impl Future for ResponseFuture {
    type Output = Result<Response, ClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ClientError::ConnectionFailure(
                "connection dropped the exchange".to_string(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}
