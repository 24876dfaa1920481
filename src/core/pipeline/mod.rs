// src/core/pipeline/mod.rs

//! Ordered request pipelining over a single connection.
//!
//! Requests are written in admission order without waiting for earlier
//! responses, and the protocol's strict response ordering is what correlates
//! each decoded response with its request.

mod driver;
mod exchange;

pub use exchange::ResponseFuture;

use crate::config::PipelineConfig;
use crate::core::errors::ClientError;
use crate::core::protocol::{Request, Response};
use exchange::Exchanges;
use futures::{Sink, Stream, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Semaphore, TryAcquireError};
use tokio_util::codec::{Decoder, Encoder, Framed};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A connection that keeps up to `max_pipelined_requests` exchanges outstanding.
///
/// Responses resolve strictly in admission order. A transport failure fails
/// every outstanding exchange with the same cause and makes the connection
/// unusable; the caller is expected to discard it.
pub struct PipelinedConnection {
    exchanges: Arc<Exchanges>,
    slots: Arc<Semaphore>,
    max: usize,
}

impl PipelinedConnection {
    /// Pipelines over `io` framed with `codec`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<T, K>(io: T, codec: K, config: &PipelineConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
        K: Encoder<Request, Error = ClientError>
            + Decoder<Item = Response, Error = ClientError>
            + Send
            + 'static,
    {
        let (sink, stream) = Framed::new(io, codec).split();
        Self::from_parts(sink, stream, config)
    }

    /// Pipelines over an already split transport.
    pub fn from_parts<W, R>(sink: W, stream: R, config: &PipelineConfig) -> Self
    where
        W: Sink<Request, Error = ClientError> + Send + 'static,
        R: Stream<Item = Result<Response, ClientError>> + Send + 'static,
    {
        let max = config.max_pipelined_requests.max(1);
        let exchanges = Arc::new(Exchanges::new(CancellationToken::new()));
        tokio::spawn(driver::write_loop(Arc::clone(&exchanges), Box::pin(sink)));
        tokio::spawn(driver::read_loop(Arc::clone(&exchanges), Box::pin(stream)));
        debug!("Pipelined connection started (max {} outstanding).", max);
        Self {
            exchanges,
            slots: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Admits `request` without waiting.
    ///
    /// Fails immediately if the protocol cannot pipeline, the connection has
    /// failed, or every pipeline slot is taken. A rejected request never reaches
    /// the transport.
    pub fn submit(&self, request: Request) -> Result<ResponseFuture, ClientError> {
        let version = request.version();
        if !version.supports_pipelining() {
            return Err(ClientError::ProtocolMismatch(version));
        }
        let max = self.max;
        self.exchanges.admit(request, || {
            Arc::clone(&self.slots)
                .try_acquire_owned()
                .map_err(|e| match e {
                    TryAcquireError::NoPermits => ClientError::CapacityExceeded { max },
                    TryAcquireError::Closed => {
                        ClientError::Internal("pipeline slots are closed".to_string())
                    }
                })
        })
    }

    /// Submits `request` and waits for its response.
    pub async fn request(&self, request: Request) -> Result<Response, ClientError> {
        self.submit(request)?.await
    }

    /// Exchanges admitted and not yet dropped by their callers.
    pub fn outstanding(&self) -> usize {
        self.max - self.slots.available_permits()
    }

    pub fn max_pipelined_requests(&self) -> usize {
        self.max
    }

    /// False once the connection has failed or was closed.
    pub fn is_usable(&self) -> bool {
        self.exchanges.failure().is_none()
    }

    /// The failure that made the connection unusable, if any.
    pub fn failure(&self) -> Option<ClientError> {
        self.exchanges.failure()
    }

    /// Fails every outstanding exchange and stops the I/O tasks. Idempotent.
    pub fn close(&self) {
        self.exchanges.shutdown().cancel();
        self.exchanges
            .fail(ClientError::ConnectionFailure("connection closed".to_string()));
    }
}

impl Drop for PipelinedConnection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PipelinedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelinedConnection")
            .field("max", &self.max)
            .field("outstanding", &self.outstanding())
            .field("usable", &self.is_usable())
            .finish()
    }
}
