// src/core/pipeline/driver.rs

//! The writer and reader tasks behind a pipelined connection.

use super::exchange::Exchanges;
use crate::core::errors::ClientError;
use crate::core::protocol::{Request, Response};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tracing::trace;

/// Normalises a transport error into the cause every pending exchange sees.
fn connection_failure(context: &str, err: ClientError) -> ClientError {
    match err {
        ClientError::ConnectionFailure(_) => err,
        other => ClientError::ConnectionFailure(format!("{context}: {other}")),
    }
}

/// Writes admitted requests in sequence order.
///
/// Consecutive requests are fed without flushing; the sink is flushed once the
/// write queue drains.
pub(crate) async fn write_loop<W>(exchanges: Arc<Exchanges>, mut sink: W)
where
    W: Sink<Request, Error = ClientError> + Unpin,
{
    let shutdown = exchanges.shutdown().clone();
    let mut dirty = false;
    loop {
        if let Some((seq, request)) = exchanges.next_to_write() {
            trace!("Writing exchange #{}.", seq);
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                res = sink.feed(request) => {
                    if let Err(e) = res {
                        exchanges.fail(connection_failure("write failed", e));
                        return;
                    }
                    dirty = true;
                }
            }
            if exchanges.has_unwritten() {
                continue;
            }
        }

        if dirty {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                res = sink.flush() => {
                    if let Err(e) = res {
                        exchanges.fail(connection_failure("flush failed", e));
                        return;
                    }
                    dirty = false;
                }
            }
            continue;
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            _ = exchanges.writable().notified() => {}
        }
    }
}

/// Matches each decoded response to the oldest in-flight exchange.
pub(crate) async fn read_loop<R>(exchanges: Arc<Exchanges>, mut stream: R)
where
    R: Stream<Item = Result<Response, ClientError>> + Unpin,
{
    let shutdown = exchanges.shutdown().clone();
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            next = stream.next() => match next {
                Some(Ok(response)) => {
                    trace!("Received response with status {}.", response.status);
                    if let Err(e) = exchanges.deliver(response) {
                        exchanges.fail(e);
                        return;
                    }
                }
                Some(Err(e)) => {
                    exchanges.fail(connection_failure("read failed", e));
                    return;
                }
                None => {
                    exchanges.fail(ClientError::ConnectionFailure(
                        "connection closed by peer".to_string(),
                    ));
                    return;
                }
            }
        }
    }
}
