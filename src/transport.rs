use std::{future::Future, pin::Pin};

use reqwest::{Request, Response};

use crate::TransportError;

/// Boxed future returned by [`Transport`] and error handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Bytes read and discarded from a response before its connection is
/// released.
pub const DRAIN_LIMIT: usize = 4096;

/// Performs a single HTTP exchange.
///
/// Implemented for [`reqwest::Client`]; tests and alternate stacks can
/// provide their own.
pub trait Transport: Send + Sync {
    fn send(&self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>>;
}

impl Transport for reqwest::Client {
    fn send(&self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>> {
        Box::pin(async move {
            reqwest::Client::execute(self, request)
                .await
                .map_err(TransportError::from)
        })
    }
}

/// Reads and discards up to [`DRAIN_LIMIT`] bytes of the response body so
/// the pooled connection can be reused.
///
/// Returns the number of bytes discarded, never more than the limit. No
/// further chunk is pulled once the limit is reached.
pub async fn drain_body(response: &mut Response) -> Result<usize, reqwest::Error> {
    let mut drained = 0usize;
    while drained < DRAIN_LIMIT {
        let Some(chunk) = response.chunk().await? else {
            break;
        };
        drained += chunk.len().min(DRAIN_LIMIT - drained);
    }
    Ok(drained)
}
