use std::{fmt, sync::Arc};

use reqwest::{Method, Response};

use crate::{transport::drain_body, BoxFuture, Error, Result};

/// Produces the final result once every permitted attempt asked for a retry.
pub type ErrorHandler =
    Arc<dyn Fn(Exhausted) -> BoxFuture<'static, Result<Response>> + Send + Sync>;

/// State handed to an [`ErrorHandler`] when the attempt budget runs out.
pub struct Exhausted {
    pub method: Method,
    /// Request URL with any password redacted.
    pub url: String,
    /// Last response, body not yet drained.
    pub response: Option<Response>,
    /// Last classification error, or the last transport error.
    pub error: Option<Error>,
    pub attempts: usize,
}

impl Exhausted {
    /// The "giving up" error, wrapping the last error when there is one.
    pub fn into_error(self) -> Error {
        Error::GaveUp {
            method: self.method,
            url: self.url,
            attempts: self.attempts,
            cause: self.error.map(Box::new),
        }
    }
}

impl fmt::Debug for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exhausted")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("status", &self.response.as_ref().map(Response::status))
            .field("error", &self.error)
            .field("attempts", &self.attempts)
            .finish()
    }
}

/// Default handler: releases the last response and returns
/// [`Error::GaveUp`].
pub fn give_up(mut exhausted: Exhausted) -> BoxFuture<'static, Result<Response>> {
    Box::pin(async move {
        if let Some(mut response) = exhausted.response.take() {
            let _ = drain_body(&mut response).await;
        }
        Err(exhausted.into_error())
    })
}

/// Returns the last response unmodified so the caller can inspect it.
///
/// The caller then owns the response body. Without a response this behaves
/// like [`give_up`].
pub fn pass_through(mut exhausted: Exhausted) -> BoxFuture<'static, Result<Response>> {
    Box::pin(async move {
        match exhausted.response.take() {
            Some(response) => Ok(response),
            None => Err(exhausted.into_error()),
        }
    })
}
