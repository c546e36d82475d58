use std::{
    fmt,
    sync::{Arc, OnceLock},
    time::Duration,
};

use reqwest::{Method, Response};
use tokio::time::sleep;

#[cfg(feature = "tracing")]
use crate::logger::TracingLogger;
use crate::{
    backoff::{default_backoff, Backoff},
    exhausted::{give_up, ErrorHandler, Exhausted},
    logger::{FnLogger, Level, Logger},
    policy::{default_retry_policy, RetryDecision, RetryPolicy},
    transport::{drain_body, Transport},
    BoxFuture, CancelToken, ClientOptions, Error, Request, RequestBody, Result,
};

/// Called before every attempt with the attempt index (0 for the first).
pub type RequestHook = Arc<dyn Fn(Option<&dyn Logger>, &reqwest::Request, usize) + Send + Sync>;

/// Called after every attempt that produced a response.
pub type ResponseHook = Arc<dyn Fn(Option<&dyn Logger>, &Response) + Send + Sync>;

#[derive(Clone)]
/// HTTP client that retries transient failures.
///
/// Configure it once and share it; clones share the underlying transport and
/// its connection pool. Every call keeps its own attempt count and backoff
/// state.
pub struct Client {
    transport: Arc<OnceLock<Arc<dyn Transport>>>,
    options: ClientOptions,
    logger: Option<Arc<dyn Logger>>,
    retry_policy: RetryPolicy,
    backoff: Backoff,
    error_handler: ErrorHandler,
    request_hook: Option<RequestHook>,
    response_hook: Option<ResponseHook>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("transport_ready", &self.transport.get().is_some())
            .field("options", &self.options)
            .field("logger", &self.logger.is_some())
            .field("request_hook", &self.request_hook.is_some())
            .field("response_hook", &self.response_hook.is_some())
            .finish()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Creates a client with default options and policies.
    ///
    /// The default `reqwest` transport is built on first use.
    pub fn new() -> Self {
        Self {
            transport: Arc::new(OnceLock::new()),
            options: ClientOptions::default(),
            logger: default_logger(),
            retry_policy: Arc::new(default_retry_policy),
            backoff: Arc::new(default_backoff),
            error_handler: Arc::new(give_up),
            request_hook: None,
            response_hook: None,
        }
    }

    /// Creates a client that sends through an existing `reqwest` client.
    pub fn with_http_client(http: reqwest::Client) -> Self {
        Self::new().with_transport(http)
    }

    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(OnceLock::from(Arc::new(transport) as Arc<dyn Transport>));
        self
    }

    /// Applies retry bounds, backoff window and timeout.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }

    pub fn with_retry_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&CancelToken, Option<&Response>, Option<&Error>) -> RetryDecision
            + Send
            + Sync
            + 'static,
    {
        self.retry_policy = Arc::new(policy);
        self
    }

    pub fn with_backoff<F>(mut self, backoff: F) -> Self
    where
        F: Fn(Duration, Duration, usize, Option<&Response>) -> Duration
            + Send
            + Sync
            + 'static,
    {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Replaces the handler consulted when retries run out.
    ///
    /// See [`give_up`] and [`pass_through`](crate::pass_through).
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(Exhausted) -> BoxFuture<'static, Result<Response>> + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(handler);
        self
    }

    pub fn with_request_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&dyn Logger>, &reqwest::Request, usize) + Send + Sync + 'static,
    {
        self.request_hook = Some(Arc::new(hook));
        self
    }

    pub fn with_response_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&dyn Logger>, &Response) + Send + Sync + 'static,
    {
        self.response_hook = Some(Arc::new(hook));
        self
    }

    /// Sends engine messages to a leveled logger.
    pub fn with_logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Sends engine messages to a plain line formatter.
    pub fn with_log_fn<F>(self, log: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.with_logger(FnLogger(log))
    }

    pub fn without_logger(mut self) -> Self {
        self.logger = None;
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Sends a GET request.
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.execute(Request::new(Method::GET, url)?).await
    }

    /// Sends a HEAD request.
    pub async fn head(&self, url: &str) -> Result<Response> {
        self.execute(Request::new(Method::HEAD, url)?).await
    }

    /// Sends a POST request with `body`, replayed on every attempt.
    pub async fn post(&self, url: &str, body: impl Into<RequestBody>) -> Result<Response> {
        self.execute(Request::new(Method::POST, url)?.with_body(body)?).await
    }

    /// Executes `request`, retrying transient failures.
    ///
    /// Returns the first response the retry policy accepts, whatever its
    /// status. Errors are returned as soon as the policy stops with one;
    /// when the attempt budget runs out the error handler decides.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let transport = Arc::clone(self.transport());
        let cancel = request.cancel_token();
        let url = request.redacted_url();
        let min = self.options.retry_wait_min();
        let max = self.options.retry_wait_max();
        let mut index = 0usize;

        loop {
            if let Some(reason) = cancel.reason() {
                return Err(Error::Cancelled(reason));
            }

            let attempt = request.build_attempt(self.options.timeout()).await?;
            if let Some(hook) = &self.request_hook {
                hook(self.logger.as_deref(), &attempt, index);
            }
            self.log(
                Level::Debug,
                format_args!("performing request {} {}", request.method(), url),
            );

            let sent = tokio::select! {
                biased;
                reason = cancel.cancelled() => return Err(Error::Cancelled(reason)),
                sent = transport.send(attempt) => sent,
            };

            let outcome = match sent {
                Ok(response) => {
                    if let Some(hook) = &self.response_hook {
                        hook(self.logger.as_deref(), &response);
                    }
                    Ok(response)
                }
                Err(err) => {
                    self.log(
                        Level::Error,
                        format_args!("request failed {} {}: {}", request.method(), url, err),
                    );
                    Err(Error::Transport(err))
                }
            };

            let (should_retry, classified) = self.evaluate(&request, &outcome);

            if !should_retry {
                return match (outcome, classified) {
                    (Ok(response), None) => Ok(response),
                    (Ok(mut response), Some(err)) => {
                        self.drain(&mut response).await;
                        Err(err)
                    }
                    (Err(transport_err), classified) => Err(classified.unwrap_or(transport_err)),
                };
            }

            let remaining = self.options.max_retries.saturating_sub(index);
            if remaining == 0 {
                let (response, error) = match outcome {
                    Ok(response) => (Some(response), classified),
                    Err(transport_err) => (None, classified.or(Some(transport_err))),
                };
                let attempts = index + 1;
                self.log(
                    Level::Debug,
                    format_args!(
                        "giving up {} {} after {} attempt(s)",
                        request.method(),
                        url,
                        attempts
                    ),
                );
                return (self.error_handler)(Exhausted {
                    method: request.method().clone(),
                    url,
                    response,
                    error,
                    attempts,
                })
                .await;
            }

            let mut response = outcome.ok();
            if let Some(response) = response.as_mut() {
                self.drain(response).await;
            }
            let wait = (self.backoff)(min, max, index, response.as_ref());
            drop(response);

            self.log(
                Level::Debug,
                format_args!(
                    "retrying request {} {} in {:?} ({} left)",
                    request.method(),
                    url,
                    wait,
                    remaining
                ),
            );

            tokio::select! {
                biased;
                reason = cancel.cancelled() => return Err(Error::Cancelled(reason)),
                _ = sleep(wait) => {}
            }
            index += 1;
        }
    }

    /// Runs the retry policy and, for an accepted response, the request's
    /// response handler.
    ///
    /// Returns whether to retry and the error to surface, if any.
    fn evaluate(
        &self,
        request: &Request,
        outcome: &std::result::Result<Response, Error>,
    ) -> (bool, Option<Error>) {
        let cancel = request.cancel_token();
        let response = outcome.as_ref().ok();
        let decision = (self.retry_policy)(cancel, response, outcome.as_ref().err());

        let accepted = !decision.retry && decision.error.is_none();
        let (Some(handler), Some(response), true) = (request.response_handler(), response, accepted)
        else {
            return (decision.retry, decision.error);
        };

        match handler(response) {
            Ok(()) => (false, None),
            Err(err) => {
                let err = Error::handler(err);
                let decision = (self.retry_policy)(cancel, Some(response), Some(&err));
                (decision.retry, decision.error.or(Some(err)))
            }
        }
    }

    async fn drain(&self, response: &mut Response) {
        if let Err(err) = drain_body(response).await {
            self.log(
                Level::Error,
                format_args!("error reading response body: {err}"),
            );
        }
    }

    fn transport(&self) -> &Arc<dyn Transport> {
        self.transport
            .get_or_init(|| Arc::new(reqwest::Client::new()) as Arc<dyn Transport>)
    }

    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if let Some(logger) = &self.logger {
            logger.log(level, args);
        }
    }
}

#[cfg(feature = "tracing")]
fn default_logger() -> Option<Arc<dyn Logger>> {
    Some(Arc::new(TracingLogger))
}

#[cfg(not(feature = "tracing"))]
fn default_logger() -> Option<Arc<dyn Logger>> {
    None
}

#[cfg(test)]
mod tests {
    use super::Client;
    use crate::ClientOptions;

    #[test]
    fn debug_lists_configuration_without_internals() {
        let client = Client::new().with_options(ClientOptions {
            max_retries: 2,
            ..ClientOptions::default()
        });
        let debug = format!("{client:?}");
        assert!(debug.contains("max_retries: 2"));
        assert!(debug.contains("transport_ready: false"));
    }

    #[test]
    fn clones_share_lazily_built_transport() {
        let client = Client::new();
        let clone = client.clone();
        let first = client.transport() as *const _;
        let second = clone.transport() as *const _;
        assert_eq!(first, second);
    }
}
