//! `resilient-http` executes HTTP requests with classified retries.
//!
//! [`Client::execute`] sends a [`Request`], asks a [`RetryPolicy`] whether the
//! outcome is transient, waits according to a [`Backoff`], replays the body
//! and tries again until the policy accepts the outcome or the attempt budget
//! in [`ClientOptions`] runs out:
//! - [`default_retry_policy`] retries transport failures, 429 and 5xx (except
//!   501);
//! - [`default_backoff`] doubles the wait per attempt and honours
//!   `Retry-After` on 429/503;
//! - [`give_up`] turns exhaustion into [`Error::GaveUp`].

mod backoff;
mod body;
mod cancel;
mod client;
mod error;
mod exhausted;
mod logger;
mod options;
mod policy;
mod request;
mod transport;

pub use backoff::{
    default_backoff, linear_jitter_backoff, rate_limit_linear_jitter_backoff, retry_after_hint,
    Backoff,
};
pub use body::{materialize, ReadSeek, ReplayableBody, RequestBody};
pub use cancel::{CancelReason, CancelToken};
pub use client::{Client, RequestHook, ResponseHook};
pub use error::{BoxError, Error, TransportError, TransportErrorKind};
pub use exhausted::{give_up, pass_through, ErrorHandler, Exhausted};
#[cfg(feature = "tracing")]
pub use logger::TracingLogger;
pub use logger::{FnLogger, Level, Logger};
pub use options::ClientOptions;
pub use policy::{default_retry_policy, RetryDecision, RetryPolicy};
pub use request::{Request, ResponseHandler};
pub use transport::{drain_body, BoxFuture, Transport, DRAIN_LIMIT};

pub type Result<T> = std::result::Result<T, Error>;
