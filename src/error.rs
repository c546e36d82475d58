use std::{error::Error as StdError, fmt, io, sync::Arc};

use reqwest::{Method, StatusCode};

use crate::cancel::CancelReason;

/// Boxed error returned by response handlers and custom transports.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Error type returned by this crate.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// The request's cancel token fired or its deadline passed.
    #[error("request cancelled: {0}")]
    Cancelled(CancelReason),
    /// Network or request execution error from the transport.
    #[error("transport error: {0}")]
    Transport(TransportError),
    /// Retryable status code; surfaced if retries run out.
    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(StatusCode),
    /// The request's response handler rejected the response.
    #[error("response handler failed: {0}")]
    Handler(Arc<dyn StdError + Send + Sync>),
    /// The request body could not be read or replayed.
    #[error("request body error: {0}")]
    Body(Arc<io::Error>),
    /// The payload type has no replayable representation.
    #[error("unsupported request body type: {0}")]
    UnsupportedBody(String),
    #[error("invalid request URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },
    /// Every permitted attempt asked for another retry.
    #[error("{method} {url} giving up after {attempts} attempt(s){}", cause_suffix(.cause))]
    GaveUp {
        method: Method,
        /// Request URL with any password removed.
        url: String,
        attempts: usize,
        /// Last classification or transport error, if any.
        cause: Option<Box<Error>>,
    },
    /// Invalid client options.
    #[error("invalid configuration: {0}")]
    Config(String),
}

fn cause_suffix(cause: &Option<Box<Error>>) -> String {
    cause
        .as_ref()
        .map(|cause| format!(": {cause}"))
        .unwrap_or_default()
}

impl Error {
    pub(crate) fn handler(err: BoxError) -> Self {
        Self::Handler(Arc::from(err))
    }

    pub(crate) fn body(err: io::Error) -> Self {
        Self::Body(Arc::new(err))
    }

    /// Returns `true` when the call ended because of its cancel token.
    ///
    /// Looks through [`Error::GaveUp`] at the recorded cause.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled(_) => true,
            Self::GaveUp {
                cause: Some(cause), ..
            } => cause.is_cancelled(),
            _ => false,
        }
    }

    /// Returns `true` when the attempt budget ran out.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::GaveUp { .. })
    }

    /// Transport failure class, looking through [`Error::GaveUp`].
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport(err) => Some(err.kind()),
            Self::GaveUp {
                cause: Some(cause), ..
            } => cause.transport_kind(),
            _ => None,
        }
    }

    /// Status behind an [`Error::UnexpectedStatus`], looking through
    /// [`Error::GaveUp`].
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::UnexpectedStatus(status) => Some(*status),
            Self::GaveUp {
                cause: Some(cause), ..
            } => cause.status(),
            _ => None,
        }
    }
}

/// Broad class of a transport failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportErrorKind {
    /// The redirect policy stopped following redirects.
    RedirectLimit,
    /// The URL scheme cannot be sent by the transport.
    UnsupportedScheme,
    /// The server certificate could not be verified.
    UntrustedCertificate,
    Timeout,
    Connect,
    Other,
}

impl TransportErrorKind {
    /// Terminal kinds never succeed on a replay.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::RedirectLimit | Self::UnsupportedScheme | Self::UntrustedCertificate
        )
    }

    /// Classifies an arbitrary error by the messages in its source chain.
    pub fn classify(err: &(dyn StdError + 'static)) -> Self {
        let chain = error_chain_text(err);
        let redirect_limit = chain.contains("stopped after") || chain.contains("too many");
        if chain.contains("redirect") && redirect_limit {
            Self::RedirectLimit
        } else if chain.contains("unsupported protocol scheme")
            || chain.contains("scheme is not allowed")
            || chain.contains("unsupported scheme")
        {
            Self::UnsupportedScheme
        } else if mentions_untrusted_certificate(&chain) {
            Self::UntrustedCertificate
        } else if chain.contains("timed out") || chain.contains("timeout") {
            Self::Timeout
        } else if chain.contains("connection refused") || chain.contains("dns error") {
            Self::Connect
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RedirectLimit => "redirect limit",
            Self::UnsupportedScheme => "unsupported scheme",
            Self::UntrustedCertificate => "untrusted certificate",
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// A transport-level failure together with its class.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{source}")]
pub struct TransportError {
    kind: TransportErrorKind,
    #[source]
    source: Arc<dyn StdError + Send + Sync>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            source: Arc::from(source.into()),
        }
    }

    /// Wraps an error from a custom transport, deriving the kind from its
    /// message chain.
    pub fn classify(source: impl Into<BoxError>) -> Self {
        let source: BoxError = source.into();
        let kind = TransportErrorKind::classify(source.as_ref());
        Self::new(kind, source)
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_redirect() {
            TransportErrorKind::RedirectLimit
        } else {
            match TransportErrorKind::classify(&err) {
                TransportErrorKind::Other if err.is_timeout() => TransportErrorKind::Timeout,
                TransportErrorKind::Other if err.is_connect() => TransportErrorKind::Connect,
                kind => kind,
            }
        };
        Self::new(kind, err)
    }
}

fn error_chain_text(err: &(dyn StdError + 'static)) -> String {
    let mut text = err.to_string();
    let mut current = err.source();
    while let Some(inner) = current {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        current = inner.source();
    }
    text.to_ascii_lowercase()
}

fn mentions_untrusted_certificate(chain: &str) -> bool {
    chain.contains("certificate")
        && [
            "unknownissuer",
            "unknown issuer",
            "not trusted",
            "verify failed",
            "self signed",
            "self-signed",
            "unknown authority",
        ]
        .iter()
        .any(|needle| chain.contains(needle))
}

#[cfg(test)]
mod tests {
    use std::io;

    use reqwest::{Method, StatusCode};

    use super::{Error, TransportError, TransportErrorKind};

    fn kind_of(message: &str) -> TransportErrorKind {
        TransportError::classify(io::Error::new(io::ErrorKind::Other, message.to_owned())).kind()
    }

    #[test]
    fn classifies_terminal_messages() {
        assert_eq!(
            kind_of("error following redirect: stopped after 10 redirects"),
            TransportErrorKind::RedirectLimit
        );
        assert_eq!(
            kind_of("builder error: URL scheme is not allowed"),
            TransportErrorKind::UnsupportedScheme
        );
        assert_eq!(
            kind_of("invalid peer certificate: UnknownIssuer"),
            TransportErrorKind::UntrustedCertificate
        );
        assert!(kind_of("x509: certificate signed by unknown authority").is_terminal());
    }

    #[test]
    fn classifies_transient_messages() {
        assert_eq!(kind_of("operation timed out"), TransportErrorKind::Timeout);
        assert_eq!(
            kind_of("tcp connect error: Connection refused"),
            TransportErrorKind::Connect
        );
        assert_eq!(kind_of("connection reset by peer"), TransportErrorKind::Other);
        assert!(!kind_of("connection reset by peer").is_terminal());
    }

    #[test]
    fn gave_up_message_includes_cause_when_present() {
        let bare = Error::GaveUp {
            method: Method::GET,
            url: "http://api.test/items".to_owned(),
            attempts: 4,
            cause: None,
        };
        assert_eq!(
            bare.to_string(),
            "GET http://api.test/items giving up after 4 attempt(s)"
        );

        let wrapped = Error::GaveUp {
            method: Method::POST,
            url: "http://api.test/items".to_owned(),
            attempts: 2,
            cause: Some(Box::new(Error::UnexpectedStatus(
                StatusCode::SERVICE_UNAVAILABLE,
            ))),
        };
        assert_eq!(
            wrapped.to_string(),
            "POST http://api.test/items giving up after 2 attempt(s): \
             unexpected HTTP status 503 Service Unavailable"
        );
        assert_eq!(wrapped.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert!(wrapped.is_exhausted());
    }
}
