use std::sync::Arc;

use reqwest::{Response, StatusCode};

use crate::{CancelToken, Error};

/// Decides whether an attempt's outcome warrants another attempt.
///
/// Receives the request's cancel token, the response if one was obtained, and
/// the error if one occurred. Both are present when a response handler
/// rejected a response.
pub type RetryPolicy =
    Arc<dyn Fn(&CancelToken, Option<&Response>, Option<&Error>) -> RetryDecision + Send + Sync>;

/// Outcome of a [`RetryPolicy`].
///
/// `retry == false` together with an error ends the call with that error.
#[derive(Clone, Debug)]
pub struct RetryDecision {
    pub retry: bool,
    pub error: Option<Error>,
}

impl RetryDecision {
    pub fn retry() -> Self {
        Self {
            retry: true,
            error: None,
        }
    }

    /// Retries, remembering `error` in case the attempt budget runs out.
    pub fn retry_with(error: Error) -> Self {
        Self {
            retry: true,
            error: Some(error),
        }
    }

    pub fn stop() -> Self {
        Self {
            retry: false,
            error: None,
        }
    }

    pub fn stop_with(error: Error) -> Self {
        Self {
            retry: false,
            error: Some(error),
        }
    }
}

/// Default classification of an attempt.
///
/// - a fired cancel token stops with [`Error::Cancelled`];
/// - redirect-limit, unsupported-scheme and untrusted-certificate transport
///   errors stop with the original error; any other error retries;
/// - 429 retries; 0 and 5xx other than 501 retry with
///   [`Error::UnexpectedStatus`]; anything else is handed back as-is.
pub fn default_retry_policy(
    cancel: &CancelToken,
    response: Option<&Response>,
    error: Option<&Error>,
) -> RetryDecision {
    if let Some(reason) = cancel.reason() {
        return RetryDecision::stop_with(Error::Cancelled(reason));
    }

    if let Some(error) = error {
        return match error {
            Error::Cancelled(_) => RetryDecision::stop_with(error.clone()),
            Error::Transport(transport) if transport.kind().is_terminal() => {
                RetryDecision::stop_with(error.clone())
            }
            _ => RetryDecision::retry(),
        };
    }

    match response {
        Some(response) => classify_status(response.status()),
        None => RetryDecision::stop(),
    }
}

fn classify_status(status: StatusCode) -> RetryDecision {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return RetryDecision::retry();
    }
    let code = status.as_u16();
    if code == 0 || (status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED) {
        return RetryDecision::retry_with(Error::UnexpectedStatus(status));
    }
    RetryDecision::stop()
}

#[cfg(test)]
mod tests {
    use std::io;

    use reqwest::{Response, StatusCode};

    use super::default_retry_policy;
    use crate::{CancelReason, CancelToken, Error, TransportError, TransportErrorKind};

    fn response(status: u16) -> Response {
        Response::from(
            http::Response::builder()
                .status(status)
                .body("")
                .expect("response must build"),
        )
    }

    fn transport(kind: TransportErrorKind) -> Error {
        Error::Transport(TransportError::new(
            kind,
            io::Error::new(io::ErrorKind::Other, format!("{kind} failure")),
        ))
    }

    #[test]
    fn cancelled_token_stops_before_anything_else() {
        let cancel = CancelToken::new();
        cancel.cancel();

        let decision = default_retry_policy(&cancel, Some(&response(503)), None);
        assert!(!decision.retry);
        assert!(matches!(
            decision.error,
            Some(Error::Cancelled(CancelReason::Cancelled))
        ));
    }

    #[test]
    fn terminal_transport_errors_stop_verbatim() {
        let cancel = CancelToken::new();
        for kind in [
            TransportErrorKind::RedirectLimit,
            TransportErrorKind::UnsupportedScheme,
            TransportErrorKind::UntrustedCertificate,
        ] {
            let decision = default_retry_policy(&cancel, None, Some(&transport(kind)));
            assert!(!decision.retry);
            assert_eq!(
                decision.error.and_then(|err| err.transport_kind()),
                Some(kind)
            );
        }
    }

    #[test]
    fn other_errors_retry_without_classification() {
        let cancel = CancelToken::new();
        for kind in [
            TransportErrorKind::Timeout,
            TransportErrorKind::Connect,
            TransportErrorKind::Other,
        ] {
            let decision = default_retry_policy(&cancel, None, Some(&transport(kind)));
            assert!(decision.retry);
            assert!(decision.error.is_none());
        }

        let handler_failure = Error::handler("missing id".into());
        let decision = default_retry_policy(&cancel, Some(&response(200)), Some(&handler_failure));
        assert!(decision.retry);
    }

    #[test]
    fn throttling_retries_without_error() {
        let decision = default_retry_policy(&CancelToken::new(), Some(&response(429)), None);
        assert!(decision.retry);
        assert!(decision.error.is_none());
    }

    #[test]
    fn server_errors_retry_with_status_except_501() {
        let cancel = CancelToken::new();
        for status in [500, 502, 503, 504, 599] {
            let decision = default_retry_policy(&cancel, Some(&response(status)), None);
            assert!(decision.retry, "status {status}");
            assert_eq!(
                decision.error.and_then(|err| err.status()),
                StatusCode::from_u16(status).ok()
            );
        }

        let decision = default_retry_policy(&cancel, Some(&response(501)), None);
        assert!(!decision.retry);
        assert!(decision.error.is_none());
    }

    #[test]
    fn ordinary_statuses_pass_through() {
        let cancel = CancelToken::new();
        for status in [200, 201, 204, 301, 400, 401, 404, 409] {
            let decision = default_retry_policy(&cancel, Some(&response(status)), None);
            assert!(!decision.retry, "status {status}");
            assert!(decision.error.is_none());
        }
    }
}
