use std::{fmt, sync::Arc, time::Duration};

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method, Response, Url,
};

use crate::{
    body::{materialize, ReplayableBody},
    BoxError, CancelToken, Error, RequestBody, Result,
};

/// Inspects a response the retry policy accepted.
///
/// An `Err` is fed back into the retry policy as the attempt's error.
pub type ResponseHandler =
    Arc<dyn Fn(&Response) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Outgoing request with a replayable body.
#[derive(Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<ReplayableBody>,
    timeout: Option<Duration>,
    response_handler: Option<ResponseHandler>,
    cancel: CancelToken,
}

impl Request {
    /// Parses `url` and creates a request without a body.
    pub fn new(method: Method, url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|err| Error::InvalidUrl {
            url: url.to_owned(),
            message: err.to_string(),
        })?;
        Ok(Self::from_url(method, parsed))
    }

    pub fn from_url(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            response_handler: None,
            cancel: CancelToken::new(),
        }
    }

    /// Attaches a payload, materializing it into a replayable body.
    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Result<Self> {
        self.body = Some(materialize(body.into())?);
        Ok(self)
    }

    /// Attaches a JSON-encoded payload and sets `Content-Type`.
    pub fn with_json<T: serde::Serialize + ?Sized>(self, value: &T) -> Result<Self> {
        self.with_header(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        )
        .with_body(RequestBody::json(value)?)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Per-attempt timeout, overriding the client default.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_response_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Response) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.response_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&ReplayableBody> {
        self.body.as_ref()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub(crate) fn response_handler(&self) -> Option<&ResponseHandler> {
        self.response_handler.as_ref()
    }

    /// URL with any password replaced, safe for logs and error messages.
    pub fn redacted_url(&self) -> String {
        if self.url.password().is_none() {
            return self.url.to_string();
        }
        let mut redacted = self.url.clone();
        let _ = redacted.set_password(Some("xxxxx"));
        redacted.to_string()
    }

    /// Builds the transport request for one attempt with a fresh body copy.
    pub(crate) async fn build_attempt(
        &self,
        default_timeout: Option<Duration>,
    ) -> Result<reqwest::Request> {
        let mut request = reqwest::Request::new(self.method.clone(), self.url.clone());
        *request.headers_mut() = self.headers.clone();
        *request.timeout_mut() = self.timeout.or(default_timeout);
        if let Some(body) = &self.body {
            *request.body_mut() = Some(body.open().await?.into());
        }
        Ok(request)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.redacted_url())
            .field("headers", &self.headers.len())
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .field("response_handler", &self.response_handler.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}
