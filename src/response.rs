//! Responses and their retained bodies.

use std::fmt;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::codec::{self, CodecError};

/// A fully read response body, with the content type it was declared with.
///
/// The body can be decoded any number of times, into different types.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Body {
    data: Bytes,
    content_type: String,
}

impl Body {
    /// Create a body from raw bytes and a `Content-Type` value.
    pub fn new(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
        }
    }

    /// Decode the body with the codec registered for its content type.
    ///
    /// Unknown or missing content types decode as text.
    pub fn unmarshal<T>(&self) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        codec::unmarshal(&self.content_type, &self.data)
    }

    /// The body as text, replacing invalid UTF-8 sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// The raw body bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// A cheap clone of the raw body bytes.
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// The declared `Content-Type`, or an empty string.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Length of the body in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true for an empty body.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("content_type", &self.content_type)
            .field("len", &self.data.len())
            .finish()
    }
}

fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned()
}

/// The result of executing a request.
///
/// Headers may be annotated by middleware as the chain unwinds. The
/// transport-level request and response heads are kept for inspection.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
    request: Option<http::Request<()>>,
    response: http::Response<()>,
}

impl Response {
    /// Build a response from an `http` response, with no transport request.
    ///
    /// Middleware use this to answer a request without dispatching it.
    pub fn new(response: http::Response<Bytes>) -> Self {
        Self::from_parts(None, response)
    }

    pub(crate) fn from_transport(request: http::Request<()>, response: http::Response<Bytes>) -> Self {
        Self::from_parts(Some(request), response)
    }

    fn from_parts(request: Option<http::Request<()>>, response: http::Response<Bytes>) -> Self {
        let (parts, data) = response.into_parts();
        let body = Body::new(data, content_type(&parts.headers));
        let status = parts.status;
        let headers = parts.headers.clone();

        Self {
            status,
            headers,
            body,
            request,
            response: http::Response::from_parts(parts, ()),
        }
    }

    /// The status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The status line text, such as `200 OK`.
    pub fn status_text(&self) -> String {
        match self.status.canonical_reason() {
            Some(reason) => format!("{} {}", self.status.as_u16(), reason),
            None => self.status.as_u16().to_string(),
        }
    }

    /// Returns true if the status is exactly `200 OK`.
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the response headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The response body.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Decode the body, see [`Body::unmarshal`].
    pub fn unmarshal<T>(&self) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        self.body.unmarshal()
    }

    /// The request head as sent by the transport, if the request was dispatched.
    pub fn transport_request(&self) -> Option<&http::Request<()>> {
        self.request.as_ref()
    }

    /// The response head as received from the transport.
    ///
    /// Its headers are the ones received, before any middleware edits.
    pub fn transport_response(&self) -> &http::Response<()> {
        &self.response
    }

    /// Consume the response, returning its body.
    pub fn into_body(self) -> Body {
        self.body
    }
}
