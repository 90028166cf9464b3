//! The network boundary.
//!
//! A [`Transport`] executes a single fully-formed HTTP request and returns the
//! fully-read response. [`HttpTransport`] is the default, speaking HTTP/1.1 over
//! TCP (with TLS for `https`). A scripted [`MockTransport`] is available with
//! the `mocks` feature.

use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use rustls::ClientConfig;
use thiserror::Error;

use crate::BoxError;

mod tcp;
#[cfg(any(test, feature = "mocks"))]
mod mock;

pub use self::tcp::{HttpTransport, HttpTransportConfig};
#[cfg(any(test, feature = "mocks"))]
pub use self::mock::{MockReply, MockTransport};

/// Returns true if the URI scheme is presumed secure.
pub(crate) fn is_schema_secure(uri: &http::Uri) -> bool {
    uri.scheme_str().is_some_and(|scheme| {
        scheme.eq_ignore_ascii_case("https") || scheme.eq_ignore_ascii_case("wss")
    })
}

/// Executes requests against the network.
pub trait Transport: fmt::Debug + Send + Sync + 'static {
    /// Send `request` and read the whole response.
    fn execute(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<http::Response<Bytes>, TransportError>>;
}

impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    fn execute(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<http::Response<Bytes>, TransportError>> {
        (**self).execute(request)
    }
}

/// A request ready for the wire, with the TLS configuration to use for `https`.
#[derive(Debug)]
pub struct TransportRequest {
    request: http::Request<Bytes>,
    tls: Option<Arc<ClientConfig>>,
}

impl TransportRequest {
    /// Wrap a request with an optional TLS configuration.
    pub fn new(request: http::Request<Bytes>, tls: Option<Arc<ClientConfig>>) -> Self {
        Self { request, tls }
    }

    /// The request to send.
    pub fn request(&self) -> &http::Request<Bytes> {
        &self.request
    }

    /// The request URI, in absolute form.
    pub fn uri(&self) -> &http::Uri {
        self.request.uri()
    }

    /// The TLS configuration for `https` requests.
    pub fn tls(&self) -> Option<&Arc<ClientConfig>> {
        self.tls.as_ref()
    }

    /// Split into the request and TLS configuration.
    pub fn into_parts(self) -> (http::Request<Bytes>, Option<Arc<ClientConfig>>) {
        (self.request, self.tls)
    }

    /// A copy of the request head, without the body.
    pub fn head(&self) -> http::Request<()> {
        let mut head = http::Request::new(());
        *head.method_mut() = self.request.method().clone();
        *head.uri_mut() = self.request.uri().clone();
        *head.version_mut() = self.request.version();
        *head.headers_mut() = self.request.headers().clone();
        head
    }
}

impl Clone for TransportRequest {
    fn clone(&self) -> Self {
        let mut request = http::Request::new(self.request.body().clone());
        *request.method_mut() = self.request.method().clone();
        *request.uri_mut() = self.request.uri().clone();
        *request.version_mut() = self.request.version();
        *request.headers_mut() = self.request.headers().clone();

        Self {
            request,
            tls: self.tls.clone(),
        }
    }
}

/// Error raised by a [`Transport`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The URI can't be used to open a connection.
    #[error("invalid uri: {0}")]
    InvalidUri(&'static str),

    /// The TCP connection could not be established.
    #[error("connecting: {0}")]
    Connect(#[source] io::Error),

    /// The TLS handshake failed.
    #[error("tls handshake: {0}")]
    Handshake(#[source] io::Error),

    /// HTTP protocol error.
    #[error("protocol: {0}")]
    Protocol(#[from] hyper::Error),

    /// The attempt did not finish within the request timeout.
    #[error("request timed out")]
    Timeout,

    /// The request was cancelled.
    #[error("request cancelled")]
    Cancelled,

    /// Any other failure.
    #[error(transparent)]
    Other(BoxError),
}

impl TransportError {
    /// Wrap an arbitrary error.
    pub fn other<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        TransportError::Other(error.into())
    }
}
