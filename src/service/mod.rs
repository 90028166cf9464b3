//! Tower plumbing around a [`Transport`].
//!
//! Dispatch drives each request through
//! `Retry<Attempts, Timeout<TransportService, TransportError>>`: every attempt
//! is individually bounded by the request timeout, and failed attempts are
//! retried according to [`Attempts`].

use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::future::BoxFuture;

use crate::transport::{Transport, TransportError, TransportRequest};

mod retry;
mod timeout;

pub use self::retry::{Attempts, Retry, RetryLayer};
pub use self::timeout::{Timeout, TimeoutLayer};
pub use tower::{Service, ServiceBuilder, ServiceExt};

/// A [`tower::Service`] which executes requests with a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportService {
    transport: Arc<dyn Transport>,
}

impl TransportService {
    /// Wrap `transport` as a service.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl tower::Service<TransportRequest> for TransportService {
    type Response = http::Response<Bytes>;
    type Error = TransportError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: TransportRequest) -> Self::Future {
        self.transport.execute(req)
    }
}
