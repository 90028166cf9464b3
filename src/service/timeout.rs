//! Per-call timeout for services, with a custom error type.
//!
//! Unlike `tower::timeout`, the timeout is optional, so a single service type
//! covers requests with and without a limit.

use std::fmt;
use std::time::Duration;

/// Layer which applies an optional timeout to each call.
pub struct TimeoutLayer<E> {
    error: fn() -> E,
    timeout: Option<Duration>,
}

impl<E> TimeoutLayer<E> {
    /// Fail calls which take longer than `timeout` with `error()`.
    ///
    /// `None` disables the timeout.
    pub fn new(error: fn() -> E, timeout: Option<Duration>) -> Self {
        Self { error, timeout }
    }
}

impl<E> Clone for TimeoutLayer<E> {
    fn clone(&self) -> Self {
        Self {
            error: self.error,
            timeout: self.timeout,
        }
    }
}

impl<E> fmt::Debug for TimeoutLayer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutLayer")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<S, E> tower::layer::Layer<S> for TimeoutLayer<E> {
    type Service = Timeout<S, E>;

    fn layer(&self, inner: S) -> Self::Service {
        Timeout::new(inner, self.timeout, self.error)
    }
}

/// Applies an optional timeout to each call of the inner service.
pub struct Timeout<S, E> {
    inner: S,
    timeout: Option<Duration>,
    error: fn() -> E,
}

impl<S, E> Timeout<S, E> {
    /// Wrap `inner`, failing calls which outlast `timeout` with `error()`.
    pub fn new(inner: S, timeout: Option<Duration>, error: fn() -> E) -> Self {
        Self {
            inner,
            timeout,
            error,
        }
    }

    /// The configured timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl<S, E> Clone for Timeout<S, E>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            timeout: self.timeout,
            error: self.error,
        }
    }
}

impl<S, E> fmt::Debug for Timeout<S, E>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeout")
            .field("inner", &self.inner)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<S, E, Req> tower::Service<Req> for Timeout<S, E>
where
    S: tower::Service<Req, Error = E>,
{
    type Response = S::Response;
    type Error = E;
    type Future = self::future::TimeoutFuture<S::Future, E>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        self::future::TimeoutFuture::new(self.inner.call(req), self.error, self.timeout)
    }
}

mod future {
    use std::future::Future;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use pin_project::pin_project;
    use tokio::time::Sleep;

    #[derive(Debug)]
    #[pin_project]
    pub struct TimeoutFuture<F, E> {
        #[pin]
        inner: F,
        error: fn() -> E,

        #[pin]
        sleep: Option<Sleep>,
    }

    impl<F, E> TimeoutFuture<F, E> {
        pub(super) fn new(inner: F, error: fn() -> E, timeout: Option<Duration>) -> Self {
            Self {
                inner,
                error,
                sleep: timeout.map(tokio::time::sleep),
            }
        }
    }

    impl<F, R, E> Future for TimeoutFuture<F, E>
    where
        F: Future<Output = Result<R, E>>,
    {
        type Output = Result<R, E>;

        fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            let this = self.project();

            if let Poll::Ready(response) = this.inner.poll(cx) {
                return Poll::Ready(response);
            }

            match this.sleep.as_pin_mut().map(|sleep| sleep.poll(cx)) {
                Some(Poll::Ready(())) => {
                    tracing::trace!("call timed out");
                    Poll::Ready(Err((this.error)()))
                }
                _ => Poll::Pending,
            }
        }
    }
}
