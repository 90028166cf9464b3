use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use super::{Arg, ArgumentError, Middleware, Next};
use crate::context::Context;
use crate::request::Request;
use crate::Error;

/// Callback which inspects a request before it is sent.
pub type Observer = Arc<dyn Fn(&Context, &Request) + Send + Sync>;

/// Hands each request to an [`Observer`] and logs it at `debug` level.
#[derive(Clone)]
pub struct DebugRequest {
    observer: Observer,
}

impl DebugRequest {
    /// Registered name of this middleware.
    pub const NAME: &'static str = "debug";

    /// Log requests without any callback.
    pub fn new() -> Self {
        Self {
            observer: Arc::new(|_: &Context, _: &Request| {}),
        }
    }

    /// Call `observer` with every request.
    pub fn with_observer<F>(observer: F) -> Self
    where
        F: Fn(&Context, &Request) + Send + Sync + 'static,
    {
        Self {
            observer: Arc::new(observer),
        }
    }

    pub(crate) fn from_args(args: &[Arg]) -> Result<Self, Error> {
        match args {
            [] => Ok(Self::new()),
            [Arg::Observer(observer)] => Ok(Self {
                observer: observer.clone(),
            }),
            [other] => Err(ArgumentError::kind(Self::NAME, "observer", "observer", other).into()),
            _ => Err(ArgumentError::arity(Self::NAME, "0 or 1", args).into()),
        }
    }
}

impl Default for DebugRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DebugRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugRequest").finish_non_exhaustive()
    }
}

impl Middleware for DebugRequest {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<(), Error>> {
        (self.observer)(&*ctx, ctx.request());
        let request = ctx.request();
        tracing::debug!(
            method = %request.method(),
            url = %request.url(),
            query = %request.queries().encode(),
            headers = ?request.headers(),
            "sending request"
        );
        next.run(ctx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::middleware::Chain;

    #[tokio::test]
    async fn observer_sees_request() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let observer: Observer = Arc::new(move |_ctx: &Context, request: &Request| {
            assert_eq!(request.url(), "http://example.com/items");
            assert_eq!(request.queries().get("page"), Some("2"));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let unit = DebugRequest::from_args(&[observer.into()]).unwrap();
        let chain = Chain::new(vec![Arc::new(unit)]);
        let mut ctx = Context::new(
            Request::new(http::Method::GET, "http://example.com/items?page=2"),
            CancellationToken::new(),
        );
        chain.start(&mut ctx).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rejects_non_observer() {
        let error = DebugRequest::from_args(&["verbose".into()]).unwrap_err();
        assert!(matches!(
            error,
            Error::Argument(ArgumentError::Type { expected: "observer", .. })
        ));
    }
}
