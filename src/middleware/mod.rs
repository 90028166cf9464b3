//! Composable request middleware.
//!
//! A [`Middleware`] unit receives the request [`Context`] and a [`Next`]
//! continuation. Work done before running the continuation happens on the way
//! out to the network; work done after it returns sees the response on the way
//! back. Not running the continuation short-circuits every unit after this one,
//! including dispatch.
//!
//! ```
//! use courier::middleware::{self, Middleware};
//!
//! let tag = middleware::from_fn("tag", |ctx, next| {
//!     Box::pin(async move {
//!         ctx.request_mut().set_header("x-tag", "courier")?;
//!         next.run(ctx).await
//!     })
//! });
//! assert_eq!(tag.name(), "tag");
//! ```
//!
//! Units can also be created by name from the process-wide factory registry,
//! see [`create`] and [`register_factory`].

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::context::Context;
use crate::Error;

mod basic_auth;
mod debug;
mod factory;
mod signed_auth;
mod timing;

pub use self::basic_auth::BasicAuth;
pub(crate) use self::basic_auth::basic_auth_header;
pub use self::debug::{DebugRequest, Observer};
pub use self::factory::{create, register_factory, Arg, ArgumentError, Factory};
pub use self::signed_auth::{SignatureDigest, SignedAuth};
pub use self::timing::{RequestTime, Timing, DURATION_HEADER};

/// A named unit in a request's middleware chain.
pub trait Middleware: Send + Sync + 'static {
    /// Name of this unit, used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Process the request, usually by running `next` at some point.
    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>)
        -> BoxFuture<'a, Result<(), Error>>;
}

impl fmt::Debug for dyn Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Middleware").field(&self.name()).finish()
    }
}

/// The continuation of a middleware chain.
///
/// Running it consumes it, so the rest of the chain runs at most once per unit.
/// Dropping it without running it short-circuits the chain.
#[must_use = "the rest of the chain only runs if `Next::run` is awaited"]
pub struct Next<'a> {
    chain: &'a Chain,
    index: usize,
}

impl<'a> Next<'a> {
    /// Run the remaining units against `ctx`.
    pub fn run<'b>(self, ctx: &'b mut Context) -> BoxFuture<'b, Result<(), Error>>
    where
        'a: 'b,
    {
        self.chain.run_at(self.index, ctx)
    }

    /// Number of units left to run, including the terminal one.
    pub fn remaining(&self) -> usize {
        self.chain.len().saturating_sub(self.index)
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// An ordered list of middleware units, executed with continuation passing.
#[derive(Clone, Default)]
pub struct Chain {
    units: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    /// Create a chain which runs `units` in order.
    pub fn new(units: Vec<Arc<dyn Middleware>>) -> Self {
        Self { units }
    }

    /// Number of units in the chain.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true if the chain has no units.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Names of the units, in execution order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.units.iter().map(|unit| unit.name())
    }

    /// Run the chain from its first unit.
    pub fn start<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<(), Error>> {
        self.run_at(0, ctx)
    }

    fn run_at<'a>(&'a self, index: usize, ctx: &'a mut Context) -> BoxFuture<'a, Result<(), Error>> {
        match self.units.get(index) {
            Some(unit) => {
                tracing::trace!(middleware = unit.name(), index, "entering middleware");
                unit.handle(
                    ctx,
                    Next {
                        chain: self,
                        index: index + 1,
                    },
                )
            }
            None => Box::pin(async { Ok(()) }),
        }
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl FromIterator<Arc<dyn Middleware>> for Chain {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Middleware>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Middleware built from a closure, see [`from_fn`].
pub struct FromFn<F> {
    name: String,
    f: F,
}

impl<F> fmt::Debug for FromFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FromFn").field("name", &self.name).finish()
    }
}

impl<F> Middleware for FromFn<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Result<(), Error>>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<(), Error>> {
        (self.f)(ctx, next)
    }
}

/// Create a middleware unit from a closure returning a boxed future.
pub fn from_fn<F>(name: impl Into<String>, f: F) -> FromFn<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Result<(), Error>>
        + Send
        + Sync
        + 'static,
{
    FromFn {
        name: name.into(),
        f,
    }
}
