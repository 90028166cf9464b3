use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use http::{HeaderName, HeaderValue};

use super::{Arg, ArgumentError, Middleware, Next};
use crate::context::Context;
use crate::Error;

/// Default response header for the measured duration.
pub const DURATION_HEADER: &str = "x-courier-duration";

/// Time spent in the rest of the chain, left in the context extensions by [`Timing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestTime(pub Duration);

/// Measures the wall time of everything after it in the chain.
///
/// The elapsed time is written to a response header (`x-courier-duration` by
/// default) in the form `12.345ms`, and stored as a [`RequestTime`] extension.
#[derive(Debug, Clone)]
pub struct Timing {
    header: HeaderName,
}

impl Timing {
    /// Registered name of this middleware.
    pub const NAME: &'static str = "request_time";

    /// Record the duration in the default header.
    pub fn new() -> Self {
        Self {
            header: HeaderName::from_static(DURATION_HEADER),
        }
    }

    /// Record the duration in `header` instead.
    pub fn with_header(header: HeaderName) -> Self {
        Self { header }
    }

    /// The header the duration is written to.
    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    pub(crate) fn from_args(args: &[Arg]) -> Result<Self, Error> {
        match args {
            [] => Ok(Self::new()),
            [Arg::Str(name)] => {
                let header = HeaderName::try_from(name.as_str())
                    .map_err(|error| ArgumentError::value(Self::NAME, "header_name", error))?;
                Ok(Self::with_header(header))
            }
            [other] => Err(ArgumentError::kind(Self::NAME, "header_name", "string", other).into()),
            _ => Err(ArgumentError::arity(Self::NAME, "0 or 1", args).into()),
        }
    }
}

/// Milliseconds with microsecond precision, e.g. `0.042ms`.
fn render(elapsed: Duration) -> String {
    let micros = elapsed.as_micros();
    format!("{}.{:03}ms", micros / 1000, micros % 1000)
}

impl Default for Timing {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for Timing {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let start = Instant::now();
            let result = next.run(&mut *ctx).await;
            let elapsed = start.elapsed();

            ctx.extensions_mut().insert(RequestTime(elapsed));
            if let Some(response) = ctx.response_mut() {
                match HeaderValue::try_from(render(elapsed)) {
                    Ok(value) => {
                        response.headers_mut().insert(self.header.clone(), value);
                    }
                    Err(error) => tracing::warn!(%error, "unable to render request duration"),
                }
            }

            tracing::trace!(?elapsed, "request timed");
            result
        })
    }
}
