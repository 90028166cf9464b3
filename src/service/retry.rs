use std::future::{ready, Ready};

use tokio_util::sync::CancellationToken;
use tower::retry::Policy;

pub use tower::retry::{Retry, RetryLayer};

use crate::transport::TransportError;

/// A policy which retries failed transport attempts a fixed number of times.
///
/// `Attempts::new(n, ..)` allows `n` attempts in total, so `0` and `1` both
/// mean the request is tried once. Successful responses are never retried,
/// regardless of status. Retrying stops as soon as the cancellation token is
/// cancelled.
#[derive(Debug, Clone)]
pub struct Attempts {
    remaining: usize,
    cancellation: CancellationToken,
}

impl Attempts {
    /// Create a policy allowing `attempts` attempts in total.
    pub fn new(attempts: usize, cancellation: CancellationToken) -> Self {
        Self {
            remaining: attempts.saturating_sub(1),
            cancellation,
        }
    }

    /// Retries left after the current attempt.
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl<Req, Res> Policy<Req, Res, TransportError> for Attempts
where
    Req: Clone,
{
    type Future = Ready<()>;

    fn retry(
        &mut self,
        _req: &mut Req,
        result: &mut Result<Res, TransportError>,
    ) -> Option<Self::Future> {
        match result {
            Ok(_) => None,
            Err(TransportError::Cancelled) => None,
            Err(_) if self.cancellation.is_cancelled() => None,
            Err(error) if self.remaining > 0 => {
                self.remaining -= 1;
                tracing::debug!(%error, remaining = self.remaining, "retrying request");
                Some(ready(()))
            }
            Err(error) => {
                tracing::debug!(%error, "out of attempts");
                None
            }
        }
    }

    fn clone_request(&mut self, req: &Req) -> Option<Req> {
        Some(req.clone())
    }
}
