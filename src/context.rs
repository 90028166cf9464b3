//! Per-request state shared by the middleware chain.

use http::Extensions;
use tokio_util::sync::CancellationToken;

use crate::request::Request;
use crate::response::Response;

/// The mutable state a request carries through its middleware chain.
///
/// A context is created by [`Request::send`] and handed to each unit in turn.
/// Units may rewrite the request before calling their continuation, and
/// inspect or alter the response after it returns. [`Extensions`] let units
/// leave typed values for each other.
#[derive(Debug)]
pub struct Context {
    request: Request,
    response: Option<Response>,
    cancellation: CancellationToken,
    extensions: Extensions,
}

impl Context {
    /// Create a context for `request`, observing `cancellation`.
    pub fn new(request: Request, cancellation: CancellationToken) -> Self {
        Self {
            request,
            response: None,
            cancellation,
            extensions: Extensions::new(),
        }
    }

    /// The request being executed.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Mutable access to the request, for units which run before dispatch.
    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// The response, once a unit has produced one.
    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// Mutable access to the response, once a unit has produced one.
    pub fn response_mut(&mut self) -> Option<&mut Response> {
        self.response.as_mut()
    }

    /// Record the response, replacing any earlier one.
    pub fn set_response(&mut self, response: Response) {
        self.response = Some(response);
    }

    /// Remove and return the response.
    pub fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }

    /// Consume the context, returning the response if one was produced.
    pub fn into_response(self) -> Option<Response> {
        self.response
    }

    /// The token which cancels this request.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns true once the request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Typed values shared between units.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Mutable access to the typed values shared between units.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}
