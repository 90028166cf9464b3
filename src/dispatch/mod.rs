//! The terminal unit of every middleware chain.
//!
//! [`Dispatch`] turns the [`Request`] description into a wire request, then
//! executes it through the transport with the request's TLS, retry, timeout
//! and cancellation settings. It always runs last: [`Request::send`] appends it
//! after every attached middleware.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HOST};
use http::uri::Port;
use http::{HeaderValue, Uri};
use tower::{ServiceBuilder, ServiceExt as _};

use crate::context::Context;
use crate::middleware::{basic_auth_header, Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::service::{Attempts, RetryLayer, TimeoutLayer, TransportService};
use crate::transport::{
    is_schema_secure, HttpTransport, Transport, TransportError, TransportRequest,
};
use crate::Error;

mod tls;

pub use self::tls::{TlsError, TlsOptions};

/// Returns the port if it is not the default port for the scheme.
fn get_non_default_port(uri: &Uri) -> Option<Port<&str>> {
    match (uri.port().map(|p| p.as_u16()), is_schema_secure(uri)) {
        (Some(443), true) => None,
        (Some(80), false) => None,
        _ => uri.port(),
    }
}

/// Set the Host header from the URI authority, unless one is already set.
fn set_host_header<B>(request: &mut http::Request<B>) -> Result<(), Error> {
    let Some(hostname) = request.uri().host() else {
        tracing::debug!(uri = %request.uri(), "request uri has no host");
        return Ok(());
    };

    if request.headers().contains_key(HOST) {
        return Ok(());
    }

    let value = match get_non_default_port(request.uri()) {
        Some(port) => HeaderValue::try_from(format!("{hostname}:{port}")),
        None => HeaderValue::try_from(hostname),
    }
    .map_err(http::Error::from)?;
    request.headers_mut().insert(HOST, value);
    Ok(())
}

/// Executes requests with a [`Transport`], registered as `request_exec`.
#[derive(Debug, Clone)]
pub struct Dispatch {
    transport: Arc<dyn Transport>,
}

impl Dispatch {
    /// Registered name of this middleware.
    pub const NAME: &'static str = "request_exec";

    /// Dispatch through `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// The transport requests are sent with.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Build the wire request for `request`.
    ///
    /// This encodes the body and query, fills in the `Host`, `Content-Type`
    /// and basic auth headers, and loads TLS settings for `https` URLs.
    pub fn prepare(request: &Request) -> Result<TransportRequest, Error> {
        let body = request.body_bytes()?;

        let mut url = url::Url::parse(request.url()).map_err(Error::InvalidUrl)?;
        let query = request.queries().encode();
        url.set_query((!query.is_empty()).then_some(query.as_str()));
        let uri: Uri = url.as_str().parse().map_err(http::Error::from)?;

        let mut wire = http::Request::builder()
            .method(request.method().clone())
            .uri(uri)
            .body(body)?;
        *wire.headers_mut() = request.headers().clone();
        set_host_header(&mut wire)?;

        if request.has_body() && !wire.headers().contains_key(CONTENT_TYPE) {
            if let Some(content_type) = request.content_type() {
                let value =
                    HeaderValue::try_from(content_type.to_string()).map_err(http::Error::from)?;
                wire.headers_mut().insert(CONTENT_TYPE, value);
            }
        }

        if let Some((username, password)) = request.credentials() {
            wire.headers_mut()
                .insert(AUTHORIZATION, basic_auth_header(username, password)?);
        }

        let tls = if is_schema_secure(wire.uri()) {
            Some(request.tls().client_config()?)
        } else {
            None
        };

        Ok(TransportRequest::new(wire, tls))
    }

    #[tracing::instrument(name = "dispatch", skip_all)]
    async fn execute(&self, ctx: &mut Context) -> Result<(), Error> {
        let token = ctx.cancellation().clone();
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let request = ctx.request();
        let wire = Self::prepare(request)?;
        let head = wire.head();
        let attempts = request.retry();
        let timeout = request.timeout();
        tracing::debug!(uri = %wire.uri(), attempts, ?timeout, "dispatching request");

        let service = ServiceBuilder::new()
            .layer(RetryLayer::new(Attempts::new(attempts, token.clone())))
            .layer(TimeoutLayer::new(|| TransportError::Timeout, timeout))
            .service(TransportService::new(self.transport.clone()));

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!("request cancelled");
                return Err(Error::Cancelled);
            }
            response = service.oneshot(wire) => response?,
        };

        tracing::debug!(status = %response.status(), "received response");
        ctx.set_response(Response::from_transport(head, response));
        Ok(())
    }
}

impl Default for Dispatch {
    /// Dispatch through a default [`HttpTransport`].
    fn default() -> Self {
        Self::new(Arc::new(HttpTransport::default()))
    }
}

impl Middleware for Dispatch {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, _next: Next<'a>) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(self.execute(ctx))
    }
}
