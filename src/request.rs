//! Request descriptions and their builder.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, HOST};
use http::{HeaderMap, Method};
use rustls::ClientConfig;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::codec::{self, CodecError};
use crate::context::Context;
use crate::dispatch::{Dispatch, TlsOptions};
use crate::header::ContentType;
use crate::middleware::{self, Chain, Middleware};
use crate::response::Response;
use crate::transport::Transport;
use crate::values::Values;
use crate::Error;

type ErasedBody = Box<dyn erased_serde::Serialize + Send + Sync>;

/// An outbound request, as seen by middleware.
///
/// Requests are created with [`Request::builder`] or one of the method
/// shortcuts ([`Request::get`], [`Request::post`], ...), and executed with
/// [`RequestBuilder::send`] or [`Request::send`]. Middleware receive the request
/// through the [`Context`] and may rewrite any part of it before dispatch.
///
/// The URL is stored without its query: a query string in the URL is folded
/// into [`Request::queries`] when the URL is set, and re-encoded at dispatch.
pub struct Request {
    method: Method,
    url: String,
    headers: HeaderMap,
    queries: Values,
    body: Option<ErasedBody>,
    content_type: Option<ContentType>,
    timeout: Option<Duration>,
    retry: usize,
    tls: TlsOptions,
    credentials: Option<(String, String)>,
    middleware: Vec<Arc<dyn Middleware>>,
    cancellation: CancellationToken,
    transport: Option<Arc<dyn Transport>>,
}

impl Request {
    /// Create a request for `method` and `url` with default options.
    pub fn new(method: Method, url: &str) -> Self {
        let mut request = Request {
            method,
            url: String::new(),
            headers: HeaderMap::new(),
            queries: Values::new(),
            body: None,
            content_type: None,
            timeout: None,
            retry: 0,
            tls: TlsOptions::default(),
            credentials: None,
            middleware: Vec::new(),
            cancellation: CancellationToken::new(),
            transport: None,
        };
        request.set_url(url);
        request
    }

    /// Start building a `GET` request with no URL.
    pub fn builder() -> RequestBuilder {
        RequestBuilder::new()
    }

    /// Start building a `GET` request.
    pub fn get(url: &str) -> RequestBuilder {
        RequestBuilder::new().method(Method::GET).url(url)
    }

    /// Start building a `POST` request.
    pub fn post(url: &str) -> RequestBuilder {
        RequestBuilder::new().method(Method::POST).url(url)
    }

    /// Start building a `HEAD` request.
    pub fn head(url: &str) -> RequestBuilder {
        RequestBuilder::new().method(Method::HEAD).url(url)
    }

    /// Start building a `PUT` request.
    pub fn put(url: &str) -> RequestBuilder {
        RequestBuilder::new().method(Method::PUT).url(url)
    }

    /// Start building an `UPDATE` request.
    pub fn update(url: &str) -> RequestBuilder {
        RequestBuilder::new().method("UPDATE").url(url)
    }

    /// Start building a `DELETE` request.
    pub fn delete(url: &str) -> RequestBuilder {
        RequestBuilder::new().method(Method::DELETE).url(url)
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Mutable access to the request method.
    pub fn method_mut(&mut self) -> &mut Method {
        &mut self.method
    }

    /// The target URL, without its query string.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Replace the target URL.
    ///
    /// Any query string is appended to the query parameters, and any
    /// fragment is dropped.
    pub fn set_url(&mut self, url: &str) {
        let url = url.trim();
        let url = url.split_once('#').map_or(url, |(url, _)| url);
        match url.split_once('?') {
            Some((base, query)) => {
                self.queries.extend(Values::parse(query).into_iter().flat_map(
                    |(key, values)| values.into_iter().map(move |value| (key.clone(), value)),
                ));
                self.url = base.to_owned();
            }
            None => self.url = url.to_owned(),
        }
    }

    /// Returns true if the URL uses the `https` scheme.
    pub fn is_https(&self) -> bool {
        self.url
            .split_once("://")
            .is_some_and(|(scheme, _)| scheme.eq_ignore_ascii_case("https"))
    }

    /// The host the request is addressed to.
    ///
    /// This is the `Host` header if one is set, or the authority of the URL
    /// (including any non-default port).
    pub fn host(&self) -> Option<String> {
        if let Some(host) = self.headers.get(HOST).and_then(|value| value.to_str().ok()) {
            return Some(host.to_owned());
        }

        let url = url::Url::parse(&self.url).ok()?;
        let host = url.host_str()?;
        Some(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        })
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the request headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Set a header, replacing any existing values for that name.
    pub fn set_header<K, V>(&mut self, name: K, value: V) -> Result<(), Error>
    where
        K: TryInto<HeaderName>,
        K::Error: Into<http::Error>,
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        let name = name.try_into().map_err(Into::into)?;
        let value = value.try_into().map_err(Into::into)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// The query parameters.
    pub fn queries(&self) -> &Values {
        &self.queries
    }

    /// Mutable access to the query parameters.
    pub fn queries_mut(&mut self) -> &mut Values {
        &mut self.queries
    }

    /// The declared body content type, if any.
    pub fn content_type(&self) -> Option<&ContentType> {
        self.content_type.as_ref()
    }

    /// Declare the body content type.
    pub fn set_content_type(&mut self, content_type: ContentType) {
        self.content_type = Some(content_type);
    }

    /// Returns true if a body value is set.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Replace the body value.
    pub fn set_body<T>(&mut self, body: T)
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.body = Some(Box::new(body));
    }

    /// The body encoded with the codec for the declared content type.
    ///
    /// A request without a body encodes to no bytes.
    pub fn body_bytes(&self) -> Result<Bytes, CodecError> {
        let Some(body) = &self.body else {
            return Ok(Bytes::new());
        };

        let media_type = self
            .content_type
            .as_ref()
            .map_or(crate::header::DEFAULT_MEDIA_TYPE, ContentType::media_type);
        codec::resolve(media_type).marshal(&**body)
    }

    /// Timeout for each transport attempt.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Number of transport attempts. `0` and `1` both mean a single attempt.
    pub fn retry(&self) -> usize {
        self.retry
    }

    /// TLS options for `https` URLs.
    pub fn tls(&self) -> &TlsOptions {
        &self.tls
    }

    /// Basic auth credentials applied by the transport.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.credentials
            .as_ref()
            .map(|(username, password)| (username.as_str(), password.as_str()))
    }

    /// Middleware attached to this request, in execution order.
    pub fn middleware(&self) -> &[Arc<dyn Middleware>] {
        &self.middleware
    }

    /// The token which cancels this request.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Execute the request through its middleware chain and dispatch.
    ///
    /// The chain runs every attached middleware in order, then the dispatch
    /// unit. The response is whatever the chain left in the context.
    #[tracing::instrument(skip_all, fields(method = %self.method, url = %self.url))]
    pub async fn send(mut self) -> Result<Response, Error> {
        let dispatch: Arc<dyn Middleware> = match self.transport.take() {
            Some(transport) => Arc::new(Dispatch::new(transport)),
            None => middleware::create(Dispatch::NAME, &[])?,
        };

        let mut units = std::mem::take(&mut self.middleware);
        units.push(dispatch);
        let chain = Chain::new(units);
        tracing::trace!(?chain, "starting middleware chain");

        let cancellation = self.cancellation.clone();
        let mut ctx = Context::new(self, cancellation);
        chain.start(&mut ctx).await?;
        ctx.into_response().ok_or(Error::NoResponse)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("queries", &self.queries)
            .field("body", &self.body.is_some())
            .field("content_type", &self.content_type)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("tls", &self.tls)
            .field("middleware", &self.middleware)
            .field("transport", &self.transport)
            .finish()
    }
}

/// Fluent builder for a [`Request`].
///
/// Errors from invalid header names or values are held until
/// [`RequestBuilder::build`] or [`RequestBuilder::send`].
#[derive(Debug)]
#[must_use = "a request is only sent by `RequestBuilder::send`"]
pub struct RequestBuilder {
    inner: Result<Request, Error>,
}

impl RequestBuilder {
    /// A `GET` request with no URL.
    pub fn new() -> Self {
        Self {
            inner: Ok(Request::new(Method::GET, "")),
        }
    }

    fn and_then<F>(self, f: F) -> Self
    where
        F: FnOnce(Request) -> Result<Request, Error>,
    {
        Self {
            inner: self.inner.and_then(f),
        }
    }

    fn map<F>(self, f: F) -> Self
    where
        F: FnOnce(&mut Request),
    {
        self.and_then(|mut request| {
            f(&mut request);
            Ok(request)
        })
    }

    /// Set the method.
    pub fn method<M>(self, method: M) -> Self
    where
        M: TryInto<Method>,
        M::Error: Into<http::Error>,
    {
        self.and_then(|mut request| {
            request.method = method.try_into().map_err(Into::into)?;
            Ok(request)
        })
    }

    /// Set the URL, folding any query string into the query parameters.
    pub fn url(self, url: &str) -> Self {
        self.map(|request| request.set_url(url))
    }

    /// Append a header value.
    pub fn header<K, V>(self, name: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        K::Error: Into<http::Error>,
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        self.and_then(|mut request| {
            let name = name.try_into().map_err(Into::into)?;
            let value = value.try_into().map_err(Into::into)?;
            request.headers.append(name, value);
            Ok(request)
        })
    }

    /// Append every header in `headers`.
    pub fn headers(self, headers: HeaderMap) -> Self {
        self.map(|request| {
            let mut name = None;
            for (key, value) in headers {
                if key.is_some() {
                    name = key;
                }
                if let Some(name) = &name {
                    request.headers.append(name.clone(), value);
                }
            }
        })
    }

    /// Append a query parameter.
    pub fn query(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.map(|request| request.queries.append(key, value))
    }

    /// Append several query parameters.
    pub fn queries<I, K, V>(self, queries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.map(|request| request.queries.extend(queries))
    }

    /// Set the body value, encoded at dispatch according to the content type.
    pub fn body<T>(self, body: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.map(|request| request.set_body(body))
    }

    /// Declare the body content type, e.g. `application/json`.
    pub fn content_type(self, content_type: &str) -> Self {
        self.map(|request| request.content_type = Some(ContentType::parse(content_type)))
    }

    /// Limit each transport attempt to `timeout`.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.map(|request| request.timeout = Some(timeout))
    }

    /// Make up to `attempts` transport attempts.
    pub fn retry(self, attempts: usize) -> Self {
        self.map(|request| request.retry = attempts)
    }

    /// Skip server certificate verification for `https` URLs.
    pub fn insecure_skip_verify(self, skip: bool) -> Self {
        self.map(|request| request.tls.insecure_skip_verify = skip)
    }

    /// Start from `config` for `https` URLs.
    ///
    /// A CA file or client certificate set on the request is still loaded and
    /// applied on top of it. `insecure_skip_verify` is ignored.
    pub fn tls_config(self, config: Arc<ClientConfig>) -> Self {
        self.map(|request| request.tls.config = Some(config))
    }

    /// Trust only the certificates in the PEM file at `path`.
    pub fn ca(self, path: impl Into<PathBuf>) -> Self {
        self.map(|request| request.tls.ca = Some(path.into()))
    }

    /// Present the client certificate chain and private key in these PEM files.
    pub fn cert(self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.map(|request| {
            request.tls.cert = Some(cert.into());
            request.tls.key = Some(key.into());
        })
    }

    /// Authenticate with HTTP basic auth at dispatch.
    ///
    /// This is applied after every middleware has run, so it replaces any
    /// `Authorization` header they set.
    pub fn basic_auth(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.map(|request| request.credentials = Some((username.into(), password.into())))
    }

    /// Attach a middleware unit. Units run in the order they are attached.
    pub fn middleware(self, middleware: Arc<dyn Middleware>) -> Self {
        self.map(|request| request.middleware.push(middleware))
    }

    /// Cancel the request when `token` is cancelled.
    pub fn cancellation(self, token: CancellationToken) -> Self {
        self.map(|request| request.cancellation = token)
    }

    /// Dispatch through `transport` instead of the default HTTP transport.
    pub fn transport(self, transport: Arc<dyn Transport>) -> Self {
        self.map(|request| request.transport = Some(transport))
    }

    /// Finish building, returning the first error encountered.
    pub fn build(self) -> Result<Request, Error> {
        self.inner
    }

    /// Build and execute the request.
    pub async fn send(self) -> Result<Response, Error> {
        self.build()?.send().await
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Request: Send, Sync);
    assert_impl_all!(RequestBuilder: Send);

    #[test]
    fn url_query_is_folded_into_queries() {
        let request = Request::get("http://example.com/search?q=rust&page=1#top")
            .query("page", "2")
            .build()
            .unwrap();

        assert_eq!(request.url(), "http://example.com/search");
        assert_eq!(request.queries().get_all("page"), ["1", "2"]);
        assert_eq!(request.queries().encode(), "page=1&page=2&q=rust");
    }

    #[test]
    fn method_shortcuts() {
        let cases = [
            (Request::get("http://h"), "GET"),
            (Request::post("http://h"), "POST"),
            (Request::head("http://h"), "HEAD"),
            (Request::put("http://h"), "PUT"),
            (Request::update("http://h"), "UPDATE"),
            (Request::delete("http://h"), "DELETE"),
        ];
        for (builder, method) in cases {
            assert_eq!(builder.build().unwrap().method().as_str(), method);
        }
    }

    #[test]
    fn headers_append() {
        let request = Request::get("http://example.com")
            .header("x-tag", "a")
            .header("x-tag", "b")
            .build()
            .unwrap();
        assert_eq!(request.headers().get_all("x-tag").iter().count(), 2);
    }

    #[test]
    fn invalid_header_is_reported_on_build() {
        let error = Request::get("http://example.com")
            .header("bad header", "value")
            .query("still", "chained")
            .build()
            .unwrap_err();
        assert!(matches!(error, Error::Request(_)));
    }

    #[test]
    fn host_prefers_header() {
        let request = Request::get("https://example.com:8443/path").build().unwrap();
        assert_eq!(request.host().as_deref(), Some("example.com:8443"));
        assert!(request.is_https());

        let request = Request::get("https://example.com:443/path")
            .header(HOST, "other.example.com")
            .build()
            .unwrap();
        assert_eq!(request.host().as_deref(), Some("other.example.com"));

        let request = Request::get("http://example.com:80").build().unwrap();
        assert_eq!(request.host().as_deref(), Some("example.com"));
        assert!(!request.is_https());
    }

    #[test]
    fn body_bytes_uses_declared_content_type() {
        let mut body = BTreeMap::new();
        body.insert("name", "courier");

        let request = Request::post("http://example.com")
            .content_type("application/json; charset=utf-8")
            .body(body.clone())
            .build()
            .unwrap();
        assert_eq!(&*request.body_bytes().unwrap(), br#"{"name":"courier"}"#);

        let request = Request::post("http://example.com")
            .content_type("application/x-www-form-urlencoded")
            .body(body)
            .build()
            .unwrap();
        assert_eq!(&*request.body_bytes().unwrap(), b"name=courier");

        let request = Request::post("http://example.com")
            .body("Hello World")
            .build()
            .unwrap();
        assert_eq!(&*request.body_bytes().unwrap(), b"Hello World");

        let request = Request::get("http://example.com").build().unwrap();
        assert!(request.body_bytes().unwrap().is_empty());
    }

    #[test]
    fn builder_options() {
        let request = Request::get("https://example.com")
            .timeout(Duration::from_secs(3))
            .retry(4)
            .insecure_skip_verify(true)
            .basic_auth("user", "pass")
            .cert("cert.pem", "key.pem")
            .build()
            .unwrap();

        assert_eq!(request.timeout(), Some(Duration::from_secs(3)));
        assert_eq!(request.retry(), 4);
        assert!(request.tls().insecure_skip_verify);
        assert_eq!(request.credentials(), Some(("user", "pass")));
        assert_eq!(request.tls().key.as_deref(), Some(std::path::Path::new("key.pem")));
    }
}
