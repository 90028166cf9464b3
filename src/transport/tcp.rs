//! HTTP/1.1 over TCP, with TLS for `https` URIs.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::Uri;
use http_body_util::{BodyExt as _, Full};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{trace, Instrument as _};

use super::{is_schema_secure, Transport, TransportError, TransportRequest};

/// Configuration for [`HttpTransport`] connections.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct HttpTransportConfig {
    /// Limit on establishing the TCP connection. `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,

    /// Set `TCP_NODELAY` on new connections.
    pub nodelay: bool,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(10)),
            nodelay: true,
        }
    }
}

/// The default transport: one HTTP/1.1 connection per request.
///
/// `https` URIs are connected with `tokio-rustls`, using the TLS configuration
/// carried by the [`TransportRequest`].
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    config: Arc<HttpTransportConfig>,
}

impl HttpTransport {
    /// Create a transport with `config`.
    pub fn new(config: HttpTransportConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// The connection configuration.
    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }
}

impl Transport for HttpTransport {
    fn execute(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<http::Response<Bytes>, TransportError>> {
        let span = tracing::debug_span!(
            "transport",
            method = %request.request().method(),
            uri = %request.uri()
        );
        Box::pin(send(self.config.clone(), request).instrument(span))
    }
}

async fn send(
    config: Arc<HttpTransportConfig>,
    request: TransportRequest,
) -> Result<http::Response<Bytes>, TransportError> {
    let (mut request, tls) = request.into_parts();
    let (host, port) = get_host_and_port(request.uri())?;
    let secure = is_schema_secure(request.uri());

    let origin = request
        .uri()
        .path_and_query()
        .map_or("/", |path| path.as_str())
        .parse::<Uri>()
        .map_err(|_| TransportError::InvalidUri("invalid path"))?;
    *request.uri_mut() = origin;
    let request = request.map(Full::new);

    let stream = connect(&host, port, &config).await?;

    if secure {
        let tls = tls.ok_or(TransportError::InvalidUri("https without a tls configuration"))?;
        let domain = ServerName::try_from(host.to_string())
            .map_err(|_| TransportError::InvalidUri("invalid server name"))?;

        trace!(%host, "tls handshake");
        let stream = TlsConnector::from(tls)
            .connect(domain, stream)
            .await
            .map_err(TransportError::Handshake)?;
        exchange(stream, request).await
    } else {
        exchange(stream, request).await
    }
}

async fn connect(
    host: &str,
    port: u16,
    config: &HttpTransportConfig,
) -> Result<TcpStream, TransportError> {
    trace!(%host, %port, "connecting");
    let connecting = TcpStream::connect((host, port));
    let stream = match config.connect_timeout {
        Some(timeout) => tokio::time::timeout(timeout, connecting)
            .await
            .map_err(|_| {
                TransportError::Connect(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connection timed out",
                ))
            })?,
        None => connecting.await,
    }
    .map_err(TransportError::Connect)?;

    stream
        .set_nodelay(config.nodelay)
        .map_err(TransportError::Connect)?;
    trace!(peer = ?stream.peer_addr().ok(), "connected");
    Ok(stream)
}

async fn exchange<IO>(
    stream: IO,
    request: http::Request<Full<Bytes>>,
) -> Result<http::Response<Bytes>, TransportError>
where
    IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    trace!("handshake h1");
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
    tokio::spawn(async {
        if let Err(err) = conn.await {
            if err.is_user() {
                tracing::error!(%err, "h1 connection driver error");
            } else {
                tracing::debug!(%err, "h1 connection driver error");
            }
        }
    });
    trace!("handshake complete");

    let response = sender.send_request(request).await?;
    let (parts, body) = response.into_parts();
    let body = body.collect().await?.to_bytes();
    trace!(status = %parts.status, len = body.len(), "response received");

    Ok(http::Response::from_parts(parts, body))
}

fn get_host_and_port(uri: &Uri) -> Result<(Box<str>, u16), TransportError> {
    let host = uri.host().ok_or(TransportError::InvalidUri("missing host"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = match uri.port_u16() {
        Some(port) => port,
        None if is_schema_secure(uri) => 443,
        None if uri.scheme_str().is_some_and(|scheme| scheme.eq_ignore_ascii_case("http")) => 80,
        None => return Err(TransportError::InvalidUri("missing port")),
    };

    Ok((host.into(), port))
}
