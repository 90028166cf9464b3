use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use courier::dispatch::TlsError;
use courier::transport::TransportError;
use courier::{Error, Request};
use http_body_util::{BodyExt as _, Full};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::ServerConfig;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

fn minica(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/minica")
        .join(path)
}

fn provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn tls_root_store() -> rustls::RootCertStore {
    let mut root_store = rustls::RootCertStore::empty();
    let (_, cert) = pem_rfc7468::decode_vec(include_bytes!("minica/minica.pem")).unwrap();
    root_store.add(CertificateDer::from(cert)).unwrap();
    root_store
}

fn tls_config(client_auth: bool) -> ServerConfig {
    let (_, cert) = pem_rfc7468::decode_vec(include_bytes!("minica/localhost/cert.pem")).unwrap();
    let (label, key) =
        pem_rfc7468::decode_vec(include_bytes!("minica/localhost/key.pem")).unwrap();

    let cert = CertificateDer::from(cert);
    let key = match label {
        "PRIVATE KEY" => PrivateKeyDer::Pkcs8(key.into()),
        "RSA PRIVATE KEY" => PrivateKeyDer::Pkcs1(key.into()),
        "EC PRIVATE KEY" => PrivateKeyDer::Sec1(key.into()),
        _ => panic!("unknown key type"),
    };

    let builder = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .unwrap();
    let builder = if client_auth {
        let verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(tls_root_store()), provider())
                .build()
                .unwrap();
        builder.with_client_cert_verifier(verifier)
    } else {
        builder.with_no_client_auth()
    };

    let mut cfg = builder.with_single_cert(vec![cert], key).unwrap();
    cfg.alpn_protocols.push(b"http/1.1".to_vec());
    cfg
}

async fn echo(req: http::Request<Incoming>) -> Result<http::Response<Full<Bytes>>, BoxError> {
    tracing::trace!("processing request");
    let data = req.into_body().collect().await?.to_bytes();
    Ok(http::Response::new(Full::new(data)))
}

async fn serve(client_auth: bool) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(tls_config(client_auth)));

    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let stream = match acceptor.accept(stream).await {
                    Ok(stream) => stream,
                    Err(error) => {
                        tracing::debug!(%error, "tls accept failed");
                        return;
                    }
                };
                if let Err(error) = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), hyper::service::service_fn(echo))
                    .await
                {
                    tracing::debug!(%error, "tls connection failed");
                }
            });
        }
    });

    (addr, handle)
}

fn url(addr: SocketAddr) -> String {
    format!("https://localhost:{}/", addr.port())
}

#[tokio::test]
async fn untrusted_server_is_rejected() {
    let _ = tracing_subscriber::fmt::try_init();
    let (addr, server) = serve(false).await;

    let error = Request::get(&url(addr)).send().await.unwrap_err();
    assert!(
        matches!(error, Error::Transport(TransportError::Handshake(_))),
        "unexpected error: {error:?}"
    );

    server.abort();
}

#[tokio::test]
async fn custom_ca() -> Result<(), BoxError> {
    let (addr, server) = serve(false).await;

    let response = Request::post(&url(addr))
        .ca(minica("minica.pem"))
        .body("hello world")
        .send()
        .await?;

    assert!(response.is_ok());
    assert_eq!(response.body().text(), "hello world");

    server.abort();
    Ok(())
}

#[tokio::test]
async fn insecure_skip_verify() -> Result<(), BoxError> {
    let (addr, server) = serve(false).await;

    let response = Request::get(&url(addr))
        .insecure_skip_verify(true)
        .send()
        .await?;
    assert!(response.is_ok());

    server.abort();
    Ok(())
}

#[tokio::test]
async fn explicit_config() -> Result<(), BoxError> {
    let (addr, server) = serve(false).await;

    let mut config = rustls::ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_root_certificates(tls_root_store())
        .with_no_client_auth();
    config.alpn_protocols.push(b"http/1.1".to_vec());

    let response = Request::get(&url(addr))
        .tls_config(Arc::new(config))
        .send()
        .await?;
    assert!(response.is_ok());

    server.abort();
    Ok(())
}

#[tokio::test]
async fn explicit_config_with_client_certificate() -> Result<(), BoxError> {
    let (addr, server) = serve(true).await;

    let mut config = rustls::ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_root_certificates(tls_root_store())
        .with_no_client_auth();
    config.alpn_protocols.push(b"http/1.1".to_vec());
    let config = Arc::new(config);

    let response = Request::post(&url(addr))
        .tls_config(config.clone())
        .cert(minica("localhost/cert.pem"), minica("localhost/key.pem"))
        .body("mutual")
        .send()
        .await?;
    assert_eq!(response.body().text(), "mutual");

    let error = Request::get(&url(addr))
        .tls_config(config)
        .ca("/does/not/exist.pem")
        .send()
        .await
        .unwrap_err();
    assert!(
        matches!(error, Error::Tls(TlsError::Io { .. })),
        "unexpected error: {error:?}"
    );

    server.abort();
    Ok(())
}

#[tokio::test]
async fn client_certificate() -> Result<(), BoxError> {
    let (addr, server) = serve(true).await;

    let response = Request::post(&url(addr))
        .ca(minica("minica.pem"))
        .cert(minica("localhost/cert.pem"), minica("localhost/key.pem"))
        .body("mutual")
        .send()
        .await?;
    assert_eq!(response.body().text(), "mutual");

    let result = Request::get(&url(addr))
        .ca(minica("minica.pem"))
        .send()
        .await;
    assert!(result.is_err(), "server requires a client certificate");

    server.abort();
    Ok(())
}

#[tokio::test]
async fn invalid_ca_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, b"not a certificate").unwrap();

    let error = Request::get("https://localhost:1/")
        .ca(file.path())
        .send()
        .await
        .unwrap_err();
    assert!(
        matches!(error, Error::Tls(TlsError::NoCertificates(_))),
        "unexpected error: {error:?}"
    );
}
