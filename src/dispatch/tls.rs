//! TLS client configuration for `https` requests.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::{ResolvesClientCert, VerifierBuilderError, WebPkiServerVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::sign::CertifiedKey;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use thiserror::Error;

/// TLS material could not be loaded, or did not form a valid configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TlsError {
    /// A PEM file could not be read.
    #[error("reading {}: {source}", .path.display())]
    Io {
        /// The file being read.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// A PEM file held no certificates.
    #[error("no certificates found in {}", .0.display())]
    NoCertificates(PathBuf),

    /// A PEM file held no private key.
    #[error("no private key found in {}", .0.display())]
    NoPrivateKey(PathBuf),

    /// A certificate was rejected.
    #[error("invalid certificate in {}: {source}", .path.display())]
    Certificate {
        /// The file the certificate came from.
        path: PathBuf,
        /// The underlying error.
        source: rustls::Error,
    },

    /// The configuration could not be assembled.
    #[error(transparent)]
    Config(#[from] rustls::Error),

    /// No server certificate verifier could be built from the trusted roots.
    #[error(transparent)]
    Verifier(#[from] VerifierBuilderError),
}

/// TLS settings for a request.
///
/// An explicit [`ClientConfig`] is the starting point when set. Otherwise one is
/// built with the platform roots, or with verification disabled by
/// `insecure_skip_verify`. In both cases trusted roots come from `ca` when set
/// (replacing any others), and a client certificate is presented when both
/// `cert` and `key` are set. `insecure_skip_verify` has no effect on an
/// explicit configuration.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// Accept any server certificate.
    pub insecure_skip_verify: bool,

    /// A complete configuration to start from.
    pub config: Option<Arc<ClientConfig>>,

    /// PEM file of trusted root certificates.
    pub ca: Option<PathBuf>,

    /// PEM file of the client certificate chain.
    pub cert: Option<PathBuf>,

    /// PEM file of the client private key.
    pub key: Option<PathBuf>,
}

impl TlsOptions {
    fn is_default(&self) -> bool {
        !self.insecure_skip_verify && self.ca.is_none() && self.cert.is_none() && self.key.is_none()
    }

    /// Materialize the client configuration.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>, TlsError> {
        if let Some(config) = &self.config {
            return self.extend(config);
        }

        static DEFAULT: OnceLock<Arc<ClientConfig>> = OnceLock::new();
        if self.is_default() {
            if let Some(config) = DEFAULT.get() {
                return Ok(config.clone());
            }
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?;

        let builder = if self.insecure_skip_verify {
            if let Some(ca) = &self.ca {
                load_root_store(ca)?;
            }
            tracing::debug!("server certificate verification disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification(provider)))
        } else {
            let roots = match &self.ca {
                Some(ca) => load_root_store(ca)?,
                None => native_root_store(),
            };
            builder.with_root_certificates(roots)
        };

        let mut config = match (&self.cert, &self.key) {
            (Some(cert), Some(key)) => {
                builder.with_client_auth_cert(load_certs(cert)?, load_private_key(key)?)?
            }
            _ => builder.with_no_client_auth(),
        };
        config.alpn_protocols.push(b"http/1.1".to_vec());

        let config = Arc::new(config);
        if self.is_default() {
            let _ = DEFAULT.set(config.clone());
        }
        Ok(config)
    }

    /// Apply `ca`, `cert` and `key` on top of an explicit configuration.
    fn extend(&self, config: &Arc<ClientConfig>) -> Result<Arc<ClientConfig>, TlsError> {
        let client_cert = match (&self.cert, &self.key) {
            (Some(cert), Some(key)) => Some((load_certs(cert)?, load_private_key(key)?)),
            _ => None,
        };
        if self.ca.is_none() && client_cert.is_none() {
            return Ok(config.clone());
        }

        let mut config = ClientConfig::clone(config);
        let provider = config.crypto_provider().clone();
        if let Some(ca) = &self.ca {
            let roots = Arc::new(load_root_store(ca)?);
            let verifier =
                WebPkiServerVerifier::builder_with_provider(roots, provider.clone()).build()?;
            config.dangerous().set_certificate_verifier(verifier);
        }
        if let Some((certs, key)) = client_cert {
            let key = provider.key_provider.load_private_key(key)?;
            let certified = CertifiedKey::new(certs, key);
            config.client_auth_cert_resolver = Arc::new(ClientCert(Arc::new(certified)));
        }
        Ok(Arc::new(config))
    }
}

/// Always presents the same client certificate.
#[derive(Debug)]
struct ClientCert(Arc<CertifiedKey>);

impl ResolvesClientCert for ClientCert {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        Some(self.0.clone())
    }

    fn has_certs(&self) -> bool {
        true
    }
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.to_owned(),
            source,
        })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_owned(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_owned()));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|source| TlsError::Io {
            path: path.to_owned(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_owned()))
}

fn load_root_store(path: &Path) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots.add(cert).map_err(|source| TlsError::Certificate {
            path: path.to_owned(),
            source,
        })?;
    }
    tracing::trace!(path = %path.display(), roots = roots.len(), "loaded root certificates");
    Ok(roots)
}

fn native_root_store() -> RootCertStore {
    let native = rustls_native_certs::load_native_certs();
    for error in &native.errors {
        tracing::warn!(%error, "unable to load a platform root certificate");
    }

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    tracing::trace!(added, ignored, "loaded platform root certificates");
    roots
}

/// Accepts every server certificate, while still checking handshake signatures.
#[derive(Debug)]
struct NoVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
