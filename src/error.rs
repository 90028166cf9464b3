use thiserror::Error;

use crate::codec::CodecError;
use crate::dispatch::TlsError;
use crate::middleware::ArgumentError;
use crate::transport::TransportError;
use crate::BoxError;

/// Error returned when building or executing a request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A middleware factory rejected its arguments.
    #[error(transparent)]
    Argument(#[from] ArgumentError),

    /// No middleware factory is registered under the requested name.
    #[error("middleware {0} not registered")]
    NotRegistered(String),

    /// The request body could not be encoded, or a response body decoded.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),

    /// The request URL could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(#[source] url::ParseError),

    /// The transport request could not be assembled (bad header name, etc.).
    #[error("invalid request: {0}")]
    Request(#[from] http::Error),

    /// TLS material (CA bundle, client certificate or key) could not be loaded.
    #[error("tls: {0}")]
    Tls(#[from] TlsError),

    /// The transport failed, after any configured retries.
    #[error("transport: {0}")]
    Transport(#[source] TransportError),

    /// The request was cancelled through its cancellation token.
    #[error("request cancelled")]
    Cancelled,

    /// The chain finished without any unit producing a response.
    #[error("middleware chain completed without a response")]
    NoResponse,

    /// A middleware unit failed.
    #[error("middleware: {0}")]
    Middleware(#[source] BoxError),
}

impl Error {
    /// Wrap an arbitrary error raised inside a middleware unit.
    pub fn middleware<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Middleware(error.into())
    }

    /// Returns true if the transport gave up because a request timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Transport(TransportError::Timeout))
    }

    /// Returns true if the request was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<TransportError> for Error {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Cancelled => Error::Cancelled,
            error => Error::Transport(error),
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use static_assertions::assert_impl_all;

    assert_impl_all!(Error: std::error::Error, Send, Sync, Into<BoxError>);

    #[test]
    fn cancellation_is_distinct_from_transport_errors() {
        let error = Error::from(TransportError::Cancelled);
        assert!(error.is_cancelled());
        assert!(!error.is_timeout());

        let error = Error::from(TransportError::Timeout);
        assert!(error.is_timeout());
        assert!(!error.is_cancelled());
    }

    #[test]
    fn not_registered_names_the_middleware() {
        let error = Error::NotRegistered("rate_limit".into());
        assert_eq!(error.to_string(), "middleware rate_limit not registered");
    }
}
