use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use futures_util::future::BoxFuture;
use hmac::{Hmac, Mac};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderName, HeaderValue};
use sha1::Sha1;
use sha2::Sha256;

use super::{Arg, ArgumentError, Middleware, Next};
use crate::context::Context;
use crate::request::Request;
use crate::Error;

/// Hash function used for request signatures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignatureDigest {
    /// HMAC-SHA1.
    #[default]
    Sha1,
    /// HMAC-SHA256.
    Sha256,
}

/// Signs requests with an HMAC over their method, URL, host, content type and body.
///
/// The signed string is
///
/// ```text
/// METHOD URL QUERY \n HOST \n CONTENT-TYPE \n\n BODY
/// ```
///
/// with no separators inside the first line. The signature is URL-safe base64
/// and is sent as `<access key>:<signature>` in the `Authorization` header, or
/// the header chosen with [`SignedAuth::with_header`].
#[derive(Clone)]
pub struct SignedAuth {
    access_key: String,
    secret_key: String,
    header: HeaderName,
    digest: SignatureDigest,
}

impl SignedAuth {
    /// Registered name of this middleware.
    pub const NAME: &'static str = "signed_auth";

    /// Sign with `access_key`/`secret_key` using HMAC-SHA1.
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            header: AUTHORIZATION,
            digest: SignatureDigest::default(),
        }
    }

    /// Send the signature in `header`.
    pub fn with_header(mut self, header: HeaderName) -> Self {
        self.header = header;
        self
    }

    /// Sign with `digest`.
    pub fn with_digest(mut self, digest: SignatureDigest) -> Self {
        self.digest = digest;
        self
    }

    pub(crate) fn from_args(args: &[Arg]) -> Result<Self, Error> {
        let (access_key, secret_key, header) = match args {
            [Arg::Str(access_key), Arg::Str(secret_key)] => (access_key, secret_key, None),
            [Arg::Str(access_key), Arg::Str(secret_key), Arg::Str(header)] => {
                (access_key, secret_key, Some(header))
            }
            [Arg::Str(_), Arg::Str(_), other] => {
                return Err(ArgumentError::kind(Self::NAME, "header_name", "string", other).into())
            }
            [Arg::Str(_), other, ..] if args.len() <= 3 => {
                return Err(ArgumentError::kind(Self::NAME, "secret_key", "string", other).into())
            }
            [other, _, ..] if args.len() <= 3 => {
                return Err(ArgumentError::kind(Self::NAME, "access_key", "string", other).into())
            }
            _ => return Err(ArgumentError::arity(Self::NAME, "2 or 3", args).into()),
        };

        let mut signer = Self::new(access_key.as_str(), secret_key.as_str());
        if let Some(header) = header {
            signer.header = HeaderName::try_from(header.as_str())
                .map_err(|error| ArgumentError::value(Self::NAME, "header_name", error))?;
        }
        Ok(signer)
    }

    /// The string which is signed for `request`.
    pub fn canonical_string(&self, request: &Request) -> Result<Vec<u8>, Error> {
        let mut data = Vec::new();

        if !request.url().is_empty() {
            data.extend_from_slice(request.method().as_str().as_bytes());
            data.extend_from_slice(request.url().as_bytes());
        }

        let query = request.queries().encode();
        data.extend_from_slice(query.as_bytes());

        data.push(b'\n');
        data.extend_from_slice(request.host().unwrap_or_default().as_bytes());
        data.push(b'\n');
        match request.headers().get(CONTENT_TYPE) {
            Some(value) => data.extend_from_slice(value.as_bytes()),
            None => {
                if let Some(content_type) = request.content_type() {
                    data.extend_from_slice(content_type.to_string().as_bytes());
                }
            }
        }
        data.extend_from_slice(b"\n\n");
        data.extend_from_slice(&request.body_bytes()?);

        Ok(data)
    }

    /// Compute the signature for `data`, URL-safe base64 encoded.
    pub fn sign(&self, data: &[u8]) -> String {
        let key = self.secret_key.as_bytes();
        let signature = match self.digest {
            SignatureDigest::Sha1 => {
                let mut mac =
                    Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts keys of any length");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            SignatureDigest::Sha256 => {
                let mut mac =
                    Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts keys of any length");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
        };
        URL_SAFE.encode(signature)
    }

    /// The header value which authenticates `request`.
    pub fn token(&self, request: &Request) -> Result<HeaderValue, Error> {
        let data = self.canonical_string(request)?;
        let token = format!("{}:{}", self.access_key, self.sign(&data));
        let mut value = HeaderValue::try_from(token).map_err(http::Error::from)?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl std::fmt::Debug for SignedAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedAuth")
            .field("access_key", &self.access_key)
            .field("header", &self.header)
            .field("digest", &self.digest)
            .finish_non_exhaustive()
    }
}

impl Middleware for SignedAuth {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let token = self.token(ctx.request())?;
            ctx.request_mut()
                .headers_mut()
                .insert(self.header.clone(), token);
            next.run(ctx).await
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use http::header::HOST;

    use super::*;
    use crate::middleware::Chain;

    fn request() -> Request {
        Request::post("http://api.example.com/v1/items?b=2&a=1")
            .content_type("application/json")
            .body(serde_json::json!({"id": 7}))
            .build()
            .unwrap()
    }

    #[test]
    fn canonical_string_layout() {
        let signer = SignedAuth::new("ak", "sk");
        let data = signer.canonical_string(&request()).unwrap();
        assert_eq!(
            String::from_utf8(data).unwrap(),
            "POSThttp://api.example.com/v1/itemsa=1&b=2\napi.example.com\napplication/json; charset=utf-8\n\n{\"id\":7}"
        );
    }

    #[test]
    fn host_header_and_content_type_header_take_precedence() {
        let mut request = request();
        request.set_header(HOST, "internal.example.com").unwrap();
        request.set_header(CONTENT_TYPE, "application/json").unwrap();
        let signer = SignedAuth::new("ak", "sk");
        let data = String::from_utf8(signer.canonical_string(&request).unwrap()).unwrap();
        assert!(data.contains("\ninternal.example.com\napplication/json\n\n"), "{data}");
    }

    #[test]
    fn known_signatures() {
        // Reference values from RFC 2202 / RFC 4231 test case 2.
        let data = b"what do ya want for nothing?";
        let signer = SignedAuth::new("ak", "Jefe");
        assert_eq!(signer.sign(data), "7_zfauXrL6LSdBbV8YTfnCWafHk=");

        let signer = signer.with_digest(SignatureDigest::Sha256);
        assert_eq!(
            signer.sign(data),
            "W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM="
        );
    }

    #[tokio::test]
    async fn sets_token_header() {
        let signer = SignedAuth::from_args(&["ak".into(), "sk".into(), "x-signature".into()]).unwrap();
        let expected = signer.token(&request()).unwrap();

        let chain = Chain::new(vec![Arc::new(signer)]);
        let mut ctx = Context::new(request(), CancellationToken::new());
        chain.start(&mut ctx).await.unwrap();

        let value = &ctx.request().headers()["x-signature"];
        assert_eq!(value, &expected);
        assert!(value.to_str().unwrap().starts_with("ak:"));
        assert!(!ctx.request().headers().contains_key(AUTHORIZATION));
    }

    #[test]
    fn argument_errors() {
        let error = SignedAuth::from_args(&["ak".into()]).unwrap_err();
        assert!(matches!(
            error,
            Error::Argument(ArgumentError::Arity { actual: 1, .. })
        ));

        let error = SignedAuth::from_args(&["ak".into(), Arg::Int(1)]).unwrap_err();
        assert!(matches!(
            error,
            Error::Argument(ArgumentError::Type { name: "secret_key", .. })
        ));

        let error = SignedAuth::from_args(&[Arg::Bool(true), "sk".into()]).unwrap_err();
        assert!(matches!(
            error,
            Error::Argument(ArgumentError::Type { name: "access_key", .. })
        ));

        let error = SignedAuth::from_args(&["ak".into(), "sk".into(), Arg::Float(1.0)]).unwrap_err();
        assert!(matches!(
            error,
            Error::Argument(ArgumentError::Type { name: "header_name", .. })
        ));

        let error =
            SignedAuth::from_args(&["ak".into(), "sk".into(), "bad header".into()]).unwrap_err();
        assert!(matches!(
            error,
            Error::Argument(ArgumentError::Value { name: "header_name", .. })
        ));
        assert!(error.to_string().contains("invalid header_name"), "{error}");
    }
}
