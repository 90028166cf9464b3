use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures_util::future::BoxFuture;
use http::header::AUTHORIZATION;
use http::HeaderValue;

use super::{Arg, ArgumentError, Middleware, Next};
use crate::context::Context;
use crate::Error;

/// Render `Basic base64(username:password)` as a sensitive header value.
pub(crate) fn basic_auth_header(username: &str, password: &str) -> Result<HeaderValue, Error> {
    let credentials = STANDARD.encode(format!("{username}:{password}"));
    let mut value =
        HeaderValue::try_from(format!("Basic {credentials}")).map_err(http::Error::from)?;
    value.set_sensitive(true);
    Ok(value)
}

/// Sets an HTTP basic `Authorization` header on every request.
#[derive(Clone)]
pub struct BasicAuth {
    username: String,
    header: HeaderValue,
}

impl BasicAuth {
    /// Registered name of this middleware.
    pub const NAME: &'static str = "basic_auth";

    /// Authenticate as `username` with `password`.
    pub fn new(username: impl Into<String>, password: impl AsRef<str>) -> Result<Self, Error> {
        let username = username.into();
        let header = basic_auth_header(&username, password.as_ref())?;
        Ok(Self { username, header })
    }

    /// The user this middleware authenticates as.
    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn from_args(args: &[Arg]) -> Result<Self, Error> {
        match args {
            [Arg::Str(username), Arg::Str(password)] => Self::new(username.as_str(), password),
            [Arg::Str(_), other] => {
                Err(ArgumentError::kind(Self::NAME, "password", "string", other).into())
            }
            [other, _] => Err(ArgumentError::kind(Self::NAME, "username", "string", other).into()),
            _ => Err(ArgumentError::arity(Self::NAME, "2", args).into()),
        }
    }
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Middleware for BasicAuth {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<(), Error>> {
        ctx.request_mut()
            .headers_mut()
            .insert(AUTHORIZATION, self.header.clone());
        next.run(ctx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::middleware::Chain;
    use crate::request::Request;

    #[tokio::test]
    async fn sets_authorization_header() {
        let unit = BasicAuth::from_args(&["Aladdin".into(), "open sesame".into()]).unwrap();
        assert_eq!(unit.username(), "Aladdin");

        let chain = Chain::new(vec![Arc::new(unit)]);
        let mut ctx = Context::new(
            Request::new(http::Method::GET, "http://example.com"),
            CancellationToken::new(),
        );
        ctx.request_mut()
            .set_header(AUTHORIZATION, "Bearer stale")
            .unwrap();
        chain.start(&mut ctx).await.unwrap();

        let values: Vec<_> = ctx.request().headers().get_all(AUTHORIZATION).iter().collect();
        assert_eq!(values, ["Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="]);
        assert!(values[0].is_sensitive());
    }

    #[test]
    fn arity_errors() {
        for args in [vec![], vec![Arg::from("user")], vec!["a".into(), "b".into(), "c".into()]] {
            let error = BasicAuth::from_args(&args).unwrap_err();
            assert!(
                matches!(error, Error::Argument(ArgumentError::Arity { expected: "2", actual, .. }) if actual == args.len()),
                "{args:?}"
            );
        }
    }

    #[test]
    fn type_errors() {
        let error = BasicAuth::from_args(&[Arg::Int(123), "pass".into()]).unwrap_err();
        assert_eq!(
            error.to_string(),
            "basic_auth: expected username to be a string, got integer 123"
        );

        let error = BasicAuth::from_args(&["user".into(), Arg::Bool(false)]).unwrap_err();
        assert!(matches!(
            error,
            Error::Argument(ArgumentError::Type { name: "password", .. })
        ));
    }
}
