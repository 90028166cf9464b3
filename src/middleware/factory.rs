use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use thiserror::Error;

use super::{BasicAuth, DebugRequest, Middleware, Observer, SignedAuth, Timing};
use crate::dispatch::Dispatch;
use crate::Error;

/// An argument passed to a middleware factory.
#[derive(Clone)]
pub enum Arg {
    /// A string.
    Str(String),
    /// An integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A boolean.
    Bool(bool),
    /// A request observer callback.
    Observer(Observer),
}

impl Arg {
    /// The kind of value held, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Arg::Str(_) => "string",
            Arg::Int(_) => "integer",
            Arg::Float(_) => "float",
            Arg::Bool(_) => "boolean",
            Arg::Observer(_) => "observer",
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Str(value) => f.debug_tuple("Str").field(value).finish(),
            Arg::Int(value) => f.debug_tuple("Int").field(value).finish(),
            Arg::Float(value) => f.debug_tuple("Float").field(value).finish(),
            Arg::Bool(value) => f.debug_tuple("Bool").field(value).finish(),
            Arg::Observer(_) => f.debug_tuple("Observer").field(&format_args!("..")).finish(),
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Str(value) => write!(f, "string {value:?}"),
            Arg::Int(value) => write!(f, "integer {value}"),
            Arg::Float(value) => write!(f, "float {value}"),
            Arg::Bool(value) => write!(f, "boolean {value}"),
            Arg::Observer(_) => f.write_str("observer"),
        }
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Str(value.to_owned())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Str(value)
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Arg::Int(value.into())
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Float(value)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Bool(value)
    }
}

impl From<Observer> for Arg {
    fn from(value: Observer) -> Self {
        Arg::Observer(value)
    }
}

/// A middleware factory rejected its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    /// Wrong number of arguments.
    #[error("{middleware}: expected {expected} arguments, got {actual}")]
    Arity {
        /// Middleware being created.
        middleware: &'static str,
        /// Accepted argument count, e.g. `"2"` or `"0 or 1"`.
        expected: &'static str,
        /// Number of arguments supplied.
        actual: usize,
    },

    /// An argument had the wrong kind.
    #[error("{middleware}: expected {name} to be a {expected}, got {actual}")]
    Type {
        /// Middleware being created.
        middleware: &'static str,
        /// Name of the offending argument.
        name: &'static str,
        /// Expected kind.
        expected: &'static str,
        /// Kind and value supplied, e.g. `integer 123`.
        actual: String,
    },

    /// An argument had the right kind but an unusable value.
    #[error("{middleware}: invalid {name}: {reason}")]
    Value {
        /// Middleware being created.
        middleware: &'static str,
        /// Name of the offending argument.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ArgumentError {
    pub(crate) fn arity(middleware: &'static str, expected: &'static str, args: &[Arg]) -> Self {
        ArgumentError::Arity {
            middleware,
            expected,
            actual: args.len(),
        }
    }

    pub(crate) fn kind(
        middleware: &'static str,
        name: &'static str,
        expected: &'static str,
        actual: &Arg,
    ) -> Self {
        ArgumentError::Type {
            middleware,
            name,
            expected,
            actual: actual.to_string(),
        }
    }

    pub(crate) fn value(
        middleware: &'static str,
        name: &'static str,
        reason: impl std::fmt::Display,
    ) -> Self {
        ArgumentError::Value {
            middleware,
            name,
            reason: reason.to_string(),
        }
    }
}

/// Builds a middleware unit from factory arguments.
pub type Factory = Arc<dyn Fn(&[Arg]) -> Result<Arc<dyn Middleware>, Error> + Send + Sync>;

/// Wrap a typed constructor as a [`Factory`].
fn factory<M, F>(build: F) -> Factory
where
    M: Middleware,
    F: Fn(&[Arg]) -> Result<M, Error> + Send + Sync + 'static,
{
    Arc::new(move |args: &[Arg]| -> Result<Arc<dyn Middleware>, Error> {
        Ok(Arc::new(build(args)?))
    })
}

fn builtins() -> HashMap<String, Factory> {
    let mut factories = HashMap::new();
    factories.insert(Timing::NAME.to_owned(), factory(Timing::from_args));
    factories.insert(DebugRequest::NAME.to_owned(), factory(DebugRequest::from_args));
    factories.insert(BasicAuth::NAME.to_owned(), factory(BasicAuth::from_args));
    factories.insert(SignedAuth::NAME.to_owned(), factory(SignedAuth::from_args));
    factories.insert(
        Dispatch::NAME.to_owned(),
        factory(|_: &[Arg]| Ok(Dispatch::default())),
    );
    factories
}

fn registry() -> &'static RwLock<HashMap<String, Factory>> {
    static FACTORIES: OnceLock<RwLock<HashMap<String, Factory>>> = OnceLock::new();
    FACTORIES.get_or_init(|| RwLock::new(builtins()))
}

/// Register a middleware factory under `name`, replacing any existing one.
pub fn register_factory<F>(name: impl Into<String>, factory: F)
where
    F: Fn(&[Arg]) -> Result<Arc<dyn Middleware>, Error> + Send + Sync + 'static,
{
    let name = name.into();
    tracing::trace!(middleware = %name, "registered middleware factory");
    registry().write().insert(name, Arc::new(factory));
}

/// Create a middleware unit by name.
///
/// Built-in names are `request_time`, `debug`, `basic_auth`, `signed_auth`
/// and `request_exec`.
pub fn create(name: &str, args: &[Arg]) -> Result<Arc<dyn Middleware>, Error> {
    let factory = registry()
        .read()
        .get(name)
        .cloned()
        .ok_or_else(|| Error::NotRegistered(name.to_owned()))?;
    factory(args)
}
