//! Courier
//!
//! Outbound HTTP requests driven through a chain of composable middleware,
//! with request and response bodies encoded according to their content type.
//!
//! A [`Request`] is described with a fluent builder, decorated with any number
//! of [`Middleware`] units, and executed with [`Request::send`]. The chain runs
//! forward through each unit in attachment order, reaches the terminal
//! [`Dispatch`] unit which performs the network call, and then unwinds in
//! reverse so every unit can observe the [`Response`].
//!
//! ```no_run
//! # use courier::{Request, middleware};
//! # async fn run() -> Result<(), courier::Error> {
//! let response = Request::get("http://example.com/items")
//!     .query("page", "2")
//!     .middleware(middleware::create("request_time", &[])?)
//!     .send()
//!     .await?;
//!
//! let items: serde_json::Value = response.body().unmarshal()?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod codec;
pub mod context;
pub mod dispatch;
mod error;
pub mod header;
pub mod middleware;
pub mod request;
pub mod response;
pub mod service;
pub mod transport;
pub mod values;

pub use self::context::Context;
pub use self::dispatch::Dispatch;
pub use self::error::Error;
pub use self::middleware::{Middleware, Next};
pub use self::request::Request;
pub use self::response::{Body, Response};
pub use self::values::Values;

/// Boxed error used where the concrete error type is not known.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
