//! Request building, transport and typed response transformation.
//!
//! A [`Request`] is built with a verb factory and chain methods, bound to an
//! expected [`ResponseShape`] through one of its `as_*` selectors, and then
//! executed as a [`RequestContext`].
//!
//! # Example
//!
//! ```ignore
//! use horizon_lattice_fetch::http::Request;
//!
//! #[derive(serde::Deserialize)]
//! struct Todo {
//!     id: u32,
//!     title: String,
//! }
//!
//! let todos: Vec<Todo> = Request::get("https://api.example.com/todos")
//!     .add_params("completed", "false")
//!     .as_array_of::<Todo>()
//!     .fetch_data()
//!     .await?;
//! ```
//!
//! # Transports
//!
//! The call itself is performed by a [`Transport`]. Requests created through a
//! [`Transformer`](crate::Transformer) are bound to its transport; a request
//! without one uses a fresh [`HttpTransport`] with default settings.

mod context;
mod request;
mod response;
mod shape;
mod transport;

pub use context::RequestContext;
pub use request::{HttpMethod, Request, RequestConfig};
pub use response::{RawResponse, Response};
pub use shape::{ResponseShape, ScalarKind};
pub use transport::{
    HttpTransport, HttpTransportBuilder, InterceptorId, InterceptorManager, Interceptors,
    RequestInterceptor, ResponseInterceptor, Transport, TransportConfig, resolve_url,
};
