//! Fluent HTTP requests with typed responses for Horizon Lattice.
//!
//! This crate wraps an HTTP transport with three things:
//!
//! - **Request building**: verb factories and chain methods for headers,
//!   query parameters, labels and delays
//! - **Typed responses**: the caller states the expected shape of the payload
//!   (a type, an existing instance, a sequence of either, or a scalar) and
//!   receives a value of that type
//! - **Lifecycle events**: every execution reports `RequestStart`,
//!   `RequestError`, `RequestEnd`, `TransformStart` and `TransformEnd` to an
//!   [`EventBus`]
//!
//! # Getting Started
//!
//! ```ignore
//! use horizon_lattice_fetch::Transformer;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct BlogPost {
//!     id: u32,
//!     user_id: u32,
//!     title: String,
//!     body: String,
//! }
//!
//! let api = Transformer::builder()
//!     .base_url("https://jsonplaceholder.typicode.com")
//!     .build()?;
//!
//! let post = api.get("/posts/1").as_type::<BlogPost>().fetch_data().await?;
//! let posts = api.get("/posts").as_array_of::<BlogPost>().fetch_data().await?;
//! ```
//!
//! ## Updating an existing value
//!
//! Fields missing from the response keep the values the instance already has:
//!
//! ```ignore
//! let draft = BlogPost::draft("Hello");
//! let saved = api
//!     .post("/posts", &draft)
//!     .as_instance(draft)
//!     .fetch_data()
//!     .await?;
//! ```
//!
//! ## Observing requests
//!
//! ```ignore
//! use horizon_lattice_fetch::EventKind;
//!
//! api.events().subscribe(EventKind::RequestError, |event| {
//!     tracing::warn!(endpoint = %event.context().endpoint(), "request failed");
//! });
//! ```
//!
//! ## Concurrency
//!
//! Contexts are plain futures; [`all`] and [`try_all`] await several of them.
//!
//! ```ignore
//! let (first, second) = (
//!     api.get("/posts/1").as_type::<BlogPost>(),
//!     api.get("/posts/2").as_type::<BlogPost>(),
//! );
//! let posts = horizon_lattice_fetch::try_all([first.fetch_data(), second.fetch_data()]).await?;
//! ```

mod error;
pub mod event;
pub mod http;
pub mod mapping;
mod transformer;

pub use error::{Error, Result, TransportError};
pub use event::{EventBus, EventContext, EventKind, LifecycleEvent, Listener};
pub use http::{
    HttpMethod, HttpTransport, RawResponse, Request, RequestConfig, RequestContext, Response,
    ResponseShape, Transport, TransportConfig,
};
pub use mapping::MappingOptions;
pub use transformer::{Transformer, TransformerBuilder, all, is_transport_error, try_all};
