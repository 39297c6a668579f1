//! The request factory facade.
//!
//! Besides [`Transformer`], this module provides [`all`] and [`try_all`] for
//! awaiting several requests together. There are no cancel tokens: dropping
//! a pending `fetch_*` future cancels the request. There is no `spread`
//! either; destructure the returned `Vec` or use tuples instead.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;

pub use futures_util::future::{join_all as all, try_join_all as try_all};

use crate::error::{Error, TransportError};
use crate::event::EventBus;
use crate::http::{
    HttpTransport, HttpTransportBuilder, Interceptors, Request, RequestConfig, Transport,
    TransportConfig,
};
use crate::mapping::MappingOptions;

/// Creates requests bound to one transport and one event bus.
///
/// A transformer is a cheap handle; clones share the transport, its
/// defaults and interceptors, and the event bus. Use [`Transformer::create`]
/// for an independent instance.
///
/// # Example
///
/// ```ignore
/// use horizon_lattice_fetch::{EventKind, Transformer};
///
/// let api = Transformer::builder()
///     .base_url("https://jsonplaceholder.typicode.com")
///     .timeout(Duration::from_secs(10))
///     .build()?;
///
/// api.events().subscribe(EventKind::RequestStart, |event| {
///     tracing::info!("-> {}", event.context().endpoint());
/// });
///
/// let post: BlogPost = api.get("/posts/1").as_type().fetch_data().await?;
/// ```
#[derive(Clone)]
pub struct Transformer {
    transport: Arc<dyn Transport>,
    events: EventBus,
}

impl Transformer {
    /// A transformer over a default [`HttpTransport`].
    pub fn new() -> Result<Self, TransportError> {
        Ok(Self::with_transport(Arc::new(HttpTransport::new()?)))
    }

    /// A transformer over `transport`, with a new event bus.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            events: EventBus::new(),
        }
    }

    /// An independent transformer with its own transport and event bus.
    ///
    /// Nothing is shared with `self`: interceptors, defaults and listeners
    /// all start empty or from `config`.
    pub fn create(&self, config: TransportConfig) -> Result<Self, TransportError> {
        tracing::debug!(target: "horizon_lattice_fetch::context", base_url = ?config.base_url, "creating transformer");
        let transport = HttpTransportBuilder::from_config(config).build()?;
        Ok(Self::with_transport(Arc::new(transport)))
    }

    /// Create a builder for configuring a new transformer.
    pub fn builder() -> TransformerBuilder {
        TransformerBuilder::new()
    }

    fn bind(&self, request: Request) -> Request {
        request
            .with_transport(self.transport.clone())
            .with_event_bus(self.events.clone())
    }

    /// Wrap a complete descriptor.
    pub fn request(&self, config: RequestConfig) -> Request {
        self.bind(Request::new(config))
    }

    /// Wrap `config` with its URL replaced by `url`.
    pub fn request_url(&self, url: impl Into<String>, mut config: RequestConfig) -> Request {
        config.url = url.into();
        self.request(config)
    }

    /// A GET request.
    pub fn get(&self, url: impl Into<String>) -> Request {
        self.bind(Request::get(url))
    }

    /// A GET request with config overrides.
    pub fn get_with(&self, url: impl Into<String>, overrides: RequestConfig) -> Request {
        self.bind(Request::get_with(url, overrides))
    }

    /// A DELETE request.
    pub fn delete(&self, url: impl Into<String>) -> Request {
        self.bind(Request::delete(url))
    }

    /// A DELETE request with config overrides.
    pub fn delete_with(&self, url: impl Into<String>, overrides: RequestConfig) -> Request {
        self.bind(Request::delete_with(url, overrides))
    }

    /// A HEAD request.
    pub fn head(&self, url: impl Into<String>) -> Request {
        self.bind(Request::head(url))
    }

    /// A HEAD request with config overrides.
    pub fn head_with(&self, url: impl Into<String>, overrides: RequestConfig) -> Request {
        self.bind(Request::head_with(url, overrides))
    }

    /// An OPTIONS request.
    pub fn options(&self, url: impl Into<String>) -> Request {
        self.bind(Request::options(url))
    }

    /// An OPTIONS request with config overrides.
    pub fn options_with(&self, url: impl Into<String>, overrides: RequestConfig) -> Request {
        self.bind(Request::options_with(url, overrides))
    }

    /// A POST request with a mapped body.
    pub fn post<B: Serialize + ?Sized>(&self, url: impl Into<String>, body: &B) -> Request {
        self.bind(Request::post(url, body))
    }

    /// A POST request with config overrides and mapping options.
    pub fn post_with<B: Serialize + ?Sized>(
        &self,
        url: impl Into<String>,
        body: &B,
        overrides: RequestConfig,
        options: &MappingOptions,
    ) -> Request {
        self.bind(Request::post_with(url, body, overrides, options))
    }

    /// A PUT request with a mapped body.
    pub fn put<B: Serialize + ?Sized>(&self, url: impl Into<String>, body: &B) -> Request {
        self.bind(Request::put(url, body))
    }

    /// A PUT request with config overrides and mapping options.
    pub fn put_with<B: Serialize + ?Sized>(
        &self,
        url: impl Into<String>,
        body: &B,
        overrides: RequestConfig,
        options: &MappingOptions,
    ) -> Request {
        self.bind(Request::put_with(url, body, overrides, options))
    }

    /// A PATCH request with a mapped body.
    pub fn patch<B: Serialize + ?Sized>(&self, url: impl Into<String>, body: &B) -> Request {
        self.bind(Request::patch(url, body))
    }

    /// A PATCH request with config overrides and mapping options.
    pub fn patch_with<B: Serialize + ?Sized>(
        &self,
        url: impl Into<String>,
        body: &B,
        overrides: RequestConfig,
        options: &MappingOptions,
    ) -> Request {
        self.bind(Request::patch_with(url, body, overrides, options))
    }

    /// Defaults of the underlying transport.
    pub fn defaults(&self) -> &RwLock<TransportConfig> {
        self.transport.defaults()
    }

    /// Interceptor chains of the underlying transport.
    pub fn interceptors(&self) -> &Interceptors {
        self.transport.interceptors()
    }

    /// The full URL `config` would be sent to.
    pub fn get_uri(&self, config: &RequestConfig) -> Result<String, TransportError> {
        self.transport.get_uri(config)
    }

    /// The event bus every request of this transformer reports to.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformer")
            .field("defaults", &*self.defaults().read())
            .field("events", &self.events)
            .finish()
    }
}

/// Builder for a [`Transformer`] over an [`HttpTransport`].
#[derive(Default)]
pub struct TransformerBuilder {
    transport: HttpTransportBuilder,
    events: Option<EventBus>,
}

impl TransformerBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative request URLs against `base_url`.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.transport = self.transport.base_url(base_url);
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.transport = self.transport.timeout(timeout);
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.transport = self.transport.user_agent(user_agent);
        self
    }

    /// Add a default header that will be sent with every request.
    pub fn default_header(
        mut self,
        name: impl TryInto<http::HeaderName>,
        value: impl TryInto<http::HeaderValue>,
    ) -> Result<Self, TransportError> {
        self.transport = self.transport.default_header(name, value)?;
        Ok(self)
    }

    /// Add a default query parameter that will be sent with every request.
    pub fn default_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.transport = self.transport.default_param(key, value);
        self
    }

    /// Configure the transport directly.
    pub fn transport(
        mut self,
        configure: impl FnOnce(HttpTransportBuilder) -> HttpTransportBuilder,
    ) -> Self {
        self.transport = configure(self.transport);
        self
    }

    /// Report to an existing event bus instead of a new one.
    pub fn event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the transformer.
    pub fn build(self) -> Result<Transformer, TransportError> {
        let transport = self.transport.build()?;
        Ok(Transformer {
            transport: Arc::new(transport),
            events: self.events.unwrap_or_default(),
        })
    }
}

/// Whether `error` was raised by the transport rather than by transformation.
pub fn is_transport_error(error: &Error) -> bool {
    error.is_transport()
}
