//! HTTP request descriptor and fluent builder.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::context::RequestContext;
use super::shape::{ResponseShape, ScalarKind};
use super::transport::Transport;
use crate::error::Error;
use crate::event::EventBus;
use crate::mapping::{self, MappingOptions};

/// HTTP request methods.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// HTTP GET method.
    #[default]
    Get,
    /// HTTP POST method.
    Post,
    /// HTTP PUT method.
    Put,
    /// HTTP DELETE method.
    Delete,
    /// HTTP PATCH method.
    Patch,
    /// HTTP HEAD method.
    Head,
    /// HTTP OPTIONS method.
    Options,
}

impl HttpMethod {
    /// Convert to reqwest method.
    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
            Self::Patch => reqwest::Method::PATCH,
            Self::Head => reqwest::Method::HEAD,
            Self::Options => reqwest::Method::OPTIONS,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
            Self::Patch => write!(f, "PATCH"),
            Self::Head => write!(f, "HEAD"),
            Self::Options => write!(f, "OPTIONS"),
        }
    }
}

/// Everything the transport needs to perform one HTTP call.
///
/// Also used as the override set accepted by the `*_with` factories: its
/// headers, params, timeout and body are merged over the factory's own. Its
/// method and URL are ignored there; wrap a complete descriptor with
/// [`Request::new`] to choose both.
#[derive(Clone, Debug, Default)]
pub struct RequestConfig {
    /// The HTTP method.
    pub method: HttpMethod,
    /// Absolute URL, or a path resolved against the transport's base URL.
    pub url: String,
    /// Request headers.
    pub headers: http::HeaderMap,
    /// Query parameters.
    pub params: BTreeMap<String, String>,
    /// JSON body.
    pub data: Option<serde_json::Value>,
    /// Per-request timeout enforced by the transport.
    pub timeout: Option<Duration>,
}

impl RequestConfig {
    /// A descriptor for `method` on `url`.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            ..Default::default()
        }
    }

    /// Merge `overrides` into `self`; values set in `overrides` win.
    ///
    /// `method` and `url` always stay those of `self`.
    fn merge(mut self, overrides: RequestConfig) -> Self {
        self.headers.extend(overrides.headers);
        self.params.extend(overrides.params);
        if overrides.data.is_some() {
            self.data = overrides.data;
        }
        if overrides.timeout.is_some() {
            self.timeout = overrides.timeout;
        }
        self
    }
}

/// A request under construction.
///
/// Create one with a verb factory ([`Request::get`], [`Request::post`], ...)
/// or through a [`Transformer`](crate::Transformer), decorate it with the
/// chain methods, then pick the expected response shape to obtain a
/// [`RequestContext`].
///
/// Lifecycle events are only reported once an [`EventBus`] is bound, either
/// with [`Request::with_event_bus`] or by creating the request through a
/// `Transformer`. Without one, execution is silent.
///
/// # Example
///
/// ```ignore
/// let post: BlogPost = transformer
///     .get("/posts/1")
///     .with_name("load-post")
///     .add_header("Accept", "application/json")
///     .as_type::<BlogPost>()
///     .fetch_data()
///     .await?;
/// ```
#[derive(Clone)]
pub struct Request {
    config: RequestConfig,
    name: Option<String>,
    delay: Duration,
    transport: Option<Arc<dyn Transport>>,
    events: Option<EventBus>,
    deferred_error: Option<String>,
}

impl Request {
    /// Wrap a complete descriptor.
    pub fn new(config: RequestConfig) -> Self {
        Self {
            config,
            name: None,
            delay: Duration::ZERO,
            transport: None,
            events: None,
            deferred_error: None,
        }
    }

    fn without_body(method: HttpMethod, url: impl Into<String>, overrides: RequestConfig) -> Self {
        Self::new(RequestConfig::new(method, url).merge(overrides))
    }

    fn with_body<B: Serialize + ?Sized>(
        method: HttpMethod,
        url: impl Into<String>,
        body: &B,
        overrides: RequestConfig,
        options: &MappingOptions,
    ) -> Self {
        let mut config = RequestConfig::new(method, url);
        let mut deferred_error = None;
        match mapping::to_plain(body, options) {
            Ok(plain) => config.data = Some(plain),
            Err(e) => {
                tracing::error!(target: "horizon_lattice_fetch::http", "Failed to map request body: {}", e);
                deferred_error = Some(match e {
                    Error::Mapping(message) => message,
                    other => other.to_string(),
                });
            }
        }
        let mut request = Self::new(config.merge(overrides));
        request.deferred_error = deferred_error;
        request
    }

    /// A GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::get_with(url, RequestConfig::default())
    }

    /// A GET request with config overrides.
    ///
    /// The method and URL of `overrides` are ignored.
    pub fn get_with(url: impl Into<String>, overrides: RequestConfig) -> Self {
        Self::without_body(HttpMethod::Get, url, overrides)
    }

    /// A DELETE request.
    pub fn delete(url: impl Into<String>) -> Self {
        Self::delete_with(url, RequestConfig::default())
    }

    /// A DELETE request with config overrides.
    pub fn delete_with(url: impl Into<String>, overrides: RequestConfig) -> Self {
        Self::without_body(HttpMethod::Delete, url, overrides)
    }

    /// A HEAD request.
    pub fn head(url: impl Into<String>) -> Self {
        Self::head_with(url, RequestConfig::default())
    }

    /// A HEAD request with config overrides.
    pub fn head_with(url: impl Into<String>, overrides: RequestConfig) -> Self {
        Self::without_body(HttpMethod::Head, url, overrides)
    }

    /// An OPTIONS request.
    pub fn options(url: impl Into<String>) -> Self {
        Self::options_with(url, RequestConfig::default())
    }

    /// An OPTIONS request with config overrides.
    pub fn options_with(url: impl Into<String>, overrides: RequestConfig) -> Self {
        Self::without_body(HttpMethod::Options, url, overrides)
    }

    /// A POST request whose body is `body` mapped to a plain payload.
    pub fn post<B: Serialize + ?Sized>(url: impl Into<String>, body: &B) -> Self {
        Self::post_with(url, body, RequestConfig::default(), &MappingOptions::default())
    }

    /// A POST request with config overrides and mapping options.
    pub fn post_with<B: Serialize + ?Sized>(
        url: impl Into<String>,
        body: &B,
        overrides: RequestConfig,
        options: &MappingOptions,
    ) -> Self {
        Self::with_body(HttpMethod::Post, url, body, overrides, options)
    }

    /// A PUT request whose body is `body` mapped to a plain payload.
    pub fn put<B: Serialize + ?Sized>(url: impl Into<String>, body: &B) -> Self {
        Self::put_with(url, body, RequestConfig::default(), &MappingOptions::default())
    }

    /// A PUT request with config overrides and mapping options.
    pub fn put_with<B: Serialize + ?Sized>(
        url: impl Into<String>,
        body: &B,
        overrides: RequestConfig,
        options: &MappingOptions,
    ) -> Self {
        Self::with_body(HttpMethod::Put, url, body, overrides, options)
    }

    /// A PATCH request whose body is `body` mapped to a plain payload.
    pub fn patch<B: Serialize + ?Sized>(url: impl Into<String>, body: &B) -> Self {
        Self::patch_with(url, body, RequestConfig::default(), &MappingOptions::default())
    }

    /// A PATCH request with config overrides and mapping options.
    pub fn patch_with<B: Serialize + ?Sized>(
        url: impl Into<String>,
        body: &B,
        overrides: RequestConfig,
        options: &MappingOptions,
    ) -> Self {
        Self::with_body(HttpMethod::Patch, url, body, overrides, options)
    }

    /// Bind the transport that will perform the call.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Bind the bus that receives this request's lifecycle events.
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Label the request for observers.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Wait `millis` milliseconds before calling the transport.
    ///
    /// Negative values are clamped to zero.
    pub fn with_delay(mut self, millis: i64) -> Self {
        self.set_delay(millis);
        self
    }

    /// Set a timeout for this specific request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Add or replace a header.
    ///
    /// Invalid names or values are logged and ignored.
    pub fn add_header(
        mut self,
        name: impl TryInto<http::HeaderName>,
        value: impl TryInto<http::HeaderValue>,
    ) -> Self {
        match (name.try_into(), value.try_into()) {
            (Ok(name), Ok(value)) => {
                self.config.headers.insert(name, value);
            }
            _ => {
                tracing::warn!(target: "horizon_lattice_fetch::http", "Ignoring invalid header");
            }
        }
        self
    }

    /// Remove a header.
    pub fn remove_header(mut self, name: impl AsRef<str>) -> Self {
        self.config.headers.remove(name.as_ref());
        self
    }

    /// Add or replace a query parameter.
    pub fn add_params(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.params.insert(key.into(), value.into());
        self
    }

    /// Remove a query parameter.
    pub fn remove_params(mut self, key: impl AsRef<str>) -> Self {
        self.config.params.remove(key.as_ref());
        self
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    pub(crate) fn set_delay(&mut self, millis: i64) {
        self.delay = Duration::from_millis(millis.max(0) as u64);
    }

    pub(crate) fn set_transport(&mut self, transport: Arc<dyn Transport>) {
        self.transport = Some(transport);
    }

    pub(crate) fn deferred_error(&self) -> Option<String> {
        self.deferred_error.clone()
    }

    pub(crate) fn defer_error(&mut self, message: String) {
        self.deferred_error.get_or_insert(message);
    }

    /// The request descriptor.
    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    /// The request label, if one was set.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The artificial delay before the transport call.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// The bound transport, if any.
    pub fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref()
    }

    /// The bound event bus, if any.
    pub fn events(&self) -> Option<&EventBus> {
        self.events.as_ref()
    }

    /// The URL path without scheme, host, query or fragment.
    ///
    /// Meant for labeling; routing always uses the full URL.
    pub fn endpoint(&self) -> String {
        endpoint_of(&self.config.url)
    }

    /// Expect a new `T` decoded from the payload.
    pub fn as_type<T: DeserializeOwned>(self) -> RequestContext<T> {
        RequestContext::new(self, ResponseShape::Construct)
    }

    /// Expect the payload to be merged into `instance`.
    ///
    /// Fields missing from the payload keep the values `instance` has now.
    pub fn as_instance<T: Serialize + DeserializeOwned>(mut self, instance: T) -> RequestContext<T> {
        let shape = self.instance_shape(&instance);
        RequestContext::new(self, shape)
    }

    /// Expect a sequence of new `T` values.
    pub fn as_array_of<T: DeserializeOwned>(self) -> RequestContext<Vec<T>> {
        RequestContext::new(self, ResponseShape::ArrayOf(Box::new(ResponseShape::Construct)))
    }

    /// Expect a sequence whose elements are each merged into a copy of `template`.
    pub fn as_array_of_instance<T: Serialize + DeserializeOwned>(
        mut self,
        template: &T,
    ) -> RequestContext<Vec<T>> {
        let shape = self.instance_shape(template);
        RequestContext::new(self, ResponseShape::ArrayOf(Box::new(shape)))
    }

    /// Return the payload as-is.
    pub fn as_any(self) -> RequestContext<serde_json::Value> {
        RequestContext::new(self, ResponseShape::Passthrough(ScalarKind::Any))
    }

    /// Discard the payload.
    pub fn as_void(self) -> RequestContext<()> {
        RequestContext::new(self, ResponseShape::Passthrough(ScalarKind::Void))
    }

    /// Return the payload as a string.
    pub fn as_string(self) -> RequestContext<String> {
        RequestContext::new(self, ResponseShape::Passthrough(ScalarKind::String))
    }

    /// Return the payload as a number.
    pub fn as_number(self) -> RequestContext<f64> {
        RequestContext::new(self, ResponseShape::Passthrough(ScalarKind::Number))
    }

    /// Return the payload as a boolean.
    pub fn as_boolean(self) -> RequestContext<bool> {
        RequestContext::new(self, ResponseShape::Passthrough(ScalarKind::Boolean))
    }

    /// Use a shape given as a plain value.
    ///
    /// A plain value is neither an instance nor a type, so executing the
    /// returned context fails with `InvalidResponseShape`.
    pub fn as_untyped<T: DeserializeOwned>(self, shape: serde_json::Value) -> RequestContext<T> {
        RequestContext::new(self, ResponseShape::Untyped(shape))
    }

    fn instance_shape<T: Serialize>(&mut self, instance: &T) -> ResponseShape {
        match serde_json::to_value(instance) {
            Ok(template) => ResponseShape::Instance(template),
            Err(e) => {
                tracing::error!(target: "horizon_lattice_fetch::http", "Failed to map response instance: {}", e);
                self.defer_error(e.to_string());
                ResponseShape::Instance(serde_json::Value::Null)
            }
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("config", &self.config)
            .field("name", &self.name)
            .field("delay", &self.delay)
            .field("has_transport", &self.transport.is_some())
            .field("has_event_bus", &self.events.is_some())
            .finish()
    }
}

fn endpoint_of(url: &str) -> String {
    let url = url.split(['?', '#']).next().unwrap_or_default();
    let rest = url
        .strip_prefix("https:")
        .or_else(|| url.strip_prefix("http:"))
        .unwrap_or(url);
    match rest.strip_prefix("//") {
        Some(authority_and_path) => authority_and_path
            .find('/')
            .map_or_else(String::new, |idx| authority_and_path[idx..].to_string()),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct NewPost {
        title: String,
        user_id: u32,
    }

    #[test]
    fn test_verb_factories() {
        assert_eq!(Request::get("/a").config().method, HttpMethod::Get);
        assert_eq!(Request::delete("/a").config().method, HttpMethod::Delete);
        assert_eq!(Request::head("/a").config().method, HttpMethod::Head);
        assert_eq!(Request::options("/a").config().method, HttpMethod::Options);
        assert_eq!(Request::post("/a", &json!({})).config().method, HttpMethod::Post);
        assert_eq!(Request::put("/a", &json!({})).config().method, HttpMethod::Put);
        assert_eq!(Request::patch("/a", &json!({})).config().method, HttpMethod::Patch);
        assert_eq!(Request::get("/a").config().url, "/a");
    }

    #[test]
    fn test_delay_is_clamped() {
        assert_eq!(Request::get("/").with_delay(-5).delay(), Duration::ZERO);
        assert_eq!(
            Request::get("/").with_delay(50).delay(),
            Duration::from_millis(50)
        );
        assert_eq!(Request::get("/").delay(), Duration::ZERO);
    }

    #[test]
    fn test_headers_and_params() {
        let request = Request::get("https://api.example.com/posts")
            .with_name("list")
            .add_header("X-Test", "1")
            .add_header("X-Drop", "2")
            .remove_header("x-drop")
            .add_params("page", "1")
            .add_params("limit", "10")
            .remove_params("limit");

        let config = request.config();
        assert_eq!(config.headers.get("x-test").unwrap(), "1");
        assert!(config.headers.get("X-Drop").is_none());
        assert_eq!(config.params.get("page").map(String::as_str), Some("1"));
        assert!(!config.params.contains_key("limit"));
        assert_eq!(request.name(), Some("list"));
    }

    #[test]
    fn test_invalid_header_is_ignored() {
        let request = Request::get("/").add_header("bad header", "1");
        assert!(request.config().headers.is_empty());
    }

    #[test]
    fn test_remove_missing_entries_is_noop() {
        let request = Request::get("/").remove_header("X-None").remove_params("none");
        assert!(request.config().headers.is_empty());
        assert!(request.config().params.is_empty());
    }

    #[test]
    fn test_body_is_mapped() {
        let body = NewPost {
            title: "hello".into(),
            user_id: 3,
        };
        let options = MappingOptions::new().rename("user_id", "userId");
        let request = Request::post_with("/posts", &body, RequestConfig::default(), &options);

        assert_eq!(
            request.config().data,
            Some(json!({"title": "hello", "userId": 3}))
        );
    }

    #[test]
    fn test_overrides_are_merged() {
        let mut overrides = RequestConfig::default();
        overrides.params.insert("q".into(), "rust".into());
        overrides.timeout = Some(Duration::from_secs(2));
        overrides
            .headers
            .insert("accept", http::HeaderValue::from_static("application/json"));

        let request = Request::get_with("/search", overrides);
        let config = request.config();
        assert_eq!(config.method, HttpMethod::Get);
        assert_eq!(config.url, "/search");
        assert_eq!(config.params.get("q").map(String::as_str), Some("rust"));
        assert_eq!(config.timeout, Some(Duration::from_secs(2)));
        assert!(config.headers.contains_key("accept"));
    }

    #[test]
    fn test_override_method_and_url_are_ignored() {
        let overrides = RequestConfig::new(HttpMethod::Post, "/elsewhere");
        let request = Request::delete_with("/posts/1", overrides);
        assert_eq!(request.config().method, HttpMethod::Delete);
        assert_eq!(request.config().url, "/posts/1");

        let request = Request::patch_with(
            "/posts/1",
            &json!({"title": "t"}),
            RequestConfig::new(HttpMethod::Get, "/other"),
            &MappingOptions::default(),
        );
        assert_eq!(request.config().method, HttpMethod::Patch);
        assert_eq!(request.config().url, "/posts/1");
    }

    #[test]
    fn test_override_body_wins() {
        let overrides = RequestConfig {
            data: Some(json!({"replaced": true})),
            ..Default::default()
        };
        let request = Request::put_with(
            "/posts/1",
            &json!({"original": true}),
            overrides,
            &MappingOptions::default(),
        );
        assert_eq!(request.config().data, Some(json!({"replaced": true})));
    }

    #[test]
    fn test_endpoint_strips_origin_and_query() {
        let cases = [
            ("https://jsonplaceholder.typicode.com/posts/1", "/posts/1"),
            ("http://api.example.com/posts?page=2", "/posts"),
            ("//cdn.example.com/assets/app.js", "/assets/app.js"),
            ("https://example.com", ""),
            ("/users/7?expand=true#top", "/users/7"),
            ("users", "users"),
        ];
        for (url, expected) in cases {
            assert_eq!(Request::get(url).endpoint(), expected, "url: {url}");
        }
    }

    #[test]
    fn test_shape_selectors() {
        assert!(matches!(
            Request::get("/").as_type::<serde_json::Value>().shape(),
            ResponseShape::Construct
        ));
        assert!(matches!(
            Request::get("/").as_string().shape(),
            ResponseShape::Passthrough(ScalarKind::String)
        ));
        assert!(matches!(
            Request::get("/").as_array_of::<u32>().shape(),
            ResponseShape::ArrayOf(inner) if matches!(**inner, ResponseShape::Construct)
        ));
        assert!(matches!(
            Request::get("/").as_instance(json!({"id": 1})).shape(),
            ResponseShape::Instance(template) if template == &json!({"id": 1})
        ));
    }
}
