//! Executable requests.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::request::{Request, RequestConfig};
use super::response::{RawResponse, Response};
use super::shape::ResponseShape;
use super::transport::{HttpTransport, Transport};
use crate::error::{Error, Result};
use crate::event::{EventContext, LifecycleEvent};
use crate::mapping::MappingOptions;

/// A [`Request`] bound to the shape its response should take.
///
/// Executing a context runs the whole lifecycle: `RequestStart`, the optional
/// delay, the transport call, then either `RequestError` or `RequestEnd` and
/// `TransformStart`, and finally `TransformEnd` once the payload has been
/// transformed. Pass-through shapes skip `TransformEnd`.
///
/// A context may be executed any number of times; every execution sends a new
/// request. A context without a bound transport builds a default
/// [`HttpTransport`] on first execution and reuses it afterwards.
pub struct RequestContext<T> {
    request: Request,
    shape: ResponseShape,
    default_transport: OnceLock<Arc<dyn Transport>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> RequestContext<T> {
    pub(crate) fn new(request: Request, shape: ResponseShape) -> Self {
        Self {
            request,
            shape,
            default_transport: OnceLock::new(),
            _marker: PhantomData,
        }
    }

    /// The underlying request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The request descriptor.
    pub fn config(&self) -> &RequestConfig {
        self.request.config()
    }

    /// The request label, if one was set.
    pub fn name(&self) -> Option<&str> {
        self.request.name()
    }

    /// The artificial delay before the transport call.
    pub fn delay(&self) -> Duration {
        self.request.delay()
    }

    /// The URL path without scheme, host, query or fragment.
    pub fn endpoint(&self) -> String {
        self.request.endpoint()
    }

    /// The expected response shape.
    pub fn shape(&self) -> &ResponseShape {
        &self.shape
    }

    /// Label the request for observers.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.request.set_name(name.into());
        self
    }

    /// Wait `millis` milliseconds before calling the transport.
    ///
    /// Negative values are clamped to zero.
    pub fn with_delay(mut self, millis: i64) -> Self {
        self.request.set_delay(millis);
        self
    }

    /// Bind the transport that will perform the call.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.request.set_transport(transport);
        self
    }

    fn emit(&self, event: &LifecycleEvent<'_>) {
        match self.request.events() {
            Some(events) => events.emit(event),
            None => {
                tracing::trace!(target: "horizon_lattice_fetch::event", event = %event.kind(), "no event bus bound")
            }
        }
    }

    fn event_context(&self) -> EventContext<'_> {
        EventContext::new(&self.request, &self.shape)
    }

    async fn call_transport(&self) -> Result<RawResponse> {
        let delay = self.request.delay();
        if !delay.is_zero() {
            tracing::trace!(target: "horizon_lattice_fetch::http", ?delay, "delaying request");
            tokio::time::sleep(delay).await;
        }

        let transport = self.transport()?;
        Ok(transport.request(self.request.config()).await?)
    }

    /// The bound transport, or the lazily built default one.
    fn transport(&self) -> Result<Arc<dyn Transport>> {
        if let Some(transport) = self.request.transport() {
            return Ok(transport.clone());
        }
        if let Some(transport) = self.default_transport.get() {
            return Ok(transport.clone());
        }
        tracing::debug!(target: "horizon_lattice_fetch::http", "building default transport");
        let built: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
        Ok(self.default_transport.get_or_init(|| built).clone())
    }
}

impl<T: DeserializeOwned> RequestContext<T> {
    /// Execute the request and return the full response.
    pub async fn fetch_response(&self) -> Result<Response<T>> {
        self.fetch_response_with(&MappingOptions::default()).await
    }

    /// Execute the request, applying `options` while transforming the payload.
    pub async fn fetch_response_with(&self, options: &MappingOptions) -> Result<Response<T>> {
        if let Some(message) = self.request.deferred_error() {
            return Err(Error::Mapping(message));
        }

        tracing::debug!(
            target: "horizon_lattice_fetch::http",
            method = %self.config().method,
            url = %self.config().url,
            name = self.name(),
            "executing request"
        );

        self.emit(&LifecycleEvent::RequestStart(self.event_context()));

        let mut raw = match self.call_transport().await {
            Ok(raw) => raw,
            Err(error) => {
                tracing::debug!(target: "horizon_lattice_fetch::http", %error, "request failed");
                self.emit(&LifecycleEvent::RequestError(self.event_context(), &error));
                return Err(error);
            }
        };

        self.emit(&LifecycleEvent::RequestEnd(self.event_context(), &raw));
        self.emit(&LifecycleEvent::TransformStart(self.event_context(), &raw));

        let payload = match raw.data.take() {
            Some(data) => data,
            None => parse_text(&raw.text),
        };

        if self.shape.is_passthrough() {
            let data = serde_json::from_value(self.shape.transform(payload, options)?)?;
            return Ok(Response::from_raw(raw, data));
        }

        let transformed = self.shape.transform(payload, options)?;
        let data = serde_json::from_value(transformed.clone())?;
        raw.data = Some(transformed);

        self.emit(&LifecycleEvent::TransformEnd(self.event_context(), &raw));

        Ok(Response::from_raw(raw, data))
    }

    /// Execute the request and return only the transformed payload.
    pub async fn fetch_data(&self) -> Result<T> {
        self.fetch_response().await.map(Response::into_data)
    }

    /// Execute the request with mapping options and return only the payload.
    pub async fn fetch_data_with(&self, options: &MappingOptions) -> Result<T> {
        self.fetch_response_with(options)
            .await
            .map(Response::into_data)
    }
}

impl<T> fmt::Debug for RequestContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request", &self.request)
            .field("shape", &self.shape)
            .finish()
    }
}

/// Decode a body the transport left undecoded. An empty body is an empty object.
fn parse_text(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::event::{EventBus, EventKind};
    use crate::http::{Interceptors, TransportConfig};
    use futures_util::future::BoxFuture;
    use parking_lot::{Mutex, RwLock};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    struct StaticTransport {
        reply: std::result::Result<Value, TransportError>,
        calls: Mutex<Vec<RequestConfig>>,
        defaults: RwLock<TransportConfig>,
        interceptors: Interceptors,
    }

    impl StaticTransport {
        fn replying(reply: std::result::Result<Value, TransportError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: Mutex::new(Vec::new()),
                defaults: RwLock::new(TransportConfig::default()),
                interceptors: Interceptors::default(),
            })
        }
    }

    impl Transport for StaticTransport {
        fn request<'a>(
            &'a self,
            config: &'a RequestConfig,
        ) -> BoxFuture<'a, std::result::Result<RawResponse, TransportError>> {
            self.calls.lock().push(config.clone());
            let reply = self
                .reply
                .clone()
                .map(|data| RawResponse::new(200, config.clone()).with_data(data));
            Box::pin(async move { reply })
        }

        fn defaults(&self) -> &RwLock<TransportConfig> {
            &self.defaults
        }

        fn interceptors(&self) -> &Interceptors {
            &self.interceptors
        }
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Post {
        id: Option<u32>,
        title: Option<String>,
        draft: bool,
    }

    fn record(bus: &EventBus) -> Arc<Mutex<Vec<EventKind>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in EventKind::ALL {
            let seen = seen.clone();
            bus.subscribe(kind, move |event| seen.lock().push(event.kind()));
        }
        seen
    }

    #[tokio::test]
    async fn test_typed_fetch_emits_full_lifecycle() {
        let transport = StaticTransport::replying(Ok(json!({"id": 1, "title": "hello"})));
        let bus = EventBus::new();
        let seen = record(&bus);

        let post = Request::get("/posts/1")
            .with_transport(transport.clone())
            .with_event_bus(bus)
            .as_type::<Post>()
            .fetch_data()
            .await
            .unwrap();

        assert_eq!(post.id, Some(1));
        assert_eq!(post.title.as_deref(), Some("hello"));
        assert_eq!(
            *seen.lock(),
            vec![
                EventKind::RequestStart,
                EventKind::RequestEnd,
                EventKind::TransformStart,
                EventKind::TransformEnd,
            ]
        );
        assert_eq!(transport.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_passthrough_skips_transform_end() {
        let transport = StaticTransport::replying(Ok(json!({"ok": true})));
        let bus = EventBus::new();
        let seen = record(&bus);

        let data = Request::delete("/posts/1")
            .with_transport(transport)
            .with_event_bus(bus)
            .as_any()
            .fetch_data()
            .await
            .unwrap();

        assert_eq!(data, json!({"ok": true}));
        assert!(!seen.lock().contains(&EventKind::TransformEnd));
        assert!(seen.lock().contains(&EventKind::TransformStart));
    }

    #[tokio::test]
    async fn test_transport_failure_emits_request_error_only() {
        let transport = StaticTransport::replying(Err(TransportError::HttpStatus {
            status: 404,
            message: None,
        }));
        let bus = EventBus::new();
        let seen = record(&bus);

        let err = Request::get("/missing")
            .with_transport(transport)
            .with_event_bus(bus)
            .as_type::<Post>()
            .fetch_data()
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(404));
        assert_eq!(
            *seen.lock(),
            vec![EventKind::RequestStart, EventKind::RequestError]
        );
    }

    #[tokio::test]
    async fn test_instance_keeps_unset_fields() {
        let transport = StaticTransport::replying(Ok(json!({"id": 101})));
        let draft = Post {
            id: None,
            title: Some("draft title".into()),
            draft: true,
        };

        let post = Request::post("/posts", &draft)
            .with_transport(transport.clone())
            .as_instance(draft)
            .fetch_data()
            .await
            .unwrap();

        assert_eq!(
            post,
            Post {
                id: Some(101),
                title: Some("draft title".into()),
                draft: true,
            }
        );
        assert_eq!(
            transport.calls.lock()[0].data,
            Some(json!({"id": null, "title": "draft title", "draft": true}))
        );
    }

    #[tokio::test]
    async fn test_transform_end_carries_transformed_payload() {
        let transport = StaticTransport::replying(Ok(json!({"id": 5, "secret": "x"})));
        let bus = EventBus::new();
        let captured = Arc::new(Mutex::new(None));
        let sink = captured.clone();
        bus.subscribe(EventKind::TransformEnd, move |event| {
            *sink.lock() = event.response().and_then(|r| r.data.clone());
        });

        Request::get("/posts/5")
            .with_transport(transport)
            .with_event_bus(bus)
            .as_type::<Post>()
            .fetch_data_with(&MappingOptions::new().exclude("secret"))
            .await
            .unwrap();

        assert_eq!(*captured.lock(), Some(json!({"id": 5})));
    }

    #[tokio::test]
    async fn test_deferred_mapping_error_fires_no_events() {
        struct Unserializable;
        impl Serialize for Unserializable {
            fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("not serializable"))
            }
        }

        let transport = StaticTransport::replying(Ok(json!({})));
        let bus = EventBus::new();
        let seen = record(&bus);

        let err = Request::post("/posts", &Unserializable)
            .with_transport(transport.clone())
            .with_event_bus(bus)
            .as_any()
            .fetch_data()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Mapping(msg) if msg.contains("not serializable")));
        assert!(seen.lock().is_empty());
        assert!(transport.calls.lock().is_empty());
    }

    #[test]
    fn test_context_chain_methods() {
        let context = Request::get("https://example.com/posts?page=1")
            .as_string()
            .with_name("posts")
            .with_delay(-10);

        assert_eq!(context.name(), Some("posts"));
        assert_eq!(context.delay(), Duration::ZERO);
        assert_eq!(context.endpoint(), "/posts");
        assert_eq!(context.config().url, "https://example.com/posts?page=1");
    }

    #[test]
    fn test_default_transport_is_built_once() {
        let context = Request::get("https://example.com/posts").as_any();
        let first = context.transport().unwrap();
        let second = context.transport().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let bound: Arc<dyn Transport> = StaticTransport::replying(Ok(json!({})));
        let context = Request::get("/posts").as_any().with_transport(bound.clone());
        assert!(Arc::ptr_eq(&context.transport().unwrap(), &bound));
    }

    #[test]
    fn test_parse_text() {
        assert_eq!(parse_text(""), json!({}));
        assert_eq!(parse_text("[1,2]"), json!([1, 2]));
        assert_eq!(parse_text("hello"), json!("hello"));
    }
}
