//! The transport seam and its reqwest implementation.
//!
//! A [`Transport`] performs the actual HTTP call for a [`RequestConfig`].
//! [`HttpTransport`] is the default implementation on top of `reqwest`; it
//! resolves URLs against a base URL, applies default headers and params,
//! runs the interceptor chains and rejects responses outside the accepted
//! status range.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use reqwest::redirect::Policy;

use super::request::RequestConfig;
use super::response::RawResponse;
use crate::error::TransportError;

/// Performs HTTP calls on behalf of request contexts.
///
/// Implementations own their configuration defaults and interceptor chains;
/// the [`Transformer`](crate::Transformer) exposes both without interpreting
/// them.
pub trait Transport: Send + Sync {
    /// Perform the call described by `config`.
    fn request<'a>(
        &'a self,
        config: &'a RequestConfig,
    ) -> BoxFuture<'a, Result<RawResponse, TransportError>>;

    /// Configuration defaults applied to every call.
    fn defaults(&self) -> &RwLock<TransportConfig>;

    /// Request and response interceptor chains.
    fn interceptors(&self) -> &Interceptors;

    /// The full URL `config` would be sent to.
    fn get_uri(&self, config: &RequestConfig) -> Result<String, TransportError> {
        resolve_url(&self.defaults().read(), config).map(String::from)
    }
}

/// Defaults shared by every call of a transport.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Base URL for relative request URLs.
    pub base_url: Option<String>,
    /// Headers sent with every request; request headers win.
    pub headers: http::HeaderMap,
    /// Query parameters sent with every request; request params win.
    pub params: BTreeMap<String, String>,
    /// Request timeout, unless the request sets its own.
    pub timeout: Option<Duration>,
    /// Connect timeout. Read when the transport is built.
    pub connect_timeout: Option<Duration>,
    /// Maximum number of redirects to follow. Read when the transport is built.
    pub max_redirects: usize,
    /// User agent header.
    pub user_agent: Option<String>,
    /// Status codes treated as success; others fail with `HttpStatus`.
    pub accept_status: Range<u16>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            headers: http::HeaderMap::new(),
            params: BTreeMap::new(),
            timeout: Some(Duration::from_secs(30)),
            connect_timeout: Some(Duration::from_secs(10)),
            max_redirects: 10,
            user_agent: Some(format!(
                "HorizonLatticeFetch/{} (Rust)",
                env!("CARGO_PKG_VERSION")
            )),
            accept_status: 200..300,
        }
    }
}

/// Resolve the final URL of `config`, including default and request params.
pub fn resolve_url(
    defaults: &TransportConfig,
    config: &RequestConfig,
) -> Result<url::Url, TransportError> {
    let mut url = match url::Url::parse(&config.url) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = defaults.base_url.as_deref().ok_or_else(|| {
                TransportError::InvalidUrl(format!("relative URL without a base: {}", config.url))
            })?;
            let path = if config.url.starts_with('/') || config.url.is_empty() {
                config.url.clone()
            } else {
                format!("/{}", config.url)
            };
            url::Url::parse(&format!("{}{}", base.trim_end_matches('/'), path))?
        }
        Err(e) => return Err(e.into()),
    };

    let mut params = defaults.params.clone();
    params.extend(config.params.iter().map(|(k, v)| (k.clone(), v.clone())));
    if !params.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &params {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}

/// Identifier of a registered interceptor, used to eject it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InterceptorId(u64);

impl InterceptorId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Request interceptors may rewrite the outgoing descriptor.
pub type RequestInterceptor = dyn Fn(&mut RequestConfig) + Send + Sync;

/// Response interceptors may rewrite the response or reject it.
pub type ResponseInterceptor = dyn Fn(&mut RawResponse) -> Result<(), TransportError> + Send + Sync;

/// An ordered chain of interceptors.
pub struct InterceptorManager<F: ?Sized> {
    entries: Mutex<Vec<(InterceptorId, Arc<F>)>>,
}

impl<F: ?Sized> Default for InterceptorManager<F> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<F: ?Sized> InterceptorManager<F> {
    fn push(&self, interceptor: Arc<F>) -> InterceptorId {
        let id = InterceptorId::new();
        self.entries.lock().push((id, interceptor));
        id
    }

    /// Remove a previously registered interceptor.
    ///
    /// Returns `false` if the id is unknown.
    pub fn eject(&self, id: InterceptorId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(it, _)| *it != id);
        entries.len() != before
    }

    /// Remove all interceptors.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of registered interceptors.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The interceptors in registration order.
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries
            .lock()
            .iter()
            .map(|(_, interceptor)| interceptor.clone())
            .collect()
    }
}

impl InterceptorManager<RequestInterceptor> {
    /// Append a request interceptor.
    ///
    /// # Example
    ///
    /// ```ignore
    /// transformer.interceptors().request.use_interceptor(|config| {
    ///     config.params.insert("api_version".into(), "2".into());
    /// });
    /// ```
    pub fn use_interceptor<F>(&self, interceptor: F) -> InterceptorId
    where
        F: Fn(&mut RequestConfig) + Send + Sync + 'static,
    {
        self.push(Arc::new(interceptor))
    }
}

impl InterceptorManager<ResponseInterceptor> {
    /// Append a response interceptor.
    ///
    /// # Example
    ///
    /// ```ignore
    /// transformer.interceptors().response.use_interceptor(|response| {
    ///     if response.status == 401 {
    ///         return Err(TransportError::Interceptor("token expired".into()));
    ///     }
    ///     Ok(())
    /// });
    /// ```
    pub fn use_interceptor<F>(&self, interceptor: F) -> InterceptorId
    where
        F: Fn(&mut RawResponse) -> Result<(), TransportError> + Send + Sync + 'static,
    {
        self.push(Arc::new(interceptor))
    }
}

impl<F: ?Sized> fmt::Debug for InterceptorManager<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorManager")
            .field("len", &self.len())
            .finish()
    }
}

/// Interceptor chains of a transport.
#[derive(Debug, Default)]
pub struct Interceptors {
    /// Run in order before each request is sent.
    pub request: InterceptorManager<RequestInterceptor>,
    /// Run in order after each accepted response.
    pub response: InterceptorManager<ResponseInterceptor>,
}

/// Builder for an [`HttpTransport`].
pub struct HttpTransportBuilder {
    config: TransportConfig,
}

impl Default for HttpTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransportBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: TransportConfig::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: TransportConfig) -> Self {
        Self { config }
    }

    /// Resolve relative request URLs against `base_url`.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = Some(base_url.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Disable request timeout.
    pub fn no_timeout(mut self) -> Self {
        self.config.timeout = None;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Set the maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Disable redirect following.
    pub fn no_redirects(mut self) -> Self {
        self.config.max_redirects = 0;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Add a default header that will be sent with every request.
    pub fn default_header(
        mut self,
        name: impl TryInto<http::HeaderName>,
        value: impl TryInto<http::HeaderValue>,
    ) -> Result<Self, TransportError> {
        let name = name
            .try_into()
            .map_err(|_| TransportError::InvalidHeader("Invalid header name".to_string()))?;
        let value = value
            .try_into()
            .map_err(|_| TransportError::InvalidHeader("Invalid header value".to_string()))?;
        self.config.headers.insert(name, value);
        Ok(self)
    }

    /// Add a default query parameter that will be sent with every request.
    pub fn default_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.params.insert(key.into(), value.into());
        self
    }

    /// Treat only these status codes as success.
    pub fn accept_status(mut self, range: Range<u16>) -> Self {
        self.config.accept_status = range;
        self
    }

    /// Build the transport.
    pub fn build(self) -> Result<HttpTransport, TransportError> {
        let mut builder = reqwest::Client::builder();

        if let Some(connect_timeout) = self.config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }

        if self.config.max_redirects > 0 {
            builder = builder.redirect(Policy::limited(self.config.max_redirects));
        } else {
            builder = builder.redirect(Policy::none());
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(HttpTransport {
            client,
            defaults: RwLock::new(self.config),
            interceptors: Interceptors::default(),
        })
    }
}

/// The default transport, backed by `reqwest`.
///
/// Timeouts, default headers, default params and the accepted status range
/// are read from [`Transport::defaults`] on every call, so changes apply to
/// subsequent requests.
pub struct HttpTransport {
    client: reqwest::Client,
    defaults: RwLock<TransportConfig>,
    interceptors: Interceptors,
}

impl HttpTransport {
    /// Create a transport with default configuration.
    pub fn new() -> Result<Self, TransportError> {
        HttpTransportBuilder::new().build()
    }

    /// Create a builder for configuring a new transport.
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::new()
    }

    async fn execute(&self, config: &RequestConfig) -> Result<RawResponse, TransportError> {
        let mut config = config.clone();
        for interceptor in self.interceptors.request.snapshot() {
            interceptor(&mut config);
        }

        let (url, timeout, accept_status) = {
            let defaults = self.defaults.read();
            let mut headers = defaults.headers.clone();
            if let Some(ua) = &defaults.user_agent
                && !headers.contains_key(http::header::USER_AGENT)
            {
                headers.insert(http::header::USER_AGENT, http::HeaderValue::try_from(ua.as_str())?);
            }
            headers.extend(std::mem::take(&mut config.headers));
            config.headers = headers;
            (
                resolve_url(&defaults, &config)?,
                config.timeout.or(defaults.timeout),
                defaults.accept_status.clone(),
            )
        };

        tracing::debug!(target: "horizon_lattice_fetch::http", method = %config.method, %url, "sending request");

        let mut req_builder = self
            .client
            .request(config.method.to_reqwest(), url)
            .headers(config.headers.clone());

        if let Some(timeout) = timeout {
            req_builder = req_builder.timeout(timeout);
        }

        if let Some(data) = &config.data {
            req_builder = req_builder.json(data);
        }

        let response = req_builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let final_url = response.url().to_string();
        let text = response.text().await?;

        if !accept_status.contains(&status) {
            tracing::debug!(target: "horizon_lattice_fetch::http", status, "rejecting response status");
            return Err(TransportError::HttpStatus {
                status,
                message: (!text.is_empty()).then_some(text),
            });
        }

        let mut raw = RawResponse {
            data: Some(decode_body(&text)),
            status,
            headers,
            url: final_url,
            config,
            text,
        };

        for interceptor in self.interceptors.response.snapshot() {
            interceptor(&mut raw)?;
        }

        Ok(raw)
    }
}

impl Transport for HttpTransport {
    fn request<'a>(
        &'a self,
        config: &'a RequestConfig,
    ) -> BoxFuture<'a, Result<RawResponse, TransportError>> {
        Box::pin(self.execute(config))
    }

    fn defaults(&self) -> &RwLock<TransportConfig> {
        &self.defaults
    }

    fn interceptors(&self) -> &Interceptors {
        &self.interceptors
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("defaults", &*self.defaults.read())
            .field("interceptors", &self.interceptors)
            .finish()
    }
}

/// JSON bodies are decoded; anything else is kept as a string.
fn decode_body(text: &str) -> serde_json::Value {
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::Value::String(text.to_string()))
}
