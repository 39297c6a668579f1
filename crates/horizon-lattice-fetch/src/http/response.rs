//! HTTP response types.

use super::request::RequestConfig;

/// A response as produced by a [`Transport`](super::Transport).
///
/// `data` holds the decoded payload. After a successful transformation it is
/// replaced with the transformed payload.
#[derive(Clone, Debug)]
pub struct RawResponse {
    /// The decoded payload, if the transport decoded one.
    pub data: Option<serde_json::Value>,
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: http::HeaderMap,
    /// Final URL after redirects.
    pub url: String,
    /// The descriptor the request was sent with.
    pub config: RequestConfig,
    /// The raw body text.
    pub text: String,
}

impl RawResponse {
    /// An empty response with the given status.
    pub fn new(status: u16, config: RequestConfig) -> Self {
        Self {
            data: None,
            status,
            headers: http::HeaderMap::new(),
            url: config.url.clone(),
            config,
            text: String::new(),
        }
    }

    /// Set the decoded payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Set the raw body text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Check if the response indicates success (2xx status).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        header_value(&self.headers, name.as_ref())
    }
}

/// A response whose payload has been turned into `T`.
#[derive(Clone, Debug)]
pub struct Response<T> {
    /// The typed payload.
    pub data: T,
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: http::HeaderMap,
    /// Final URL after redirects.
    pub url: String,
    /// The descriptor the request was sent with.
    pub config: RequestConfig,
}

impl<T> Response<T> {
    pub(crate) fn from_raw(raw: RawResponse, data: T) -> Self {
        Self {
            data,
            status: raw.status,
            headers: raw.headers,
            url: raw.url,
            config: raw.config,
        }
    }

    /// Check if the response indicates success (2xx status).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        header_value(&self.headers, name.as_ref())
    }

    /// Get the Content-Type header value.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Take the payload.
    pub fn into_data(self) -> T {
        self.data
    }
}

fn header_value<'a>(headers: &'a http::HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
