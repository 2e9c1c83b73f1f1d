//! HTTP response wrapper.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use http::{HeaderMap, StatusCode, Version};
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::link::{parse_link_headers, Link};
use crate::{HttpClientError, Result};

/// HTTP response wrapper.
///
/// The body is not buffered: it streams from the connection until read,
/// consumed, or dropped.
#[derive(Debug)]
pub struct Response {
    inner: reqwest::Response,
}

impl Response {
    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    /// Check if the response was successful (2xx).
    pub fn is_success(&self) -> bool {
        self.status().is_success()
    }

    /// Check if the response was a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    /// Check if the response was a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }

    /// Get the response headers.
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers()
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Get the response URL.
    pub fn url(&self) -> &url::Url {
        self.inner.url()
    }

    /// Get the HTTP version the response was received with.
    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// Get the content length if available.
    pub fn content_length(&self) -> Option<u64> {
        self.inner.content_length()
    }

    /// Get the content type if available.
    pub fn content_type(&self) -> Option<&str> {
        self.header(http::header::CONTENT_TYPE)
    }

    /// Links advertised in `Link` headers.
    pub fn links(&self) -> Vec<Link> {
        parse_link_headers(
            self.headers()
                .get_all(http::header::LINK)
                .iter()
                .filter_map(|v| v.to_str().ok()),
        )
    }

    /// Consume the response and return the body as bytes.
    pub async fn bytes(self) -> Result<Bytes> {
        Ok(self.inner.bytes().await?)
    }

    /// Consume the response and return the body as text.
    pub async fn text(self) -> Result<String> {
        Ok(self.inner.text().await?)
    }

    /// Consume the response and parse the body as JSON.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let body = self.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| HttpClientError::Json(e.to_string()))
    }

    /// Read the next chunk of the body.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>> {
        Ok(self.inner.chunk().await?)
    }

    /// Consume the response as a stream of body chunks.
    pub fn bytes_stream(self) -> impl Stream<Item = Result<Bytes>> {
        self.inner.bytes_stream().map(|chunk| chunk.map_err(HttpClientError::from))
    }

    /// The underlying reqwest response.
    pub fn into_inner(self) -> reqwest::Response {
        self.inner
    }

    /// Turn 4xx and 5xx responses into [`HttpClientError::Response`].
    pub async fn error_for_status(self) -> Result<Self> {
        let status = self.status();
        if status.is_client_error() || status.is_server_error() {
            let message = self
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(HttpClientError::Response {
                status: status.as_u16(),
                message,
            })
        } else {
            Ok(self)
        }
    }

    /// Read and discard up to `limit` bytes so the connection can be reused,
    /// then close the body.
    pub(crate) async fn drain(mut self, limit: u64) {
        let mut drained = 0u64;
        while drained < limit {
            match self.inner.chunk().await {
                Ok(Some(chunk)) => drained += chunk.len() as u64,
                Ok(None) => break,
                Err(e) => {
                    trace!(error = %e, "Failed to drain response body");
                    break;
                }
            }
        }
        trace!(status = %self.status(), drained, "Discarded response body");
    }
}

impl From<reqwest::Response> for Response {
    fn from(inner: reqwest::Response) -> Self {
        Self { inner }
    }
}

impl<T: Into<reqwest::Body>> From<http::Response<T>> for Response {
    fn from(response: http::Response<T>) -> Self {
        Self {
            inner: response.into(),
        }
    }
}
