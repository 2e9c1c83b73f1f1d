//! Process-wide default client and shortcut functions.

use std::sync::OnceLock;

use crate::{HttpClient, HttpClientConfig, RequestBody, Response, Result};

static DEFAULT_CLIENT: OnceLock<HttpClient> = OnceLock::new();

/// The shared client built from [`HttpClientConfig::single`] on first use.
///
/// Construction errors are returned to the caller and the next call tries again.
pub fn default_client() -> Result<&'static HttpClient> {
    if let Some(client) = DEFAULT_CLIENT.get() {
        return Ok(client);
    }
    let client = HttpClient::new(HttpClientConfig::single())?;
    Ok(DEFAULT_CLIENT.get_or_init(|| client))
}

/// `GET` with the default client.
pub async fn get(url: impl Into<String>) -> Result<Response> {
    default_client()?.get(url).send().await
}

/// `HEAD` with the default client.
pub async fn head(url: impl Into<String>) -> Result<Response> {
    default_client()?.head(url).send().await
}

/// `POST` with the default client.
pub async fn post(url: impl Into<String>, body: impl Into<RequestBody>) -> Result<Response> {
    default_client()?.post(url).body(body).send().await
}

/// `PUT` with the default client.
pub async fn put(url: impl Into<String>, body: impl Into<RequestBody>) -> Result<Response> {
    default_client()?.put(url).body(body).send().await
}

/// `PATCH` with the default client.
pub async fn patch(url: impl Into<String>, body: impl Into<RequestBody>) -> Result<Response> {
    default_client()?.patch(url).body(body).send().await
}

/// `DELETE` with the default client.
pub async fn delete(url: impl Into<String>) -> Result<Response> {
    default_client()?.delete(url).send().await
}

/// `OPTIONS` with the default client.
pub async fn options(url: impl Into<String>) -> Result<Response> {
    default_client()?.options(url).send().await
}
