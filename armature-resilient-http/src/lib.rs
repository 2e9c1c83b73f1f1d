//! # Armature Resilient HTTP
//!
//! An HTTP client runtime that keeps requests going when networks misbehave.
//!
//! ## Features
//!
//! - **Retry with Backoff**: Pluggable retry policies and backoff strategies (exponential, jittered, linear, constant)
//! - **HTTP/2 Fallback**: Requests answered in HTTP/2 over an HTTP/1.1 connection are re-sent on an HTTP/2 transport
//! - **Error Classification**: Redirect loops, unsupported schemes and unknown CAs fail fast
//! - **Idle Connection Reaping**: Periodically closes idle connections for clients hitting many hosts
//! - **Reusable Bodies**: Request bodies are buffered once and replayed on every attempt
//! - **Hooks**: Before-request, after-response and final-error callbacks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use armature_resilient_http::{HttpClient, HttpClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpClient::new(HttpClientConfig::default())?;
//!
//!     let response = client
//!         .get("https://api.example.com/users")
//!         .send()
//!         .await?;
//!
//!     println!("Status: {}", response.status());
//!     Ok(())
//! }
//! ```
//!
//! ## Host Spraying
//!
//! ```rust,no_run
//! use armature_resilient_http::{BackoffStrategy, HttpClient, HttpClientConfig, HttpClientConfigBuilder};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HttpClientConfigBuilder::from_config(HttpClientConfig::spraying())
//!         .timeout(Duration::from_secs(10))
//!         .retry_max(2)
//!         .retry_backoff(BackoffStrategy::ExponentialJitter)
//!         .build();
//!
//!     let client = HttpClient::new(config)?;
//!
//!     for host in ["https://a.example.com", "https://b.example.com"] {
//!         match client.head(host).send().await {
//!             Ok(response) => println!("{host}: {}", response.status()),
//!             Err(e) => println!("{host}: {e}"),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

mod backoff;
mod body;
mod client;
mod config;
mod context;
mod error;
mod global;
mod hooks;
mod lifecycle;
mod link;
mod policy;
mod request;
mod response;
mod retry;
mod transport;

pub use backoff::{Backoff, BackoffStrategy};
pub use body::{RequestBody, ReusableReader};
pub use client::HttpClient;
pub use config::{HttpClientConfig, HttpClientConfigBuilder};
pub use context::CallContext;
pub use error::{HttpClientError, Result, TransportError, TransportErrorKind};
pub use global::{default_client, delete, get, head, options, patch, post, put};
pub use hooks::{Hooks, OnErrorFn, OnRequestFn, OnResponseFn};
pub use lifecycle::{IdleConnectionReaper, IDLE_CONNECTION_THRESHOLD};
pub use link::{filter_by_rel, parse_link_header, parse_link_headers, Link};
pub use policy::{
    default_retry_policy, host_spray_retry_policy, policy_fn, DefaultRetryPolicy, FnPolicy,
    RetryDecision, RetryPolicy,
};
pub use request::{Header, HeaderMode, Request, RequestBuilder, RequestConfig};
pub use response::Response;
pub use retry::{retry, run_with_retry, RetryOutcome, RetrySettings};
pub use transport::{
    is_transport_version_mismatch, Protocol, ReqwestTransport, Transport, TransportSelector,
    TransportSettings,
};

// Re-export common types
pub use bytes::Bytes;
pub use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
pub use tokio_util::sync::CancellationToken;
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use armature_resilient_http::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backoff::{Backoff, BackoffStrategy};
    pub use crate::body::{RequestBody, ReusableReader};
    pub use crate::client::HttpClient;
    pub use crate::config::{HttpClientConfig, HttpClientConfigBuilder};
    pub use crate::error::{HttpClientError, Result};
    pub use crate::hooks::Hooks;
    pub use crate::policy::{policy_fn, RetryDecision, RetryPolicy};
    pub use crate::request::{Header, RequestBuilder, RequestConfig};
    pub use crate::response::Response;
    pub use crate::transport::Transport;
    pub use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
}
