//! HTTP client error types.

use http::{Method, StatusCode};
use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Result type for HTTP client operations.
pub type Result<T> = std::result::Result<T, HttpClientError>;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Coarse classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The redirect limit was hit.
    TooManyRedirects,
    /// The URL scheme is not something the transport can speak.
    UnsupportedScheme,
    /// The peer presented a certificate signed by an unknown authority.
    UnknownAuthority,
    /// The attempt timed out.
    Timeout,
    /// The connection could not be established.
    Connect,
    /// Anything else (resets, DNS, TLS handshakes, protocol errors).
    Other,
}

impl TransportErrorKind {
    /// Whether failures of this kind come from configuration rather than the network.
    pub fn is_permanent(self) -> bool {
        matches!(
            self,
            Self::TooManyRedirects | Self::UnsupportedScheme | Self::UnknownAuthority
        )
    }
}

/// Error produced by a [`Transport`](crate::Transport) for a single attempt.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl TransportError {
    /// Create a transport error of the given kind.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create an unclassified transport error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    /// Create a timeout error for an attempt bounded by `timeout`.
    pub fn timeout(timeout: Duration) -> Self {
        Self::new(
            TransportErrorKind::Timeout,
            format!("attempt timed out after {:?}", timeout),
        )
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// The classification of this error.
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// The top-level message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Check whether `needle` occurs in this error or any of its sources.
    pub fn chain_contains(&self, needle: &str) -> bool {
        chain_contains(self, needle)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = classify_reqwest(&err);
        Self {
            kind,
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

fn classify_reqwest(err: &reqwest::Error) -> TransportErrorKind {
    if err.is_redirect() {
        TransportErrorKind::TooManyRedirects
    } else if err.is_builder() && chain_contains(err, "scheme") {
        TransportErrorKind::UnsupportedScheme
    } else if chain_contains(err, "UnknownIssuer") || chain_contains(err, "unknown issuer") {
        TransportErrorKind::UnknownAuthority
    } else if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else {
        TransportErrorKind::Other
    }
}

/// Walk an error and its sources looking for `needle` in their messages.
pub(crate) fn chain_contains(err: &(dyn StdError + 'static), needle: &str) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.to_string().contains(needle) {
            return true;
        }
        current = e.source();
    }
    false
}

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// A single attempt failed in the transport.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The call was cancelled by its caller.
    #[error("request cancelled")]
    Cancelled,

    /// The call ran past its deadline.
    #[error("request deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// Every attempt allowed by the retry budget failed.
    #[error(
        "{method} {url} giving up after {attempts} attempts: {}{source}",
        status_prefix(.status)
    )]
    GivingUp {
        /// Request method.
        method: Method,
        /// Fully resolved request URL.
        url: Url,
        /// Number of physical attempts made.
        attempts: u32,
        /// Status of the response seen on the last attempt, if any.
        status: Option<StatusCode>,
        /// Cause of the last failed attempt.
        source: Box<HttpClientError>,
    },

    /// The retry policy kept asking for another attempt on a response.
    #[error("retry policy rejected response with status {status}")]
    RejectedResponse {
        /// Status of the rejected response.
        status: StatusCode,
    },

    /// The server answered with an error status.
    #[error("HTTP {status}: {message}")]
    Response {
        /// Response status code.
        status: u16,
        /// Response body text.
        message: String,
    },

    /// The request body could not be read into memory.
    #[error("failed to read request body: {0}")]
    Body(#[source] std::io::Error),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid header name or value.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Underlying HTTP engine error outside of an attempt (client build, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

fn status_prefix(status: &Option<StatusCode>) -> String {
    match status {
        Some(status) => format!("response status {}: ", status.as_u16()),
        None => String::new(),
    }
}

impl HttpClientError {
    /// The transport error at the root of this error, if there is one.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(e) => Some(e),
            Self::GivingUp { source, .. } => source.transport_error(),
            _ => None,
        }
    }

    /// The transport error kind at the root of this error, if there is one.
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        self.transport_error().map(TransportError::kind)
    }

    /// Check if this is a timeout or deadline error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::DeadlineExceeded(_))
            || self.transport_kind() == Some(TransportErrorKind::Timeout)
    }

    /// Check if the caller cancelled the call.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if the retry budget was exhausted.
    pub fn is_giving_up(&self) -> bool {
        matches!(self, Self::GivingUp { .. })
    }

    /// Number of attempts made, when the error records it.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::GivingUp { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Get the HTTP status code associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::GivingUp { status, source, .. } => status
                .map(|s| s.as_u16())
                .or_else(|| source.status_code()),
            Self::RejectedResponse { status } => Some(status.as_u16()),
            Self::Response { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
