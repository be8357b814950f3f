use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// No response arrived before the per-attempt deadline.
    #[error("request timed out after {timeout:?}")]
    Timeout { timeout: Duration },
    /// Connection or transport failure; no response was received.
    #[error("network error: {0}")]
    Network(#[source] TransportError),
    /// 5xx response with raw response body.
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    /// Any other non-success response (4xx, unhandled 3xx) with raw body.
    #[error("client error {status}: {body}")]
    ClientError { status: u16, body: String },
    /// Successful response whose payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// The request body could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),
    /// The caller's cancellation signal fired.
    #[error("request cancelled")]
    Cancelled,
    /// The retry policy cannot be executed.
    #[error("invalid retry policy: {0}")]
    InvalidPolicy(String),
}

impl RequestError {
    /// Returns `true` for failures that may succeed on another attempt:
    /// timeouts, connection failures and 5xx responses.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::ServerError { .. } => true,
            Self::Network(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// HTTP status carried by the error, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ServerError { status, .. } | Self::ClientError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure reported by a [`Transport`](crate::Transport) when no response
/// could be obtained.
///
/// Connection-level failures are retryable. Failures caused by the request
/// itself (unparsable URL, invalid header, unencodable body) are not.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    retryable: bool,
    #[source]
    source: Option<BoxError>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
            source: Some(source.into()),
        }
    }

    /// The request could not be built or sent as described; another attempt
    /// would fail the same way.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            ..Self::new(message)
        }
    }

    /// Marks this failure as terminal.
    pub fn terminal(mut self) -> Self {
        self.retryable = false;
        self
    }

    /// The in-flight operation was aborted through its abort token.
    pub fn aborted() -> Self {
        Self::new("request aborted")
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return Self::with_source(format!("invalid request: {err}"), err).terminal();
        }
        let message = if err.is_connect() {
            "connection failed"
        } else if err.is_body() || err.is_decode() {
            "failed to read response body"
        } else {
            "request failed"
        };
        Self::with_source(format!("{message}: {err}"), err)
    }
}

/// Error returned while loading [`ApiConfig`](crate::ApiConfig) from the
/// environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing {0} environment variable")]
    Missing(&'static str),
    #[error("{0} is set but empty")]
    Empty(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}
