//! `retrying-http` issues one logical HTTP request at a time with a
//! per-attempt timeout and a bounded, fixed-delay retry policy.
//!
//! - [`RetryingRequestExecutor::execute`] runs a [`RequestDescriptor`] under a
//!   [`RetryPolicy`]
//! - [`RetryingRequestExecutor::execute_with_cancel`] adds an external
//!   cancellation signal
//! - [`ApiClient`] wraps the executor with `get`/`post`/`put`/`delete` against
//!   a base URL
//!
//! Timeouts, connection failures and 5xx responses are retried; every other
//! failure ends the call immediately.

mod client;
mod config;
mod error;
mod executor;
mod policy;
mod request;
mod sleeper;
mod transport;
mod types;

pub use client::ApiClient;
pub use config::ApiConfig;
pub use error::{ConfigError, RequestError, TransportError};
pub use executor::{classify, RetryingRequestExecutor};
pub use policy::RetryPolicy;
pub use request::{Body, Method, RequestDescriptor};
pub use sleeper::{InstantSleeper, SleepFuture, Sleeper, TokioSleeper, TrackingSleeper};
pub use transport::{ReqwestTransport, Transport, TransportFuture};
pub use types::{AttemptOutcome, RawResponse, Response};

pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, RequestError>;
