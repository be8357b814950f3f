use std::{fmt, future::Future, pin::Pin, sync::Arc};

use tokio_util::sync::CancellationToken;

use crate::{RawResponse, RequestDescriptor, TransportError};

pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = std::result::Result<RawResponse, TransportError>> + Send + 'a>>;

/// Sends a single HTTP request and returns the raw response.
///
/// Implementations must stop work and release the in-flight operation once
/// `abort` is cancelled. The executor cancels it when an attempt times out or
/// the caller cancels the whole call.
pub trait Transport: Send + Sync {
    fn send<'a>(
        &'a self,
        request: &'a RequestDescriptor,
        abort: CancellationToken,
    ) -> TransportFuture<'a>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send<'a>(
        &'a self,
        request: &'a RequestDescriptor,
        abort: CancellationToken,
    ) -> TransportFuture<'a> {
        (**self).send(request, abort)
    }
}

/// [`Transport`] backed by `reqwest`.
///
/// No client-level timeout is configured; the executor owns the deadline.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a preconfigured client (proxies, TLS roots, pooling).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Transport for ReqwestTransport {
    fn send<'a>(
        &'a self,
        request: &'a RequestDescriptor,
        abort: CancellationToken,
    ) -> TransportFuture<'a> {
        Box::pin(async move {
            let mut builder = self
                .http
                .request(request.method().into(), request.url());
            for (name, value) in request.headers() {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = request.body_ref() {
                let bytes = body.to_bytes().map_err(|err| {
                    TransportError::with_source("failed to encode request body", err).terminal()
                })?;
                builder = builder.body(bytes);
            }

            let exchange = async {
                let response = builder.send().await?;
                let status = response.status().as_u16();
                let body = response.bytes().await?;
                Ok::<_, TransportError>(RawResponse::new(status, body.to_vec()))
            };

            tokio::select! {
                biased;
                _ = abort.cancelled() => Err(TransportError::aborted()),
                result = exchange => result,
            }
        })
    }
}
