use serde::de::DeserializeOwned;

use crate::{RequestError, Result};

/// Status and body bytes as handed back by a transport, before decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    pub(crate) fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Successful response with its decoded JSON payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: serde_json::Value,
}

impl Response {
    /// Deserializes the payload into `T`.
    pub fn json<T: DeserializeOwned>(self) -> Result<T> {
        serde_json::from_value(self.body).map_err(|err| {
            RequestError::Decode(format!("response payload does not match target type: {err}"))
        })
    }
}

/// Classified result of a single attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(Response),
    RetryableFailure(RequestError),
    TerminalFailure(RequestError),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}
