use std::{collections::BTreeMap, fmt};

use serde::Serialize;

use crate::{RequestError, Result};

const AUTHORIZATION: &str = "authorization";
const CONTENT_TYPE: &str = "content-type";
pub(crate) const APPLICATION_JSON: &str = "application/json";

/// HTTP method of a [`RequestDescriptor`].
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Delete => Self::DELETE,
            Method::Patch => Self::PATCH,
            Method::Head => Self::HEAD,
            Method::Options => Self::OPTIONS,
        }
    }
}

/// Request payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    /// Opaque bytes sent as-is.
    Bytes(Vec<u8>),
    /// Structured value serialized as JSON.
    Json(serde_json::Value),
}

impl Body {
    /// Serializes the body into the bytes put on the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::Json(value) => serde_json::to_vec(value)
                .map_err(|err| RequestError::Encode(format!("failed to encode JSON body: {err}"))),
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Self::Bytes(text.as_bytes().to_vec())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Bytes(text.into_bytes())
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// One logical outbound request.
///
/// Header names are stored lower-cased, so each name appears at most once
/// and a later insert replaces an earlier one.
#[derive(Clone, PartialEq)]
pub struct RequestDescriptor {
    url: String,
    method: Method,
    body: Option<Body>,
    headers: BTreeMap<String, String>,
}

impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: BTreeMap<&str, &str> = self
            .headers
            .iter()
            .map(|(name, value)| {
                let value = if name == AUTHORIZATION {
                    "<redacted>"
                } else {
                    value.as_str()
                };
                (name.as_str(), value)
            })
            .collect();

        f.debug_struct("RequestDescriptor")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("body", &self.body)
            .field("headers", &headers)
            .finish()
    }
}

impl RequestDescriptor {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            body: None,
            headers: BTreeMap::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    /// Sets a header, replacing any previous value under the same name
    /// (compared case-insensitively).
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().trim().to_ascii_lowercase(), value.into());
        self
    }

    /// Sets `authorization: Bearer <token>`.
    ///
    /// If the token already carries the `Bearer ` prefix it is kept as-is.
    pub fn bearer_auth(self, token: impl AsRef<str>) -> Self {
        let authorization = normalize_bearer_authorization(token.as_ref());
        self.header(AUTHORIZATION, authorization)
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the JSON body and sets
    /// `content-type: application/json` unless a content type is already set.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        let value = serde_json::to_value(value)
            .map_err(|err| RequestError::Encode(format!("failed to encode JSON body: {err}")))?;
        self.body = Some(Body::Json(value));
        self.headers
            .entry(CONTENT_TYPE.to_owned())
            .or_insert_with(|| APPLICATION_JSON.to_owned());
        Ok(self)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn body_ref(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Looks up a header value by case-insensitive name.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

pub(crate) fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
