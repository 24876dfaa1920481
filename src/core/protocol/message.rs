// src/core/protocol/message.rs

//! Request and response types exchanged with per-partition clients.
//!
//! Only the metadata needed for routing and pipelining is modelled here. Encoding
//! these values onto a wire is the job of the codec supplied to a connection.

use bytes::Bytes;
use indexmap::IndexMap;
use std::fmt;

/// The protocol version a request is issued with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVersion {
    Http10,
    #[default]
    Http11,
    Http2,
    Http3,
}

impl ProtocolVersion {
    /// Returns `true` only for the version whose exchanges are textual, strictly
    /// ordered and never multiplexed on a single connection.
    pub fn supports_pipelining(self) -> bool {
        matches!(self, ProtocolVersion::Http11)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProtocolVersion::Http10 => "HTTP/1.0",
            ProtocolVersion::Http11 => "HTTP/1.1",
            ProtocolVersion::Http2 => "HTTP/2.0",
            ProtocolVersion::Http3 => "HTTP/3.0",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Options => "OPTIONS",
        };
        f.write_str(s)
    }
}

/// Routing-relevant metadata of an outbound request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestMeta {
    pub version: ProtocolVersion,
    pub method: Method,
    /// The request target path, e.g. `/users/42`.
    pub path: String,
    pub host: Option<String>,
    /// Header names are stored lowercased.
    pub headers: IndexMap<String, String>,
}

impl RequestMeta {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns the non-empty segments of the path, ignoring any query string.
    pub fn path_segments(&self) -> impl Iterator<Item = &str> {
        let path = self.path.split('?').next().unwrap_or_default();
        path.split('/').filter(|s| !s.is_empty())
    }
}

/// An outbound request: metadata plus an opaque body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Request {
    pub meta: RequestMeta,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            meta: RequestMeta {
                method,
                path: path.into(),
                ..RequestMeta::default()
            },
            body: Bytes::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.meta.version = version;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.meta.host = Some(host.into());
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.meta
            .headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn version(&self) -> ProtocolVersion {
        self.meta.version
    }
}

/// A response returned by a per-partition client.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: IndexMap<String, String>,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: IndexMap::new(),
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
