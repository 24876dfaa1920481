// src/core/partition/resolver.rs

//! Derives a `PartitionKey` from outbound request metadata.

use super::key::{PartitionKey, PartitionKeyBuilder};
use crate::core::errors::ClientError;
use crate::core::protocol::RequestMeta;
use bytes::Bytes;

/// Turns request metadata into the key used to select a partition.
///
/// Resolvers must be pure: the same metadata always yields the same key.
pub trait PartitionKeyResolver: Send + Sync + 'static {
    fn resolve(&self, meta: &RequestMeta) -> Result<PartitionKey, ClientError>;
}

impl<F> PartitionKeyResolver for F
where
    F: Fn(&RequestMeta) -> Result<PartitionKey, ClientError> + Send + Sync + 'static,
{
    fn resolve(&self, meta: &RequestMeta) -> Result<PartitionKey, ClientError> {
        self(meta)
    }
}

/// Where a single key attribute is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Host,
    PathSegment(usize),
    Header(String),
}

#[derive(Debug, Clone)]
struct Rule {
    attribute: String,
    source: Source,
    required: bool,
}

/// A declarative resolver that copies request properties into key attributes.
///
/// ```
/// use shardline::core::partition::AttributeResolver;
///
/// let resolver = AttributeResolver::new()
///     .host("cluster")
///     .path_segment(0, "tenant")
///     .optional_header("x-shard", "shard");
/// ```
#[derive(Debug, Clone, Default)]
pub struct AttributeResolver {
    rules: Vec<Rule>,
}

impl AttributeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the request host (without port) as `attribute`.
    pub fn host(self, attribute: impl Into<String>) -> Self {
        self.rule(attribute, Source::Host, true)
    }

    /// Uses the zero-based `index`-th non-empty path segment as `attribute`.
    pub fn path_segment(self, index: usize, attribute: impl Into<String>) -> Self {
        self.rule(attribute, Source::PathSegment(index), true)
    }

    /// Uses the value of `header` as `attribute`. The request fails without it.
    pub fn header(self, header: impl AsRef<str>, attribute: impl Into<String>) -> Self {
        let name = header.as_ref().to_ascii_lowercase();
        self.rule(attribute, Source::Header(name), true)
    }

    /// Like [`header`](Self::header), but a missing header leaves the attribute out.
    pub fn optional_header(self, header: impl AsRef<str>, attribute: impl Into<String>) -> Self {
        let name = header.as_ref().to_ascii_lowercase();
        self.rule(attribute, Source::Header(name), false)
    }

    fn rule(mut self, attribute: impl Into<String>, source: Source, required: bool) -> Self {
        self.rules.push(Rule {
            attribute: attribute.into(),
            source,
            required,
        });
        self
    }

    fn lookup<'a>(meta: &'a RequestMeta, source: &Source) -> Option<&'a str> {
        match source {
            Source::Host => meta
                .host
                .as_deref()
                .map(strip_port)
                .filter(|h| !h.is_empty()),
            Source::PathSegment(index) => meta.path_segments().nth(*index),
            Source::Header(name) => meta.header(name),
        }
    }
}

/// Removes a trailing `:port` from a host header value.
fn strip_port(host: &str) -> &str {
    if let Some((name, port)) = host.rsplit_once(':')
        && !port.is_empty()
        && port.bytes().all(|b| b.is_ascii_digit())
    {
        return name;
    }
    host
}

impl PartitionKeyResolver for AttributeResolver {
    fn resolve(&self, meta: &RequestMeta) -> Result<PartitionKey, ClientError> {
        let mut builder = PartitionKeyBuilder::default();
        for rule in &self.rules {
            match Self::lookup(meta, &rule.source) {
                Some(value) => {
                    builder.insert(&rule.attribute, Bytes::copy_from_slice(value.as_bytes()));
                }
                None if rule.required => {
                    return Err(ClientError::InvalidRequest(format!(
                        "cannot resolve partition attribute '{}' from {:?} of {} {}",
                        rule.attribute, rule.source, meta.method, meta.path
                    )));
                }
                None => {}
            }
        }
        if builder.is_empty() {
            return Err(ClientError::InvalidRequest(format!(
                "no partition attributes resolved for {} {}",
                meta.method, meta.path
            )));
        }
        Ok(builder.build())
    }
}
