//! Fetch methods: the dispatcher contract and its implementations.
//!
//! Every method (html, image, dimension) pairs a [`Group`] with a
//! [`Fetcher`]. The group caches whatever `generate` produces for a query;
//! `write_response` renders the cached bytes back to the HTTP client. The
//! registry is assembled once at startup and immutable afterwards.

pub mod ajax;
pub mod dimension;
pub mod html;
pub mod image;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::StreamExt;

use crate::bucket;
use crate::cluster::ClusterContext;
use crate::error::FetchError;
use crate::group::{Generator, Group};

/// Parsed query parameters. Lookups return the first value for a name, like
/// the form-value semantics the wire format inherited.
#[derive(Debug, Clone, Default)]
pub struct QueryMap(Vec<(String, String)>);

impl QueryMap {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self(
            url::form_urlencoded::parse(raw.as_bytes())
                .into_owned()
                .collect(),
        )
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// One fetch method: computes cache values and renders them.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Compute the cache value for a parsed query. Called on cache miss,
    /// inside the owning group's single-flight.
    async fn generate(&self, query: &QueryMap) -> Result<Bytes, FetchError>;

    /// Render cached bytes to the HTTP response. The default writes them
    /// through unchanged.
    fn write_response(&self, content: Bytes) -> Response {
        content.into_response()
    }
}

/// Adapter binding a [`Fetcher`] into a group generator: the cache key is
/// `bucket:query-string`, so strip the bucket and parse the query back out.
struct FetcherGenerator {
    fetcher: Arc<dyn Fetcher>,
}

#[async_trait]
impl Generator for FetcherGenerator {
    async fn generate(&self, key: &str) -> Result<Bytes, FetchError> {
        let (_bucket, raw_query) = bucket::split(key)?;
        let query = QueryMap::parse(raw_query);
        self.fetcher.generate(&query).await
    }
}

#[derive(Clone)]
pub struct MethodEntry {
    pub group: Group,
    pub fetcher: Arc<dyn Fetcher>,
}

/// Method name → (group, fetcher). Built once at startup.
pub struct MethodRegistry {
    methods: HashMap<String, MethodEntry>,
}

impl MethodRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    /// Register a method with its own cache group of `capacity` bytes.
    ///
    /// # Panics
    ///
    /// Registering the same name twice is a programmer error.
    pub fn register(
        &mut self,
        name: &str,
        fetcher: Arc<dyn Fetcher>,
        capacity: u64,
        cluster: Arc<ClusterContext>,
    ) {
        let generator = Arc::new(FetcherGenerator {
            fetcher: Arc::clone(&fetcher),
        });
        let group = Group::new(name, capacity, generator, cluster);
        let previous = self
            .methods
            .insert(name.to_string(), MethodEntry { group, fetcher });
        assert!(previous.is_none(), "duplicate method registration: {name}");
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MethodEntry> {
        self.methods.get(name)
    }

    /// The cache group behind a method, for the inter-peer endpoint.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.methods.get(name).map(|entry| &entry.group)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MethodEntry)> {
        self.methods.iter().map(|(name, entry)| (name.as_str(), entry))
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a response body, truncated at `max` bytes (0 = unlimited).
pub(crate) async fn read_limited(
    response: reqwest::Response,
    max: u64,
    url: &str,
) -> Result<Vec<u8>, FetchError> {
    let mut stream = response.bytes_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FetchError::transport(url, &e))?;
        buf.extend_from_slice(&chunk);
        if max > 0 && buf.len() as u64 >= max {
            buf.truncate(usize::try_from(max).unwrap_or(usize::MAX));
            break;
        }
    }
    Ok(buf)
}
