//! Cooperating client helper.
//!
//! Builds method requests whose query strings are deterministic (sorted
//! pairs) and, when a TTL is given, carries a pinned `_t` time-block so
//! every cooperating client rotates buckets in lockstep with the cache
//! instead of against it.

use serde::de::DeserializeOwned;

use crate::bucket;
use crate::error::FetchError;

pub struct Client {
    host: String,
    http: reqwest::Client,
}

impl Client {
    /// `host` is the service address as `ip:port`.
    #[must_use]
    pub fn new(host: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            host: host.into(),
            http,
        }
    }

    /// Issue `GET /<method>` with the given key/value parameters.
    ///
    /// # Panics
    ///
    /// `kvs` must hold alternating keys and values; an odd-length slice is a
    /// programmer error.
    pub async fn call(
        &self,
        method: &str,
        ttl: u32,
        kvs: &[&str],
    ) -> Result<reqwest::Response, FetchError> {
        assert!(kvs.len() % 2 == 0, "key values must be in pairs");

        let mut pairs: Vec<(&str, String)> = kvs
            .chunks_exact(2)
            .filter_map(|pair| match pair {
                [k, v] => Some((*k, (*v).to_string())),
                _ => None,
            })
            .collect();
        if ttl > 0 {
            let base = encode_pairs(&pairs);
            pairs.push(("_t", bucket::time_block(ttl, base.as_bytes()).to_string()));
        }
        // Sorted encoding keeps the query string (and thus the cache key)
        // independent of argument order.
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        let query = encode_pairs(&pairs);

        let url = format!("http://{}/{}?{}", self.host, method, query);
        self.http
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::transport(&url, &e))
    }

    /// [`Client::call`] plus JSON decoding of the body.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        method: &str,
        ttl: u32,
        kvs: &[&str],
    ) -> Result<T, FetchError> {
        let response = self.call(method, ttl, kvs).await?;
        let url = response.url().to_string();
        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::transport(url, &e))
    }
}

fn encode_pairs(pairs: &[(&str, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        serializer.append_pair(k, v);
    }
    serializer.finish()
}
