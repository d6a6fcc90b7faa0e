//! Error types shared across the fetch pipeline.
//!
//! `FetchError` is deliberately `Clone`: the single-flight coordinator
//! broadcasts one result to every coalesced waiter, failures included, so the
//! error has to be shareable without re-running the generator.

use thiserror::Error;

/// Errors surfaced by cache groups, fetchers and the peer RPC client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Origin answered with a non-200 status.
    #[error("Response code {code} for URL: {url}")]
    StatusCode { url: String, code: u16 },

    /// DNS, connect or read failure talking to an origin server.
    #[error("request failed for {url}: {reason}")]
    Transport { url: String, reason: String },

    /// The owning peer could not serve the key. Never triggers local
    /// regeneration; retrying is the caller's concern.
    #[error("peer {peer} returned {status}: {detail}")]
    PeerRpc {
        peer: String,
        status: u16,
        detail: String,
    },

    /// Cache key without the expected `bucket:` prefix.
    #[error("malformed cache key: {0}")]
    BadKey(String),

    /// A required query parameter was absent.
    #[error("missing required parameter: {0}")]
    MissingParam(&'static str),

    /// `/_groupcache/` request for a group this node never registered.
    #[error("no such group: {0}")]
    UnknownGroup(String),

    /// Anything else: codec failures, undecodable image headers, etc.
    #[error("{0}")]
    Internal(String),
}

impl FetchError {
    /// Wrap a client error with the URL it happened on.
    pub fn transport(url: impl Into<String>, err: &reqwest::Error) -> Self {
        Self::Transport {
            url: url.into(),
            reason: err.to_string(),
        }
    }
}
