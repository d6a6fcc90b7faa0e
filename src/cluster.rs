//! Cluster context: who owns which key, and how to ask them.
//!
//! One `ClusterContext` is built at startup and handed to every group; there
//! is no process-global peer pool. It holds this node's own base URL, the
//! consistent-hash ring (swapped wholesale on peer set changes), and the
//! HTTP client used for inter-peer calls.
//!
//! The wire contract is fixed for interoperability with legacy nodes:
//! `GET {peer}/_groupcache/?group=G&key=K` answered with
//! `application/x-protobuf` and a `GetResponse` message body. Group and key
//! travel as query parameters, not path segments, because percent-encoded
//! slashes do not survive path normalization.

use bytes::Bytes;
use parking_lot::RwLock;
use prost::Message;
use tracing::debug;

use crate::error::FetchError;
use crate::ring::Ring;

/// Path of the inter-peer RPC endpoint, leading and trailing slash included.
pub const RPC_BASE_PATH: &str = "/_groupcache/";

/// Default virtual points per peer; matches legacy placement.
pub const DEFAULT_REPLICAS: usize = 1;

/// Inter-peer response message.
#[derive(Clone, PartialEq, Message)]
pub struct GetResponse {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub value: Option<Vec<u8>>,
    #[prost(double, optional, tag = "2")]
    pub minute_qps: Option<f64>,
}

pub struct ClusterContext {
    self_url: String,
    replicas: usize,
    ring: RwLock<Ring>,
    http: reqwest::Client,
}

impl ClusterContext {
    /// `self_url` is this node's base URL as peers address it, e.g.
    /// `http://10.0.0.12:9001`.
    #[must_use]
    pub fn new(self_url: String, replicas: usize, http: reqwest::Client) -> Self {
        Self {
            self_url,
            replicas,
            ring: RwLock::new(Ring::new(replicas)),
            http,
        }
    }

    #[must_use]
    pub fn self_url(&self) -> &str {
        &self.self_url
    }

    /// Replace the ring with a fresh one built from `peers` (base URLs).
    pub fn set_peers<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ring = Ring::new(self.replicas);
        ring.add(peers);
        debug!(empty = ring.is_empty(), "peer ring replaced");
        *self.ring.write() = ring;
    }

    /// The owner of `key` if it is a different node. `None` means the key is
    /// local: either this node owns it or no peer set has been published yet.
    #[must_use]
    pub fn pick_peer(&self, key: &str) -> Option<String> {
        let ring = self.ring.read();
        match ring.get(key) {
            Some(peer) if peer != self.self_url => Some(peer.to_string()),
            _ => None,
        }
    }

    /// Fetch `key` from the owning peer's cache over the wire protocol.
    pub async fn fetch_from_peer(
        &self,
        peer: &str,
        group: &str,
        key: &str,
    ) -> Result<Bytes, FetchError> {
        let url = format!("{peer}{RPC_BASE_PATH}");
        let rpc_err = |status: u16, detail: String| FetchError::PeerRpc {
            peer: peer.to_string(),
            status,
            detail,
        };

        let response = self
            .http
            .get(&url)
            .query(&[("group", group), ("key", key)])
            .send()
            .await
            .map_err(|e| rpc_err(0, e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| rpc_err(status.as_u16(), format!("reading response body: {e}")))?;

        if status != reqwest::StatusCode::OK {
            return Err(rpc_err(
                status.as_u16(),
                String::from_utf8_lossy(&body).into_owned(),
            ));
        }

        let decoded = GetResponse::decode(body.as_ref())
            .map_err(|e| rpc_err(status.as_u16(), format!("decoding response body: {e}")))?;
        Ok(Bytes::from(decoded.value.unwrap_or_default()))
    }
}
