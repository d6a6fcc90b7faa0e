//! Peer liveness: the ping registry and the heartbeat control loop.
//!
//! One node (often this one) acts as master. Every node heartbeats to the
//! master's `/ping` endpoint, registering itself and receiving the current
//! live set, which it publishes into its own ring. A peer is live while it
//! was seen within the last five seconds; the live list preserves insertion
//! order so rings across nodes are built from identical inputs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cluster::ClusterContext;

/// A peer is live while `now - last_seen` stays under this window.
pub const PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay between successful heartbeat rounds.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);

/// Retry delay after a failed heartbeat round.
pub const HEARTBEAT_RETRY: Duration = Duration::from_secs(1);

struct PeerEntry {
    peer: String,
    last_seen: Instant,
}

/// Mutex-guarded registry of `(peer, last_seen)` entries.
pub struct PeersManager {
    peers: Mutex<Vec<PeerEntry>>,
}

impl PeersManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            peers: Mutex::new(Vec::new()),
        }
    }

    /// Record that `peer` (as `ip:port`) was seen just now.
    pub fn ping(&self, peer: &str) {
        let mut peers = self.peers.lock();
        if let Some(entry) = peers.iter_mut().find(|e| e.peer == peer) {
            entry.last_seen = Instant::now();
            return;
        }
        peers.push(PeerEntry {
            peer: peer.to_string(),
            last_seen: Instant::now(),
        });
    }

    /// Live peers in insertion order.
    #[must_use]
    pub fn live(&self) -> Vec<String> {
        let now = Instant::now();
        self.peers
            .lock()
            .iter()
            .filter(|e| now.duration_since(e.last_seen) < PEER_TIMEOUT)
            .map(|e| e.peer.clone())
            .collect()
    }
}

impl Default for PeersManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocking heartbeat loop: register with the master, publish the returned
/// live set into the ring, sleep, repeat. Runs for the process lifetime.
///
/// `master` is a base URL (`http://host:port`), `me` this node's `ip:port`.
/// The request is sent with connection-close semantics so the master's
/// accept loop observes fresh liveness rather than an idle kept-alive socket.
pub async fn heartbeat(
    master: String,
    me: String,
    cluster: Arc<ClusterContext>,
    http: reqwest::Client,
) {
    let ping_url = format!("{master}/ping");
    loop {
        let round = http
            .get(&ping_url)
            .query(&[("peer", me.as_str())])
            .header(reqwest::header::CONNECTION, "close")
            .send()
            .await;

        let delay = match round {
            Ok(response) => match response.json::<Vec<String>>().await {
                Ok(live) => {
                    debug!(count = live.len(), "heartbeat: live set received");
                    cluster.set_peers(live.iter().map(|p| format!("http://{p}")));
                    HEARTBEAT_INTERVAL
                }
                Err(err) => {
                    warn!(%err, "heartbeat: undecodable live set");
                    HEARTBEAT_RETRY
                }
            },
            Err(err) => {
                warn!(%err, master = %ping_url, "heartbeat failed");
                HEARTBEAT_RETRY
            }
        };
        tokio::time::sleep(delay).await;
    }
}
