//! Consistent-hash ring mapping keys to peer base URLs.
//!
//! Each peer contributes `replicas` virtual points at
//! `crc32(format!("{i}{peer}"))`. A key hashes to the first point at or after
//! its own CRC32, wrapping around. The hash function is IEEE CRC32 over UTF-8
//! bytes so that placement agrees with peers running the legacy binary.

/// An immutable-once-built hash ring. The cluster swaps whole rings on peer
/// set changes instead of mutating one in place.
#[derive(Debug, Clone)]
pub struct Ring {
    replicas: usize,
    points: Vec<(u32, String)>,
}

impl Ring {
    /// Create an empty ring with `replicas` virtual points per peer.
    /// A replica count of zero is treated as one.
    #[must_use]
    pub fn new(replicas: usize) -> Self {
        Self {
            replicas: replicas.max(1),
            points: Vec::new(),
        }
    }

    /// Insert virtual points for each peer.
    pub fn add<I, S>(&mut self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for peer in peers {
            let peer = peer.as_ref();
            for i in 0..self.replicas {
                let point = crc32fast::hash(format!("{i}{peer}").as_bytes());
                self.points.push((point, peer.to_string()));
            }
        }
        self.points.sort();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The peer owning `key`, or `None` on an empty ring.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.points.is_empty() {
            return None;
        }
        let hash = crc32fast::hash(key.as_bytes());
        let idx = self.points.partition_point(|(point, _)| *point < hash);
        self.points
            .get(idx % self.points.len())
            .map(|(_, peer)| peer.as_str())
    }
}
