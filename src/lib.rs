//! fetchgrid
//!
//! A distributed, content-caching HTTP fetch service. Clients hand it a URL
//! plus an optional freshness window; it returns the fetched resource (HTML,
//! image, or image metadata) while amortizing origin requests across a
//! cluster of peer nodes:
//!
//! - a consistent-hash ring gives every URL a single owner node; other nodes
//!   forward to the owner and keep a local hot tier of popular foreign keys,
//! - per-key single-flight coalesces concurrent identical requests into one
//!   load with a shared result,
//! - TTLs become deterministic, per-URL-staggered key prefixes instead of
//!   expiry timers, so bucket rollover never stampedes the origin,
//! - a peer-liveness loop heartbeats to a master and republishes the live
//!   set into the ring.
//!
//! # Architecture
//!
//! ```text
//! Request → main tier → hot tier → owning peer (RPC) → generator → origin
//!           ↓ hit       ↓ hit      ↓ admit to hot      ↓ admit to main
//! ```
//!
//! The library exposes the building blocks; the `fetchgrid` binary wires
//! them into the HTTP service.

pub mod bucket;
pub mod client;
pub mod cluster;
pub mod config;
pub mod error;
pub mod fetch;
pub mod group;
pub mod peers;
pub mod ring;
pub mod server;
pub mod singleflight;
pub mod tier;

pub use client::Client;
pub use cluster::{ClusterContext, DEFAULT_REPLICAS};
pub use config::{Config, MethodConfig};
pub use error::FetchError;
pub use fetch::{Fetcher, MethodRegistry, QueryMap};
pub use group::{CacheKind, Group};
pub use peers::PeersManager;
pub use ring::Ring;
pub use server::{build_state, router, AppState};
pub use tier::TierStats;
