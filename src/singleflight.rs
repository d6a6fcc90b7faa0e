//! Per-key request coalescing.
//!
//! Concurrent `Group::get` calls for the same key must trigger at most one
//! load per node: the first caller installs a shared future, later callers
//! clone it, and everyone observes the same outcome, failures included. The
//! map lock is held only to install or retire an entry, never across the
//! load itself. If the leading caller disconnects mid-load, the remaining
//! waiters keep polling the shared future, so the load is never abandoned
//! while anyone still wants the result.

use std::future::Future;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::error::FetchError;

type FlightResult = Result<Bytes, FetchError>;
type Flight = Shared<BoxFuture<'static, FlightResult>>;

/// Coalescing map: cache key → in-flight shared load.
pub struct SingleFlight {
    flights: DashMap<String, Flight>,
}

impl SingleFlight {
    #[must_use]
    pub fn new() -> Self {
        Self {
            flights: DashMap::new(),
        }
    }

    /// Number of loads currently in flight on this node.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }

    /// Run `make()` for `key`, unless a flight already exists, in which case
    /// the caller joins it. Whoever observes completion first retires the
    /// entry; `ptr_eq` guards against removing a successor flight.
    pub async fn run<F, Fut>(&self, key: &str, make: F) -> FlightResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FlightResult> + Send + 'static,
    {
        let flight = match self.flights.entry(key.to_string()) {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                let flight = make().boxed().shared();
                vacant.insert(flight.clone());
                flight
            }
        };
        let result = flight.clone().await;
        self.flights.remove_if(key, |_, active| flight.ptr_eq(active));
        result
    }
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self::new()
    }
}
