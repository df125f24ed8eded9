//! Round-robin replica selection
//!
//! Hands out replicas in strict cyclic order. There is no health tracking: a
//! failing replica keeps its turn and the caller decides what to do with the
//! failure.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::error::ClickHouseSinkError;

/// Cyclic, thread-safe iterator over a fixed set of hosts
#[derive(Debug)]
pub struct HostSelector<T> {
    hosts: Vec<T>,
    cursor: AtomicUsize,
    retries: usize,
}

impl<T> HostSelector<T> {
    /// Create a selector over `hosts`, starting at the first one
    ///
    /// `retries` bounds how many hosts a caller should try for one operation.
    pub fn new(hosts: Vec<T>, retries: usize) -> Result<Self, ClickHouseSinkError> {
        if hosts.is_empty() {
            return Err(ClickHouseSinkError::NoAvailableHost);
        }
        Ok(Self {
            hosts,
            cursor: AtomicUsize::new(0),
            retries,
        })
    }

    /// Return the host under the cursor and advance it
    pub fn next(&self) -> &T {
        let len = self.hosts.len();
        // The closure always returns Some, so fetch_update cannot fail.
        let index = match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c + 1) % len))
        {
            Ok(prev) | Err(prev) => prev,
        };
        &self.hosts[index]
    }

    /// Number of hosts
    #[inline]
    pub fn size(&self) -> usize {
        self.hosts.len()
    }

    /// Host attempts allowed per operation, never less than one
    #[inline]
    pub fn retries(&self) -> usize {
        self.retries.max(1)
    }
}
