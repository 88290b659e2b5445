//! Pending route staging.
//!
//! Packets that arrive for a flow with no installed route are buffered here
//! until the control plane installs one or the entry expires. A single budget
//! bounds the number of packets buffered across every pending entry.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::clock::MonotonicTime;
use crate::error::{Result, RouteTableError};
use crate::route::RouteKey;

/// Packets buffered for one unresolved route.
#[derive(Debug)]
pub(crate) struct PendingRoute<P> {
    packets: VecDeque<P>,
    created_at: MonotonicTime,
}

impl<P> PendingRoute<P> {
    fn new(created_at: MonotonicTime) -> Self {
        Self {
            packets: VecDeque::new(),
            created_at,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.packets.len()
    }

    #[cfg(test)]
    pub(crate) fn created_at(&self) -> MonotonicTime {
        self.created_at
    }

    /// An entry is expired once its age reaches `lifetime`.
    pub(crate) fn is_expired(&self, now: MonotonicTime, lifetime: Duration) -> bool {
        now.saturating_duration_since(self.created_at) >= lifetime
    }

    fn into_packets(self) -> Vec<P> {
        self.packets.into()
    }
}

/// Where an enqueued packet landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enqueued {
    /// A new pending entry was created for the packet.
    Created,
    /// The packet joined an existing pending entry.
    Appended,
}

/// All pending routes plus the shared packet budget.
///
/// `buffered` always equals the sum of the entries' packet counts.
#[derive(Debug)]
pub(crate) struct PendingRouteTable<P> {
    routes: HashMap<RouteKey, PendingRoute<P>>,
    buffered: usize,
    max_buffered: usize,
}

impl<P> PendingRouteTable<P> {
    pub(crate) fn new(max_buffered: usize) -> Self {
        Self {
            routes: HashMap::new(),
            buffered: 0,
            max_buffered,
        }
    }

    /// Buffers a reference to `packet` under `key`.
    ///
    /// The budget is checked before the packet is cloned, so a rejected
    /// packet is never referenced by the table.
    ///
    /// # Errors
    ///
    /// Returns [`RouteTableError::NoBufferSpace`] if the budget is exhausted.
    /// The table is left unchanged.
    pub(crate) fn enqueue(
        &mut self,
        key: RouteKey,
        packet: &P,
        now: MonotonicTime,
    ) -> Result<Enqueued>
    where
        P: Clone,
    {
        if self.buffered >= self.max_buffered {
            return Err(RouteTableError::no_buffer_space(self.max_buffered));
        }

        let enqueued = match self.routes.entry(key) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().packets.push_back(packet.clone());
                Enqueued::Appended
            }
            Entry::Vacant(entry) => {
                entry.insert(PendingRoute::new(now)).packets.push_back(packet.clone());
                Enqueued::Created
            }
        };

        self.buffered += 1;
        Ok(enqueued)
    }

    /// Removes the pending entry for `key`, handing its packets back in
    /// arrival order.
    pub(crate) fn take(&mut self, key: &RouteKey) -> Option<Vec<P>> {
        let route = self.routes.remove(key)?;
        self.buffered -= route.len();
        Some(route.into_packets())
    }

    /// Removes every entry whose age has reached `lifetime`.
    ///
    /// The returned packets are still owned; the caller releases them once
    /// it no longer holds the table lock.
    pub(crate) fn expire(
        &mut self,
        now: MonotonicTime,
        lifetime: Duration,
    ) -> Vec<(RouteKey, Vec<P>)> {
        let expired_keys: Vec<RouteKey> = self
            .routes
            .iter()
            .filter(|(_, route)| route.is_expired(now, lifetime))
            .map(|(key, _)| *key)
            .collect();

        expired_keys
            .into_iter()
            .filter_map(|key| self.take(&key).map(|packets| (key, packets)))
            .collect()
    }

    /// Removes every entry, returning all buffered packets.
    pub(crate) fn drain(&mut self) -> Vec<P> {
        let packets = self
            .routes
            .drain()
            .flat_map(|(_, route)| route.into_packets())
            .collect();
        self.buffered = 0;
        packets
    }

    #[cfg(test)]
    pub(crate) fn get(&self, key: &RouteKey) -> Option<&PendingRoute<P>> {
        self.routes.get(key)
    }

    pub(crate) fn contains(&self, key: &RouteKey) -> bool {
        self.routes.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.routes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub(crate) fn buffered_packets(&self) -> usize {
        self.buffered
    }

    pub(crate) fn max_buffered_packets(&self) -> usize {
        self.max_buffered
    }
}
