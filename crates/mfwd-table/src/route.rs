//! Route data model: keys, installed routes and lookup results.

use mfwd_types::{InterfaceId, IpAddress};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A key identifying one multicast forwarding flow (source, group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteKey {
    /// Unicast source address of the flow.
    pub unicast_source: IpAddress,
    /// Multicast group the flow is sent to.
    pub multicast_destination: IpAddress,
}

impl RouteKey {
    /// Creates a new route key.
    pub fn new(
        unicast_source: impl Into<IpAddress>,
        multicast_destination: impl Into<IpAddress>,
    ) -> Self {
        Self {
            unicast_source: unicast_source.into(),
            multicast_destination: multicast_destination.into(),
        }
    }

    /// Returns true if the source is unicast, the destination is multicast
    /// and both belong to the same address family.
    ///
    /// The table accepts any key; the forwarding path uses this to filter
    /// packets before they reach it.
    pub fn is_well_formed(&self) -> bool {
        self.unicast_source.is_unicast()
            && self.multicast_destination.is_multicast()
            && self.unicast_source.same_family(&self.multicast_destination)
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.unicast_source, self.multicast_destination)
    }
}

/// An interface a multicast route forwards out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutgoingInterface {
    /// The interface to send on.
    pub id: InterfaceId,
    /// Minimum TTL (hop limit) a packet must carry to be sent on this
    /// interface.
    pub min_ttl: u8,
}

impl OutgoingInterface {
    /// Creates a new outgoing interface.
    pub fn new(id: InterfaceId, min_ttl: u8) -> Self {
        Self { id, min_ttl }
    }

    /// Returns true if a packet with `ttl` may be sent on this interface.
    pub fn admits(&self, ttl: u8) -> bool {
        ttl >= self.min_ttl
    }
}

/// A resolved multicast forwarding route.
///
/// Immutable once built: replacing a route means installing a new one for
/// the same key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledRoute {
    expected_input_interface: InterfaceId,
    outgoing_interfaces: Vec<OutgoingInterface>,
}

impl InstalledRoute {
    /// Creates a new route.
    ///
    /// The outgoing interfaces are copied, so later changes to the caller's
    /// buffer do not affect the route.
    pub fn new(
        expected_input_interface: InterfaceId,
        outgoing_interfaces: &[OutgoingInterface],
    ) -> Self {
        Self {
            expected_input_interface,
            outgoing_interfaces: outgoing_interfaces.to_vec(),
        }
    }

    /// Returns the interface packets for this route are expected to arrive on.
    pub fn expected_input_interface(&self) -> InterfaceId {
        self.expected_input_interface
    }

    /// Returns the outgoing interfaces, in the order they were given.
    pub fn outgoing_interfaces(&self) -> &[OutgoingInterface] {
        &self.outgoing_interfaces
    }

    /// Returns the outgoing interfaces a packet with `ttl` may be sent on.
    pub fn outgoing_interfaces_for_ttl(
        &self,
        ttl: u8,
    ) -> impl Iterator<Item = &OutgoingInterface> + '_ {
        self.outgoing_interfaces
            .iter()
            .filter(move |iface| iface.admits(ttl))
    }
}

/// Outcome of [`RouteTable::get_route_or_insert_pending`].
///
/// [`RouteTable::get_route_or_insert_pending`]: crate::RouteTable::get_route_or_insert_pending
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteLookup {
    /// A route is installed; forward the packet with it.
    Resolved(Arc<InstalledRoute>),
    /// No route existed and a pending entry was just created for the packet.
    /// The caller should signal the control plane that a route is missing.
    NewlyPending,
    /// The packet was appended to an existing pending entry. A route miss
    /// has already been signalled for it.
    AppendedPending,
}

impl RouteLookup {
    /// Returns the installed route, if the lookup resolved.
    pub fn installed_route(&self) -> Option<&Arc<InstalledRoute>> {
        match self {
            RouteLookup::Resolved(route) => Some(route),
            RouteLookup::NewlyPending | RouteLookup::AppendedPending => None,
        }
    }

    /// Returns true if the packet was staged in a pending entry.
    pub fn is_pending(&self) -> bool {
        !matches!(self, RouteLookup::Resolved(_))
    }

    /// Returns true if the caller should emit a missing-route signal.
    pub fn needs_route_request(&self) -> bool {
        matches!(self, RouteLookup::NewlyPending)
    }
}
