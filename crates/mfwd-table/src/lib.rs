//! Multicast forwarding route table.
//!
//! This crate holds the forwarding state a multicast data plane consults for
//! every packet it receives:
//!
//! - [`RouteTable`]: Installed routes plus pending routes, behind one lock
//! - [`InstalledRoute`]: Expected input interface and TTL-gated outputs
//! - [`RouteLookup`]: What a lookup did with the packet
//! - [`Clock`]: Time source and timer factory ([`ManualClock`], [`TokioClock`])
//!
//! # Packet flow
//!
//! 1. A packet for (source, group) arrives and the data plane calls
//!    [`RouteTable::get_route_or_insert_pending`]
//! 2. If a route is installed the packet is forwarded with it
//! 3. Otherwise a reference to the packet is buffered under a pending
//!    route; the first packet for the key asks the control plane for a route
//! 4. The control plane calls [`RouteTable::add_installed_route`], which
//!    hands back the buffered packets in arrival order
//! 5. Pending routes that are never resolved expire after
//!    [`Config::pending_route_lifetime`] and their packets are released
//!
//! # Example
//!
//! ```ignore
//! use mfwd_table::{Config, RouteLookup, RouteTable, TokioClock};
//!
//! let table = RouteTable::new();
//! table.init(Config::default_with_clock(Arc::new(TokioClock::try_current()?)))?;
//!
//! match table.get_route_or_insert_pending(key, &packet)? {
//!     RouteLookup::Resolved(route) => forward(&route, packet),
//!     RouteLookup::NewlyPending => control_plane.request_route(key),
//!     RouteLookup::AppendedPending => {}
//! }
//! ```

mod clock;
mod config;
mod error;
mod expiry;
mod pending;
mod route;
mod table;

pub use clock::{Clock, ManualClock, MonotonicTime, Timer, TimerCallback, TokioClock};
pub use config::{Config, DEFAULT_MAX_PENDING_PACKETS, DEFAULT_PENDING_ROUTE_LIFETIME};
pub use error::{Result, RouteTableError};
pub use route::{InstalledRoute, OutgoingInterface, RouteKey, RouteLookup};
pub use table::{RouteTable, RouteTableStats};

pub use mfwd_types::{InterfaceId, IpAddress, Ipv4Address, Ipv6Address};
