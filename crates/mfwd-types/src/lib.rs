//! Common types for the multicast forwarding path.
//!
//! This crate provides type-safe representations of the network primitives
//! shared by the multicast route table and its collaborators:
//!
//! - [`IpAddress`]: IPv4 and IPv6 addresses with multicast classification
//! - [`InterfaceId`]: Non-zero network interface identifiers

mod iface;
mod ip;

pub use iface::InterfaceId;
pub use ip::{IpAddress, Ipv4Address, Ipv6Address};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid interface ID: {0} (must be non-zero)")]
    InvalidInterfaceId(String),
}
