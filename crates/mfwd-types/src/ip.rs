//! IP address types with multicast classification.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An IPv4 address wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ipv4Address(Ipv4Addr);

impl Ipv4Address {
    pub const UNSPECIFIED: Self = Ipv4Address(Ipv4Addr::UNSPECIFIED);
    pub const BROADCAST: Self = Ipv4Address(Ipv4Addr::BROADCAST);

    /// The all-systems group (224.0.0.1).
    pub const ALL_SYSTEMS: Self = Ipv4Address(Ipv4Addr::new(224, 0, 0, 1));

    pub const fn octets(&self) -> [u8; 4] {
        self.0.octets()
    }

    /// Returns true if this is a multicast group address (224.0.0.0/4).
    pub const fn is_multicast(&self) -> bool {
        self.0.is_multicast()
    }

    /// Returns true if this is a link-local multicast group (224.0.0.0/24).
    ///
    /// Groups in this range are never forwarded by a multicast router.
    pub const fn is_link_local_multicast(&self) -> bool {
        let octets = self.octets();
        octets[0] == 224 && octets[1] == 0 && octets[2] == 0
    }

    /// Returns true if this address can appear as a packet source.
    pub fn is_unicast(&self) -> bool {
        !self.is_multicast() && *self != Self::UNSPECIFIED && *self != Self::BROADCAST
    }
}

impl fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Ipv4Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Ipv4Addr>()
            .map(Ipv4Address)
            .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
    }
}

impl From<Ipv4Addr> for Ipv4Address {
    fn from(addr: Ipv4Addr) -> Self {
        Ipv4Address(addr)
    }
}

impl From<Ipv4Address> for Ipv4Addr {
    fn from(addr: Ipv4Address) -> Self {
        addr.0
    }
}

/// An IPv6 address wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ipv6Address(Ipv6Addr);

impl Ipv6Address {
    pub const UNSPECIFIED: Self = Ipv6Address(Ipv6Addr::UNSPECIFIED);

    pub const fn segments(&self) -> [u16; 8] {
        self.0.segments()
    }

    /// Returns true if this is a multicast group address (ff00::/8).
    pub const fn is_multicast(&self) -> bool {
        self.0.is_multicast()
    }

    /// Returns the 4-bit multicast scope, or `None` for non-multicast addresses.
    pub const fn multicast_scope(&self) -> Option<u8> {
        if self.is_multicast() {
            Some((self.segments()[0] & 0x000f) as u8)
        } else {
            None
        }
    }

    /// Returns true if this is a link-local or narrower scoped multicast group.
    pub const fn is_link_local_multicast(&self) -> bool {
        match self.multicast_scope() {
            Some(scope) => scope <= 0x2,
            None => false,
        }
    }

    /// Returns true if this is a link-local unicast address (fe80::/10).
    pub fn is_link_local(&self) -> bool {
        let segments = self.segments();
        (segments[0] & 0xffc0) == 0xfe80
    }

    /// Returns true if this address can appear as a packet source.
    pub fn is_unicast(&self) -> bool {
        !self.is_multicast() && *self != Self::UNSPECIFIED
    }
}

impl fmt::Display for Ipv6Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Ipv6Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Ipv6Addr>()
            .map(Ipv6Address)
            .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
    }
}

impl From<Ipv6Addr> for Ipv6Address {
    fn from(addr: Ipv6Addr) -> Self {
        Ipv6Address(addr)
    }
}

impl From<Ipv6Address> for Ipv6Addr {
    fn from(addr: Ipv6Address) -> Self {
        addr.0
    }
}

/// An IP address that can be either IPv4 or IPv6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IpAddress {
    V4(Ipv4Address),
    V6(Ipv6Address),
}

impl IpAddress {
    /// Returns true if this is an IPv4 address.
    pub const fn is_ipv4(&self) -> bool {
        matches!(self, IpAddress::V4(_))
    }

    /// Returns true if this is an IPv6 address.
    pub const fn is_ipv6(&self) -> bool {
        matches!(self, IpAddress::V6(_))
    }

    /// Returns true if both addresses belong to the same family.
    pub const fn same_family(&self, other: &IpAddress) -> bool {
        self.is_ipv4() == other.is_ipv4()
    }

    pub const fn is_multicast(&self) -> bool {
        match self {
            IpAddress::V4(addr) => addr.is_multicast(),
            IpAddress::V6(addr) => addr.is_multicast(),
        }
    }

    pub const fn is_link_local_multicast(&self) -> bool {
        match self {
            IpAddress::V4(addr) => addr.is_link_local_multicast(),
            IpAddress::V6(addr) => addr.is_link_local_multicast(),
        }
    }

    pub fn is_unicast(&self) -> bool {
        match self {
            IpAddress::V4(addr) => addr.is_unicast(),
            IpAddress::V6(addr) => addr.is_unicast(),
        }
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpAddress::V4(addr) => addr.fmt(f),
            IpAddress::V6(addr) => addr.fmt(f),
        }
    }
}

impl FromStr for IpAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(':') {
            s.parse::<Ipv6Address>().map(IpAddress::V6)
        } else {
            s.parse::<Ipv4Address>().map(IpAddress::V4)
        }
    }
}

impl From<Ipv4Address> for IpAddress {
    fn from(addr: Ipv4Address) -> Self {
        IpAddress::V4(addr)
    }
}

impl From<Ipv6Address> for IpAddress {
    fn from(addr: Ipv6Address) -> Self {
        IpAddress::V6(addr)
    }
}

impl From<IpAddr> for IpAddress {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => IpAddress::V4(v4.into()),
            IpAddr::V6(v6) => IpAddress::V6(v6.into()),
        }
    }
}

impl From<Ipv4Addr> for IpAddress {
    fn from(addr: Ipv4Addr) -> Self {
        IpAddress::V4(Ipv4Address(addr))
    }
}

impl From<Ipv6Addr> for IpAddress {
    fn from(addr: Ipv6Addr) -> Self {
        IpAddress::V6(Ipv6Address(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ipv4_parse() {
        let addr: Ipv4Address = "192.168.1.1".parse().unwrap();
        assert_eq!(addr.octets(), [192, 168, 1, 1]);
        assert!("192.168.1".parse::<Ipv4Address>().is_err());
    }

    #[test]
    fn test_ipv4_multicast_classification() {
        let group: Ipv4Address = "239.1.1.1".parse().unwrap();
        assert!(group.is_multicast());
        assert!(!group.is_unicast());
        assert!(!group.is_link_local_multicast());

        assert!(Ipv4Address::ALL_SYSTEMS.is_link_local_multicast());

        let source: Ipv4Address = "10.0.0.1".parse().unwrap();
        assert!(source.is_unicast());
        assert!(!Ipv4Address::BROADCAST.is_unicast());
        assert!(!Ipv4Address::UNSPECIFIED.is_unicast());
    }

    #[test]
    fn test_ipv6_multicast_scope() {
        let site: Ipv6Address = "ff05::1:3".parse().unwrap();
        assert_eq!(site.multicast_scope(), Some(0x5));
        assert!(!site.is_link_local_multicast());

        let link: Ipv6Address = "ff02::1".parse().unwrap();
        assert!(link.is_link_local_multicast());

        let global: Ipv6Address = "2001:db8::1".parse().unwrap();
        assert_eq!(global.multicast_scope(), None);
        assert!(global.is_unicast());
        assert!(!global.is_link_local());
    }

    #[test]
    fn test_ip_address_discrimination() {
        let v4: IpAddress = "10.0.0.1".parse().unwrap();
        assert!(v4.is_ipv4());
        assert!(!v4.is_ipv6());

        let v6: IpAddress = "ff0e::101".parse().unwrap();
        assert!(v6.is_ipv6());
        assert!(v6.is_multicast());
        assert!(!v4.same_family(&v6));
    }

    #[test]
    fn test_serde_is_transparent() {
        let addr: IpAddress = "232.1.2.3".parse().unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"232.1.2.3\"");

        let back: IpAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
