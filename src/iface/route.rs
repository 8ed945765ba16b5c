use heapless::Vec;

use crate::config::IFACE_MAX_ROUTE_COUNT;
use crate::wire::{Ipv4Address, Ipv4Cidr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteTableFull;

impl core::fmt::Display for RouteTableFull {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Route table full")
    }
}

impl core::error::Error for RouteTableFull {}

/// A prefix of addresses that should be forwarded out of an interface,
/// possibly via a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub cidr: Ipv4Cidr,
    /// `None` means the network is directly attached.
    pub via_router: Option<Ipv4Address>,
    /// Index of the outgoing interface.
    pub interface: usize,
}

impl Route {
    /// Returns a route to 0.0.0.0/0 via the `gateway`.
    pub fn new_ipv4_gateway(gateway: Ipv4Address, interface: usize) -> Route {
        Route {
            cidr: Ipv4Cidr::new(Ipv4Address::UNSPECIFIED, 0),
            via_router: Some(gateway),
            interface,
        }
    }

    /// Return the address the datagram for `dst_addr` must be handed to.
    pub fn next_hop(&self, dst_addr: Ipv4Address) -> Ipv4Address {
        self.via_router.unwrap_or(dst_addr)
    }
}

/// A routing table.
#[derive(Debug, Default)]
pub struct Routes {
    storage: Vec<Route, IFACE_MAX_ROUTE_COUNT>,
}

impl Routes {
    /// Creates a new empty routing table.
    pub fn new() -> Self {
        Self {
            storage: Vec::new(),
        }
    }

    /// Add a route. Routes are never replaced; the most specific one wins.
    pub fn add(&mut self, route: Route) -> Result<(), RouteTableFull> {
        self.storage.push(route).map_err(|_| RouteTableFull)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.storage.iter()
    }

    /// Find the route with the longest prefix matching `addr`.
    ///
    /// Among equally long prefixes the route added first is chosen.
    pub fn lookup(&self, addr: &Ipv4Address) -> Option<&Route> {
        self.storage
            .iter()
            // Keep only matching routes
            .filter(|route| route.cidr.contains_addr(addr))
            // pick the most specific one (highest prefix_len)
            .rev()
            .max_by_key(|route| route.cidr.prefix_len())
    }
}
