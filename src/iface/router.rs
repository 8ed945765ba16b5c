use alloc::collections::VecDeque;
use alloc::vec::Vec;

use super::interface::NetworkInterface;
use super::packet::Datagram;
use super::route::{Route, RouteTableFull, Routes};
use crate::time::Duration;
use crate::wire::{Ipv4Address, Ipv4Cidr};

#[derive(Debug)]
struct Port {
    iface: NetworkInterface,
    received: VecDeque<Datagram>,
}

/// An IPv4 router joining several network interfaces.
///
/// Every datagram an interface receives is forwarded along the route with the
/// longest prefix matching its destination, with its time to live decreased
/// by one. Datagrams whose time to live runs out, or that match no route,
/// are dropped silently.
#[derive(Debug, Default)]
pub struct Router {
    ports: Vec<Port>,
    routes: Routes,
}

impl Router {
    pub fn new() -> Router {
        Router::default()
    }

    /// Attach an interface, and return its index.
    pub fn add_interface(&mut self, iface: NetworkInterface) -> usize {
        self.ports.push(Port {
            iface,
            received: VecDeque::new(),
        });
        self.ports.len() - 1
    }

    pub fn interface(&self, index: usize) -> Option<&NetworkInterface> {
        self.ports.get(index).map(|port| &port.iface)
    }

    pub fn interface_mut(&mut self, index: usize) -> Option<&mut NetworkInterface> {
        self.ports.get_mut(index).map(|port| &mut port.iface)
    }

    pub fn interface_count(&self) -> usize {
        self.ports.len()
    }

    /// Forward datagrams for `cidr` out of `interface`, through `next_hop` if
    /// given, and straight to their destination otherwise.
    pub fn add_route(
        &mut self,
        cidr: Ipv4Cidr,
        next_hop: Option<Ipv4Address>,
        interface: usize,
    ) -> Result<(), RouteTableFull> {
        net_debug!(
            "adding route {} => {} on interface {}",
            cidr,
            DisplayNextHop(next_hop),
            interface
        );
        self.routes.add(Route {
            cidr,
            via_router: next_hop,
            interface,
        })
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    /// Feed a frame from the link into interface `index`. A datagram it
    /// carried is kept until the next call to [route].
    ///
    /// [route]: #method.route
    pub fn receive_frame(&mut self, index: usize, frame: &[u8]) {
        let Some(port) = self.ports.get_mut(index) else {
            net_debug!("no interface {}, dropping frame", index);
            return;
        };
        if let Some(datagram) = port.iface.recv_frame(frame) {
            port.received.push_back(datagram);
        }
    }

    /// Forward a single datagram.
    pub fn route_one_datagram(&mut self, mut datagram: Datagram) {
        let header = &mut datagram.header;
        if header.hop_limit <= 1 {
            net_debug!("dropping {}: time to live exceeded", header);
            return;
        }
        header.hop_limit -= 1;

        let dst_addr = header.dst_addr;
        let Some(route) = self.routes.lookup(&dst_addr) else {
            net_debug!("dropping {}: no route", header);
            return;
        };
        let next_hop = route.next_hop(dst_addr);
        match self.ports.get_mut(route.interface) {
            Some(port) => {
                net_trace!("forwarding {} via {}", datagram, next_hop);
                port.iface.send_datagram(datagram, next_hop);
            }
            None => {
                net_debug!("dropping {}: no interface {}", datagram, route.interface);
            }
        }
    }

    /// Forward every datagram received on every interface.
    pub fn route(&mut self) {
        for index in 0..self.ports.len() {
            while let Some(datagram) = self.ports[index].received.pop_front() {
                self.route_one_datagram(datagram);
            }
        }
    }

    /// Let `delta` of time pass on every interface.
    pub fn tick(&mut self, delta: Duration) {
        for port in self.ports.iter_mut() {
            port.iface.tick(delta);
        }
    }
}

struct DisplayNextHop(Option<Ipv4Address>);

impl core::fmt::Display for DisplayNextHop {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.0 {
            Some(addr) => write!(f, "{addr}"),
            None => write!(f, "(direct)"),
        }
    }
}
