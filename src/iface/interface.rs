use alloc::collections::VecDeque;
use alloc::vec::Vec;
use heapless::Deque;

use super::neighbor::{Answer, Cache as NeighborCache};
use super::packet::{Datagram, EthernetPacket};
use crate::config::IFACE_PENDING_DATAGRAM_COUNT;
use crate::phy::ChecksumCapabilities;
use crate::time::{Duration, Instant};
use crate::wire::*;

/// A network interface connecting IPv4 to an Ethernet link.
///
/// Outgoing datagrams are framed for the hardware address of their next
/// hop, which is resolved with ARP; datagrams for an unresolved next hop
/// wait in a bounded queue until the answer arrives, and are dropped if
/// none does within one request interval. Incoming frames are filtered
/// by destination, ARP traffic is handled internally, and IPv4 datagrams
/// are handed back to the caller.
///
/// Serialized frames accumulate in [frames_out] for the driver to carry to
/// the link.
///
/// [frames_out]: #method.frames_out
#[derive(Debug)]
pub struct NetworkInterface {
    ethernet_addr: EthernetAddress,
    ip_addr: Ipv4Address,
    checksum_caps: ChecksumCapabilities,
    now: Instant,
    neighbors: NeighborCache,
    pending: Deque<Waiting, IFACE_PENDING_DATAGRAM_COUNT>,
    frames_out: VecDeque<Vec<u8>>,
}

/// A datagram held until its next hop is resolved.
#[derive(Debug)]
struct Waiting {
    next_hop: Ipv4Address,
    queued_at: Instant,
    datagram: Datagram,
}

impl NetworkInterface {
    pub fn new(ethernet_addr: EthernetAddress, ip_addr: Ipv4Address) -> NetworkInterface {
        NetworkInterface {
            ethernet_addr,
            ip_addr,
            checksum_caps: ChecksumCapabilities::default(),
            now: Instant::ZERO,
            neighbors: NeighborCache::new(),
            pending: Deque::new(),
            frames_out: VecDeque::new(),
        }
    }

    pub fn ethernet_addr(&self) -> EthernetAddress {
        self.ethernet_addr
    }

    pub fn ip_addr(&self) -> Ipv4Address {
        self.ip_addr
    }

    /// Choose which checksums are computed and verified.
    pub fn set_checksum_caps(&mut self, checksum_caps: ChecksumCapabilities) {
        self.checksum_caps = checksum_caps;
    }

    /// Send `datagram` to the neighbor owning `next_hop`.
    ///
    /// If the neighbor's hardware address is unknown, the datagram is queued
    /// and an ARP request is broadcast, unless one for the same address went
    /// out recently.
    pub fn send_datagram(&mut self, datagram: Datagram, next_hop: Ipv4Address) {
        match self.neighbors.lookup(&next_hop, self.now) {
            Answer::Found(hardware_addr) => {
                self.emit(EthernetPacket::Ipv4(datagram), hardware_addr);
            }
            Answer::NotFound => {
                net_debug!("address {} not in neighbor cache, sending ARP request", next_hop);
                let request = ArpRepr::request(self.ethernet_addr, self.ip_addr, next_hop);
                self.emit(EthernetPacket::Arp(request), EthernetAddress::BROADCAST);
                self.neighbors.limit_rate(next_hop, self.now);
                self.enqueue(next_hop, datagram);
            }
            Answer::RateLimited => {
                net_trace!("ARP request for {} already in flight", next_hop);
                self.enqueue(next_hop, datagram);
            }
        }
    }

    /// Accept a frame from the link, and return the IPv4 datagram it carried.
    ///
    /// Frames addressed to other hosts, malformed frames and ARP traffic
    /// return `None`.
    pub fn recv_frame(&mut self, buffer: &[u8]) -> Option<Datagram> {
        let frame = EthernetFrame::new_checked(buffer).ok()?;
        let dst_addr = frame.dst_addr();
        if dst_addr != self.ethernet_addr && !dst_addr.is_broadcast() {
            return None;
        }

        match EthernetPacket::parse(&frame, &self.checksum_caps) {
            Ok(EthernetPacket::Ipv4(datagram)) => Some(datagram),
            Ok(EthernetPacket::Arp(arp)) => {
                self.process_arp(arp);
                None
            }
            Err(_) => {
                net_debug!("dropping malformed {} frame", frame.ethertype());
                None
            }
        }
    }

    fn process_arp(&mut self, arp: ArpRepr) {
        match arp.operation {
            ArpOperation::Request | ArpOperation::Reply => {}
            ArpOperation::Unknown(_) => return,
        }
        if !arp.source_hardware_addr.is_unicast() || arp.source_protocol_addr.is_unspecified() {
            return;
        }

        self.neighbors
            .fill(arp.source_protocol_addr, arp.source_hardware_addr, self.now);
        self.release_pending(arp.source_protocol_addr, arp.source_hardware_addr);

        if arp.operation == ArpOperation::Request && arp.target_protocol_addr == self.ip_addr {
            let reply = ArpRepr::reply_to(&arp, self.ethernet_addr);
            self.emit(EthernetPacket::Arp(reply), arp.source_hardware_addr);
        }
    }

    fn enqueue(&mut self, next_hop: Ipv4Address, datagram: Datagram) {
        let waiting = Waiting {
            next_hop,
            queued_at: self.now,
            datagram,
        };
        if self.pending.push_back(waiting).is_err() {
            net_debug!("pending queue full, dropping datagram for {}", next_hop);
        }
    }

    /// Send every queued datagram waiting for `protocol_addr`, in order.
    fn release_pending(&mut self, protocol_addr: Ipv4Address, hardware_addr: EthernetAddress) {
        let mut pending = core::mem::replace(&mut self.pending, Deque::new());
        while let Some(waiting) = pending.pop_front() {
            if waiting.next_hop == protocol_addr {
                self.emit(EthernetPacket::Ipv4(waiting.datagram), hardware_addr);
            } else {
                // Same capacity as before, so this never fails.
                let _ = self.pending.push_back(waiting);
            }
        }
    }

    /// Drop datagrams whose ARP request has gone unanswered for a full
    /// request interval.
    fn expire_pending(&mut self) {
        let mut pending = core::mem::replace(&mut self.pending, Deque::new());
        while let Some(waiting) = pending.pop_front() {
            if self.now < waiting.queued_at + NeighborCache::SILENT_TIME {
                let _ = self.pending.push_back(waiting);
            } else {
                net_debug!("no ARP reply from {}, dropping datagram", waiting.next_hop);
            }
        }
    }

    fn emit(&mut self, packet: EthernetPacket, dst_addr: EthernetAddress) {
        let frame = packet.to_frame(self.ethernet_addr, dst_addr, &self.checksum_caps);
        net_trace!("{}: sending {} frame to {}", self.ip_addr, packet.ethertype(), dst_addr);
        self.frames_out.push_back(frame);
    }

    /// Let `delta` of time pass, forgetting hardware addresses that expired
    /// and datagrams that waited too long for one.
    pub fn tick(&mut self, delta: Duration) {
        self.now += delta;
        self.neighbors.expire(self.now);
        self.expire_pending();
    }

    /// Return the number of datagrams waiting for address resolution.
    pub fn pending_datagrams(&self) -> usize {
        self.pending.len()
    }

    /// Return the number of hardware addresses currently known.
    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Frames ready for the link, oldest first.
    pub fn frames_out(&mut self) -> &mut VecDeque<Vec<u8>> {
        &mut self.frames_out
    }
}
