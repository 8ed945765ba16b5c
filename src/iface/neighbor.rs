// Heads up! Before working on this file you should read, at least,
// the parts of RFC 1122 that discuss ARP.

use heapless::LinearMap;

use crate::config::{IFACE_NEIGHBOR_CACHE_COUNT, IFACE_PENDING_REQUEST_COUNT};
use crate::time::{Duration, Instant};
use crate::wire::{EthernetAddress, Ipv4Address};

/// A cached neighbor.
///
/// A neighbor mapping translates from a protocol address to a hardware address,
/// and contains the timestamp past which the mapping should be discarded.
#[derive(Debug, Clone, Copy)]
pub struct Neighbor {
    hardware_addr: EthernetAddress,
    expires_at: Instant,
}

/// An answer to a neighbor cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Answer {
    /// The neighbor address is in the cache and not expired.
    Found(EthernetAddress),
    /// The neighbor address is not in the cache, or has expired.
    NotFound,
    /// The neighbor address is not in the cache, or has expired,
    /// and a lookup has been made recently.
    RateLimited,
}

/// A neighbor cache backed by a map.
///
/// Besides the mappings themselves, the cache remembers when it last asked
/// for each unresolved address, so that a burst of datagrams for the same
/// next hop produces a single request.
#[derive(Debug)]
pub struct Cache {
    storage: LinearMap<Ipv4Address, Neighbor, IFACE_NEIGHBOR_CACHE_COUNT>,
    silent_until: LinearMap<Ipv4Address, Instant, IFACE_PENDING_REQUEST_COUNT>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    /// Minimum delay between requests for the same address.
    pub(crate) const SILENT_TIME: Duration = Duration::from_secs(5);

    /// Neighbor entry lifetime.
    pub(crate) const ENTRY_LIFETIME: Duration = Duration::from_secs(30);

    /// Create a cache.
    pub fn new() -> Self {
        Self {
            storage: LinearMap::new(),
            silent_until: LinearMap::new(),
        }
    }

    pub fn fill(
        &mut self,
        protocol_addr: Ipv4Address,
        hardware_addr: EthernetAddress,
        timestamp: Instant,
    ) {
        let neighbor = Neighbor {
            expires_at: timestamp + Self::ENTRY_LIFETIME,
            hardware_addr,
        };
        // The address is resolved, so there is nothing left to rate limit.
        self.silent_until.remove(&protocol_addr);

        match self.storage.insert(protocol_addr, neighbor) {
            Ok(Some(old_neighbor)) => {
                if old_neighbor.hardware_addr != hardware_addr {
                    net_trace!(
                        "replaced {} => {} (was {})",
                        protocol_addr,
                        hardware_addr,
                        old_neighbor.hardware_addr
                    );
                }
            }
            Ok(None) => {
                net_trace!("filled {} => {} (was empty)", protocol_addr, hardware_addr);
            }
            Err((protocol_addr, neighbor)) => {
                // The cache is full; evict the entry closest to expiry.
                let oldest = self
                    .storage
                    .iter()
                    .min_by_key(|(_, neighbor)| neighbor.expires_at)
                    .map(|(addr, _)| *addr);
                if let Some(old_protocol_addr) = oldest {
                    self.storage.remove(&old_protocol_addr);
                    net_trace!(
                        "filled {} => {} (evicted {})",
                        protocol_addr,
                        hardware_addr,
                        old_protocol_addr
                    );
                }
                let _ = self.storage.insert(protocol_addr, neighbor);
            }
        }
    }

    pub(crate) fn lookup(&self, protocol_addr: &Ipv4Address, timestamp: Instant) -> Answer {
        if let Some(&Neighbor {
            expires_at,
            hardware_addr,
        }) = self.storage.get(protocol_addr)
        {
            if timestamp < expires_at {
                return Answer::Found(hardware_addr);
            }
        }

        match self.silent_until.get(protocol_addr) {
            Some(&silent_until) if timestamp < silent_until => Answer::RateLimited,
            _ => Answer::NotFound,
        }
    }

    /// Record that a request for `protocol_addr` went out at `timestamp`.
    pub(crate) fn limit_rate(&mut self, protocol_addr: Ipv4Address, timestamp: Instant) {
        let until = timestamp + Self::SILENT_TIME;
        if let Err((protocol_addr, until)) = self.silent_until.insert(protocol_addr, until) {
            // Forget the request that will be allowed again soonest.
            let soonest = self
                .silent_until
                .iter()
                .min_by_key(|(_, until)| **until)
                .map(|(addr, _)| *addr);
            if let Some(addr) = soonest {
                self.silent_until.remove(&addr);
            }
            let _ = self.silent_until.insert(protocol_addr, until);
        }
    }

    /// Drop every mapping and rate limit that ran out by `timestamp`.
    pub(crate) fn expire(&mut self, timestamp: Instant) {
        let mut expired: heapless::Vec<Ipv4Address, IFACE_NEIGHBOR_CACHE_COUNT> =
            heapless::Vec::new();
        for (addr, neighbor) in self.storage.iter() {
            if neighbor.expires_at <= timestamp {
                let _ = expired.push(*addr);
            }
        }
        for addr in &expired {
            net_trace!("expired {}", addr);
            self.storage.remove(addr);
        }

        let mut quiet: heapless::Vec<Ipv4Address, IFACE_PENDING_REQUEST_COUNT> =
            heapless::Vec::new();
        for (addr, until) in self.silent_until.iter() {
            if *until <= timestamp {
                let _ = quiet.push(*addr);
            }
        }
        for addr in &quiet {
            self.silent_until.remove(addr);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.storage.len()
    }
}
