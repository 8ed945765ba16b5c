//! Compile-time limits and protocol defaults.
//!
//! Fixed-capacity tables (routes, neighbors) are sized from these constants,
//! and [`socket::tcp::Config`](crate::socket::tcp::Config) takes its defaults from them.

/// Default capacity of each half of a TCP connection, in bytes.
pub const TCP_DEFAULT_CAPACITY: usize = 64000;

/// Largest payload carried by a single TCP segment, in bytes.
pub const TCP_MAX_PAYLOAD_SIZE: usize = 1000;

/// Initial retransmission timeout, in milliseconds.
pub const TCP_DEFAULT_RT_TIMEOUT_MS: u64 = 1000;

/// Consecutive retransmissions tolerated before a connection is aborted.
pub const TCP_MAX_RETX_ATTEMPTS: u32 = 8;

/// Number of entries in a router's forwarding table.
pub const IFACE_MAX_ROUTE_COUNT: usize = 16;

/// Number of hardware address mappings kept by a network interface.
pub const IFACE_NEIGHBOR_CACHE_COUNT: usize = 16;

/// Number of addresses with an outstanding ARP request tracked for rate limiting.
pub const IFACE_PENDING_REQUEST_COUNT: usize = 16;

/// Number of outgoing datagrams a network interface holds while their next
/// hop is being resolved.
pub const IFACE_PENDING_DATAGRAM_COUNT: usize = 32;
