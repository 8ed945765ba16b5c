use alloc::vec;

use crate::iface::Datagram;
use crate::phy::ChecksumCapabilities;
use crate::wire::{
    IpEndpoint, IpProtocol, Ipv4Repr, TcpPacket, TcpSegment, IPV4_DEFAULT_HOP_LIMIT,
};

/// Carries the segments of one connection inside IPv4 datagrams.
///
/// The adapter stamps ports and addresses on the way out, and on the way
/// in accepts only segments for its own endpoint that come from its peer.
/// An adapter created with [new] does not know its peer yet; it adopts the
/// sender of the first SYN it accepts.
///
/// [new]: #method.new
#[derive(Debug, Clone)]
pub struct Ipv4Adapter {
    local: IpEndpoint,
    remote: Option<IpEndpoint>,
    checksum_caps: ChecksumCapabilities,
    hop_limit: u8,
}

impl Ipv4Adapter {
    /// Create an adapter that waits for a peer to connect to `local`.
    pub fn new(local: IpEndpoint) -> Ipv4Adapter {
        Ipv4Adapter {
            local,
            remote: None,
            checksum_caps: ChecksumCapabilities::default(),
            hop_limit: IPV4_DEFAULT_HOP_LIMIT,
        }
    }

    /// Create an adapter between `local` and a known `remote`.
    pub fn connected(local: IpEndpoint, remote: IpEndpoint) -> Ipv4Adapter {
        Ipv4Adapter {
            remote: Some(remote),
            ..Ipv4Adapter::new(local)
        }
    }

    pub fn local(&self) -> IpEndpoint {
        self.local
    }

    pub fn remote(&self) -> Option<IpEndpoint> {
        self.remote
    }

    /// Choose which checksums are computed and verified.
    pub fn set_checksum_caps(&mut self, checksum_caps: ChecksumCapabilities) {
        self.checksum_caps = checksum_caps;
    }

    pub fn set_hop_limit(&mut self, hop_limit: u8) {
        self.hop_limit = hop_limit;
    }

    /// Wrap `segment` into a datagram for the peer.
    ///
    /// Returns `None` while the peer is unknown.
    pub fn wrap(&self, segment: &TcpSegment) -> Option<Datagram> {
        let remote = self.remote?;

        let mut segment = segment.clone();
        segment.header.src_port = self.local.port;
        segment.header.dst_port = remote.port;

        let mut payload = vec![0; segment.buffer_len()];
        segment.emit(
            &mut TcpPacket::new_unchecked(&mut payload[..]),
            &self.local.addr,
            &remote.addr,
            &self.checksum_caps,
        );

        let header = Ipv4Repr {
            src_addr: self.local.addr,
            dst_addr: remote.addr,
            next_header: IpProtocol::Tcp,
            payload_len: payload.len(),
            hop_limit: self.hop_limit,
        };
        Some(Datagram::new(header, payload))
    }

    /// Extract the segment carried by `datagram`, if it belongs to this
    /// connection.
    pub fn unwrap(&mut self, datagram: &Datagram) -> Option<TcpSegment> {
        let header = &datagram.header;
        if header.next_header != IpProtocol::Tcp || header.dst_addr != self.local.addr {
            return None;
        }

        let packet = TcpPacket::new_checked(&datagram.payload[..]).ok()?;
        let segment = match TcpSegment::parse(
            &packet,
            &header.src_addr,
            &header.dst_addr,
            &self.checksum_caps,
        ) {
            Ok(segment) => segment,
            Err(_) => {
                net_debug!("{}: dropping malformed segment from {}", self.local, header.src_addr);
                return None;
            }
        };
        if segment.header.dst_port != self.local.port {
            return None;
        }

        let src = IpEndpoint::new(header.src_addr, segment.header.src_port);
        match self.remote {
            Some(remote) if remote == src => {}
            Some(_) => return None,
            None if segment.header.syn() => {
                net_debug!("{}: accepting peer {}", self.local, src);
                self.remote = Some(src);
            }
            None => return None,
        }
        Some(segment)
    }
}
