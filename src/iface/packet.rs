use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::phy::ChecksumCapabilities;
use crate::wire::*;

/// What an Ethernet frame carried, once its header is stripped.
#[derive(Debug, PartialEq)]
pub(crate) enum EthernetPacket {
    Arp(ArpRepr),
    Ipv4(Datagram),
}

impl EthernetPacket {
    /// Parse the payload of `frame`. Frames of other ethertypes are rejected.
    pub(crate) fn parse<T: AsRef<[u8]> + ?Sized>(
        frame: &EthernetFrame<&T>,
        checksum_caps: &ChecksumCapabilities,
    ) -> Result<EthernetPacket> {
        match frame.ethertype() {
            EthernetProtocol::Arp => {
                let packet = ArpPacket::new_checked(frame.payload())?;
                Ok(EthernetPacket::Arp(ArpRepr::parse(&packet)?))
            }
            EthernetProtocol::Ipv4 => Ok(EthernetPacket::Ipv4(Datagram::parse(
                frame.payload(),
                checksum_caps,
            )?)),
            _ => Err(Error),
        }
    }

    pub(crate) fn ethertype(&self) -> EthernetProtocol {
        match self {
            EthernetPacket::Arp(_) => EthernetProtocol::Arp,
            EthernetPacket::Ipv4(_) => EthernetProtocol::Ipv4,
        }
    }

    pub(crate) fn buffer_len(&self) -> usize {
        match self {
            EthernetPacket::Arp(repr) => repr.buffer_len(),
            EthernetPacket::Ipv4(datagram) => datagram.buffer_len(),
        }
    }

    /// Serialize into a complete Ethernet frame.
    pub(crate) fn to_frame(
        &self,
        src_addr: EthernetAddress,
        dst_addr: EthernetAddress,
        checksum_caps: &ChecksumCapabilities,
    ) -> Vec<u8> {
        let repr = EthernetRepr {
            src_addr,
            dst_addr,
            ethertype: self.ethertype(),
        };
        let mut buffer = vec![0; repr.buffer_len() + self.buffer_len()];
        let mut frame = EthernetFrame::new_unchecked(&mut buffer[..]);
        repr.emit(&mut frame);
        match self {
            EthernetPacket::Arp(arp) => arp.emit(&mut ArpPacket::new_unchecked(frame.payload_mut())),
            EthernetPacket::Ipv4(datagram) => datagram.emit(frame.payload_mut(), checksum_caps),
        }
        buffer
    }
}

/// An IPv4 datagram: a parsed header and the bytes it carries.
///
/// The payload length in the header always follows the payload; it is
/// recomputed on emission.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Datagram {
    pub header: Ipv4Repr,
    pub payload: Vec<u8>,
}

impl Datagram {
    pub fn new(mut header: Ipv4Repr, payload: Vec<u8>) -> Datagram {
        header.payload_len = payload.len();
        Datagram { header, payload }
    }

    /// Parse a serialized IPv4 datagram.
    ///
    /// Bytes past the total length given in the header (Ethernet padding)
    /// are dropped.
    pub fn parse(buffer: &[u8], checksum_caps: &ChecksumCapabilities) -> Result<Datagram> {
        let packet = Ipv4Packet::new_checked(buffer)?;
        let header = Ipv4Repr::parse(&packet, checksum_caps)?;
        Ok(Datagram {
            header,
            payload: packet.payload().to_vec(),
        })
    }

    /// Return the length of the serialized datagram.
    pub fn buffer_len(&self) -> usize {
        self.header.buffer_len() + self.payload.len()
    }

    /// Emit the datagram into `buffer`, which must be exactly [buffer_len] octets.
    ///
    /// [buffer_len]: #method.buffer_len
    pub fn emit(&self, buffer: &mut [u8], checksum_caps: &ChecksumCapabilities) {
        let header = Ipv4Repr {
            payload_len: self.payload.len(),
            ..self.header
        };
        let mut packet = Ipv4Packet::new_unchecked(buffer);
        header.emit(&mut packet, checksum_caps);
        packet.payload_mut().copy_from_slice(&self.payload);
    }

    /// Serialize the datagram into a fresh buffer.
    pub fn to_bytes(&self, checksum_caps: &ChecksumCapabilities) -> Vec<u8> {
        let mut buffer = vec![0; self.buffer_len()];
        self.emit(&mut buffer, checksum_caps);
        buffer
    }
}

impl fmt::Display for Datagram {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} ttl={} len={}",
            self.header,
            self.header.hop_limit,
            self.payload.len()
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn datagram() -> Datagram {
        Datagram::new(
            Ipv4Repr {
                src_addr: Ipv4Address::new(10, 0, 0, 1),
                dst_addr: Ipv4Address::new(10, 0, 0, 2),
                next_header: IpProtocol::Tcp,
                payload_len: 0,
                hop_limit: 64,
            },
            std::vec![1, 2, 3, 4, 5],
        )
    }

    #[test]
    fn test_new_fixes_payload_len() {
        assert_eq!(datagram().header.payload_len, 5);
    }

    #[test]
    fn test_emit_parse() {
        let caps = ChecksumCapabilities::default();
        let bytes = datagram().to_bytes(&caps);
        assert_eq!(bytes.len(), 25);
        assert_eq!(Datagram::parse(&bytes, &caps), Ok(datagram()));
    }

    #[test]
    fn test_parse_strips_padding() {
        let caps = ChecksumCapabilities::default();
        let mut bytes = datagram().to_bytes(&caps);
        bytes.extend_from_slice(&[0; 21]);
        assert_eq!(Datagram::parse(&bytes, &caps), Ok(datagram()));
    }

    #[test]
    fn test_parse_bad_checksum() {
        let mut bytes = datagram().to_bytes(&ChecksumCapabilities::default());
        bytes[10] ^= 0xff;
        assert_eq!(
            Datagram::parse(&bytes, &ChecksumCapabilities::default()),
            Err(Error)
        );
        assert!(Datagram::parse(&bytes, &ChecksumCapabilities::ignored()).is_ok());
    }

    #[test]
    fn test_frame_roundtrip() {
        let caps = ChecksumCapabilities::default();
        let src = EthernetAddress([0x02, 0, 0, 0, 0, 1]);
        let packet = EthernetPacket::Ipv4(datagram());
        let bytes = packet.to_frame(src, EthernetAddress::BROADCAST, &caps);
        let frame = EthernetFrame::new_checked(&bytes[..]).unwrap();
        assert_eq!(frame.src_addr(), src);
        assert_eq!(frame.dst_addr(), EthernetAddress::BROADCAST);
        assert_eq!(EthernetPacket::parse(&frame, &caps), Ok(packet));
    }

    #[test]
    fn test_arp_frame_roundtrip() {
        let caps = ChecksumCapabilities::default();
        let src = EthernetAddress([0x02, 0, 0, 0, 0, 1]);
        let arp = ArpRepr::request(src, Ipv4Address::new(10, 0, 0, 1), Ipv4Address::new(10, 0, 0, 2));
        let bytes = EthernetPacket::Arp(arp).to_frame(src, EthernetAddress::BROADCAST, &caps);
        let frame = EthernetFrame::new_checked(&bytes[..]).unwrap();
        assert_eq!(frame.ethertype(), EthernetProtocol::Arp);
        assert_eq!(
            EthernetPacket::parse(&frame, &caps),
            Ok(EthernetPacket::Arp(arp))
        );
    }
}
