use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;

use super::{Error, Result};
use super::{EthernetAddress, EthernetProtocol, Ipv4Address};

enum_with_unknown! {
    /// ARP hardware type.
    pub enum Hardware(u16) {
        Ethernet = 1
    }
}

enum_with_unknown! {
    /// ARP operation type.
    pub enum Operation(u16) {
        Request = 1,
        Reply = 2
    }
}

/// A read/write wrapper around an ARP packet that maps IPv4 addresses to
/// Ethernet addresses.
///
/// Only that pairing is laid out here, so every field sits at a fixed
/// offset. [is_ethernet_ipv4] tells whether a received packet actually uses
/// it.
///
/// [is_ethernet_ipv4]: #method.is_ethernet_ipv4
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

mod field {
    use crate::wire::field::*;

    pub const HTYPE: Field = 0..2;
    pub const PTYPE: Field = 2..4;
    pub const HLEN: usize = 4;
    pub const PLEN: usize = 5;
    pub const OPER: Field = 6..8;
    pub const SENDER_HW: Field = 8..14;
    pub const SENDER_IP: Field = 14..18;
    pub const TARGET_HW: Field = 18..24;
    pub const TARGET_IP: Field = 24..28;
}

/// Length of an Ethernet/IPv4 ARP packet.
pub const PACKET_LEN: usize = field::TARGET_IP.end;

const ETHERNET_ADDR_LEN: u8 = 6;
const IPV4_ADDR_LEN: u8 = 4;

impl<T: AsRef<[u8]>> Packet<T> {
    pub const fn new_unchecked(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    pub fn new_checked(buffer: T) -> Result<Packet<T>> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    /// Ensure that no accessor method will panic if called.
    pub fn check_len(&self) -> Result<()> {
        if self.buffer.as_ref().len() < PACKET_LEN {
            Err(Error)
        } else {
            Ok(())
        }
    }

    pub fn into_inner(self) -> T {
        self.buffer
    }

    /// Query whether the type and length fields describe Ethernet hardware
    /// addresses and IPv4 protocol addresses.
    pub fn is_ethernet_ipv4(&self) -> bool {
        let data = self.buffer.as_ref();
        Hardware::from(NetworkEndian::read_u16(&data[field::HTYPE])) == Hardware::Ethernet
            && EthernetProtocol::from(NetworkEndian::read_u16(&data[field::PTYPE]))
                == EthernetProtocol::Ipv4
            && data[field::HLEN] == ETHERNET_ADDR_LEN
            && data[field::PLEN] == IPV4_ADDR_LEN
    }

    #[inline]
    pub fn operation(&self) -> Operation {
        Operation::from(NetworkEndian::read_u16(&self.buffer.as_ref()[field::OPER]))
    }

    #[inline]
    pub fn sender_hardware_addr(&self) -> EthernetAddress {
        EthernetAddress::from_bytes(&self.buffer.as_ref()[field::SENDER_HW])
    }

    #[inline]
    pub fn sender_protocol_addr(&self) -> Ipv4Address {
        read_ipv4(&self.buffer.as_ref()[field::SENDER_IP])
    }

    #[inline]
    pub fn target_hardware_addr(&self) -> EthernetAddress {
        EthernetAddress::from_bytes(&self.buffer.as_ref()[field::TARGET_HW])
    }

    #[inline]
    pub fn target_protocol_addr(&self) -> Ipv4Address {
        read_ipv4(&self.buffer.as_ref()[field::TARGET_IP])
    }
}

fn read_ipv4(data: &[u8]) -> Ipv4Address {
    Ipv4Address::from_bits(NetworkEndian::read_u32(data))
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    /// Fill the type and length fields for Ethernet over IPv4.
    pub fn set_ethernet_ipv4(&mut self) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::HTYPE], Hardware::Ethernet.into());
        NetworkEndian::write_u16(&mut data[field::PTYPE], EthernetProtocol::Ipv4.into());
        data[field::HLEN] = ETHERNET_ADDR_LEN;
        data[field::PLEN] = IPV4_ADDR_LEN;
    }

    #[inline]
    pub fn set_operation(&mut self, value: Operation) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::OPER], value.into())
    }

    pub fn set_sender(&mut self, hardware_addr: EthernetAddress, protocol_addr: Ipv4Address) {
        let data = self.buffer.as_mut();
        data[field::SENDER_HW].copy_from_slice(hardware_addr.as_bytes());
        NetworkEndian::write_u32(&mut data[field::SENDER_IP], protocol_addr.to_bits());
    }

    pub fn set_target(&mut self, hardware_addr: EthernetAddress, protocol_addr: Ipv4Address) {
        let data = self.buffer.as_mut();
        data[field::TARGET_HW].copy_from_slice(hardware_addr.as_bytes());
        NetworkEndian::write_u32(&mut data[field::TARGET_IP], protocol_addr.to_bits());
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Packet<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

/// A parsed Ethernet/IPv4 ARP message.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub operation: Operation,
    pub source_hardware_addr: EthernetAddress,
    pub source_protocol_addr: Ipv4Address,
    pub target_hardware_addr: EthernetAddress,
    pub target_protocol_addr: Ipv4Address,
}

impl Repr {
    /// Build a request asking who owns `target_protocol_addr`.
    pub fn request(
        source_hardware_addr: EthernetAddress,
        source_protocol_addr: Ipv4Address,
        target_protocol_addr: Ipv4Address,
    ) -> Repr {
        Repr {
            operation: Operation::Request,
            source_hardware_addr,
            source_protocol_addr,
            target_hardware_addr: EthernetAddress::default(),
            target_protocol_addr,
        }
    }

    /// Build the reply to `request`, announcing that `hardware_addr` owns the
    /// protocol address that was asked for.
    pub fn reply_to(request: &Repr, hardware_addr: EthernetAddress) -> Repr {
        Repr {
            operation: Operation::Reply,
            source_hardware_addr: hardware_addr,
            source_protocol_addr: request.target_protocol_addr,
            target_hardware_addr: request.source_hardware_addr,
            target_protocol_addr: request.source_protocol_addr,
        }
    }

    /// Parse a packet, refusing any hardware/protocol pairing other than
    /// Ethernet/IPv4.
    pub fn parse<T: AsRef<[u8]>>(packet: &Packet<T>) -> Result<Repr> {
        packet.check_len()?;
        if !packet.is_ethernet_ipv4() {
            return Err(Error);
        }
        Ok(Repr {
            operation: packet.operation(),
            source_hardware_addr: packet.sender_hardware_addr(),
            source_protocol_addr: packet.sender_protocol_addr(),
            target_hardware_addr: packet.target_hardware_addr(),
            target_protocol_addr: packet.target_protocol_addr(),
        })
    }

    pub const fn buffer_len(&self) -> usize {
        PACKET_LEN
    }

    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]>>(&self, packet: &mut Packet<T>) {
        packet.set_ethernet_ipv4();
        packet.set_operation(self.operation);
        packet.set_sender(self.source_hardware_addr, self.source_protocol_addr);
        packet.set_target(self.target_hardware_addr, self.target_protocol_addr);
    }
}

impl<T: AsRef<[u8]>> fmt::Display for Packet<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match Repr::parse(self) {
            Ok(repr) => write!(f, "{repr}"),
            Err(_) => write!(f, "ARP (unsupported)"),
        }
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.operation {
            Operation::Request => write!(
                f,
                "ARP who-has {} tell {} ({})",
                self.target_protocol_addr, self.source_protocol_addr, self.source_hardware_addr
            ),
            Operation::Reply => write!(
                f,
                "ARP {} is-at {} (to {})",
                self.source_protocol_addr, self.source_hardware_addr, self.target_protocol_addr
            ),
            Operation::Unknown(op) => write!(
                f,
                "ARP op={op} {}/{} -> {}/{}",
                self.source_hardware_addr,
                self.source_protocol_addr,
                self.target_hardware_addr,
                self.target_protocol_addr
            ),
        }
    }
}
