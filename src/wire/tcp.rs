use alloc::rc::Rc;
use bitflags::bitflags;
use byteorder::{ByteOrder, NetworkEndian};
use core::{fmt, ops};

use super::{Error, IpProtocol, Ipv4Address, Result};
use crate::phy::ChecksumCapabilities;
use crate::wire::ip::checksum;

/// A TCP sequence number, as carried on the wire.
///
/// Sequence numbers are 32-bit and wrap around. Inside a connection every
/// position is tracked as a 64-bit absolute index that starts at zero (the
/// SYN) and never wraps; [wrap] and [unwrap] convert between the two given
/// the initial sequence number of that direction.
///
/// [wrap]: #method.wrap
/// [unwrap]: #method.unwrap
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct SeqNumber(pub u32);

impl SeqNumber {
    /// Convert the absolute index `n` into a wire sequence number.
    pub const fn wrap(n: u64, isn: SeqNumber) -> SeqNumber {
        SeqNumber(isn.0.wrapping_add(n as u32))
    }

    /// Convert a wire sequence number into the absolute index closest to
    /// `checkpoint`.
    ///
    /// The result lies in `[checkpoint - 2^31, checkpoint + 2^31)`, except
    /// that it is never negative: near zero the candidate one wrap higher is
    /// returned instead.
    pub fn unwrap(self, isn: SeqNumber, checkpoint: u64) -> u64 {
        let offset = (self - SeqNumber::wrap(checkpoint, isn)) as i64;
        match checkpoint.checked_add_signed(offset) {
            Some(abs) => abs,
            None if offset < 0 => checkpoint + (offset + (1 << 32)) as u64,
            None => checkpoint - ((1 << 32) - offset) as u64,
        }
    }
}

impl ops::Add<u32> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: u32) -> SeqNumber {
        SeqNumber(self.0.wrapping_add(rhs))
    }
}

impl ops::Sub for SeqNumber {
    /// The signed distance between two sequence numbers.
    type Output = i32;

    fn sub(self, rhs: SeqNumber) -> i32 {
        self.0.wrapping_sub(rhs.0) as i32
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags! {
    /// The control bits of a TCP header.
    #[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
    pub struct Flags: u8 {
        const FIN = 0x01;
        const SYN = 0x02;
        const RST = 0x04;
        const PSH = 0x08;
        const ACK = 0x10;
        const URG = 0x20;
    }
}

impl Default for Flags {
    fn default() -> Flags {
        Flags::empty()
    }
}

/// A read/write wrapper around a Transmission Control Protocol packet buffer.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

mod field {
    use crate::wire::field::*;

    pub const SRC_PORT: Field = 0..2;
    pub const DST_PORT: Field = 2..4;
    pub const SEQ_NUM: Field = 4..8;
    pub const ACK_NUM: Field = 8..12;
    pub const DATA_OFF: usize = 12;
    pub const FLAGS: usize = 13;
    pub const WIN_SIZE: Field = 14..16;
    pub const CHECKSUM: Field = 16..18;
    pub const URGENT: Field = 18..20;
}

/// The length of a TCP header without options.
pub const HEADER_LEN: usize = field::URGENT.end;

impl<T: AsRef<[u8]>> Packet<T> {
    /// Imbue a raw octet buffer with TCP packet structure.
    pub const fn new_unchecked(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(buffer: T) -> Result<Packet<T>> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    /// Ensure that no accessor method will panic if called.
    /// Returns `Err(Error)` if the buffer is too short, or if the data
    /// offset field points outside of it or into the fixed header.
    ///
    /// The result of this check is invalidated by calling [set_header_len].
    ///
    /// [set_header_len]: #method.set_header_len
    pub fn check_len(&self) -> Result<()> {
        let len = self.buffer.as_ref().len();
        if len < HEADER_LEN {
            return Err(Error);
        }
        let header_len = self.header_len() as usize;
        if header_len < HEADER_LEN || len < header_len {
            Err(Error)
        } else {
            Ok(())
        }
    }

    /// Consume the packet, returning the underlying buffer.
    pub fn into_inner(self) -> T {
        self.buffer
    }

    /// Return the source port field.
    #[inline]
    pub fn src_port(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::SRC_PORT])
    }

    /// Return the destination port field.
    #[inline]
    pub fn dst_port(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::DST_PORT])
    }

    /// Return the sequence number field.
    #[inline]
    pub fn seq_number(&self) -> SeqNumber {
        let data = self.buffer.as_ref();
        SeqNumber(NetworkEndian::read_u32(&data[field::SEQ_NUM]))
    }

    /// Return the acknowledgement number field.
    #[inline]
    pub fn ack_number(&self) -> SeqNumber {
        let data = self.buffer.as_ref();
        SeqNumber(NetworkEndian::read_u32(&data[field::ACK_NUM]))
    }

    /// Return the header length, in octets.
    #[inline]
    pub fn header_len(&self) -> u8 {
        let data = self.buffer.as_ref();
        (data[field::DATA_OFF] >> 4) * 4
    }

    /// Return the control bits. Reserved bits are dropped.
    #[inline]
    pub fn flags(&self) -> Flags {
        let data = self.buffer.as_ref();
        Flags::from_bits_truncate(data[field::FLAGS])
    }

    /// Return the window size field.
    #[inline]
    pub fn window_len(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::WIN_SIZE])
    }

    /// Return the checksum field.
    #[inline]
    pub fn checksum(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::CHECKSUM])
    }

    /// Return the urgent pointer field.
    #[inline]
    pub fn urgent_at(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::URGENT])
    }

    /// Validate the packet checksum.
    ///
    /// # Fuzzing
    /// This function always returns `true` when fuzzing.
    pub fn verify_checksum(&self, src_addr: &Ipv4Address, dst_addr: &Ipv4Address) -> bool {
        if cfg!(fuzzing) {
            return true;
        }

        let data = self.buffer.as_ref();
        checksum::combine(&[
            checksum::pseudo_header_v4(src_addr, dst_addr, IpProtocol::Tcp, data.len() as u32),
            checksum::data(data),
        ]) == !0
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    /// Return a pointer to the payload, skipping any options.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let header_len = self.header_len() as usize;
        let data = self.buffer.as_ref();
        &data[header_len..]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    /// Set the source port field.
    #[inline]
    pub fn set_src_port(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::SRC_PORT], value)
    }

    /// Set the destination port field.
    #[inline]
    pub fn set_dst_port(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::DST_PORT], value)
    }

    /// Set the sequence number field.
    #[inline]
    pub fn set_seq_number(&mut self, value: SeqNumber) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u32(&mut data[field::SEQ_NUM], value.0)
    }

    /// Set the acknowledgement number field.
    #[inline]
    pub fn set_ack_number(&mut self, value: SeqNumber) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u32(&mut data[field::ACK_NUM], value.0)
    }

    /// Set the header length, in octets.
    #[inline]
    pub fn set_header_len(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        data[field::DATA_OFF] = (value / 4) << 4;
    }

    /// Set the control bits.
    #[inline]
    pub fn set_flags(&mut self, value: Flags) {
        let data = self.buffer.as_mut();
        data[field::FLAGS] = value.bits();
    }

    /// Set the window size field.
    #[inline]
    pub fn set_window_len(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::WIN_SIZE], value)
    }

    /// Set the checksum field.
    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::CHECKSUM], value)
    }

    /// Set the urgent pointer field.
    #[inline]
    pub fn set_urgent_at(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::URGENT], value)
    }

    /// Compute and fill in the checksum over header, options and payload.
    pub fn fill_checksum(&mut self, src_addr: &Ipv4Address, dst_addr: &Ipv4Address) {
        self.set_checksum(0);
        let checksum = {
            let data = self.buffer.as_ref();
            !checksum::combine(&[
                checksum::pseudo_header_v4(src_addr, dst_addr, IpProtocol::Tcp, data.len() as u32),
                checksum::data(data),
            ])
        };
        self.set_checksum(checksum)
    }

    /// Return a mutable pointer to the payload.
    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let header_len = self.header_len() as usize;
        let data = self.buffer.as_mut();
        &mut data[header_len..]
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Packet<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

/// The fixed part of a TCP header.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Header {
    pub src_port: u16,
    pub dst_port: u16,
    pub seqno: SeqNumber,
    pub ackno: SeqNumber,
    pub flags: Flags,
    pub window: u16,
    pub urgent: u16,
    /// The checksum that was carried on the wire; recomputed on emit.
    pub checksum: u16,
}

impl Header {
    pub fn syn(&self) -> bool {
        self.flags.contains(Flags::SYN)
    }

    pub fn ack(&self) -> bool {
        self.flags.contains(Flags::ACK)
    }

    pub fn fin(&self) -> bool {
        self.flags.contains(Flags::FIN)
    }

    pub fn rst(&self) -> bool {
        self.flags.contains(Flags::RST)
    }
}

/// A TCP segment: a header and the payload it carries.
///
/// The payload is reference counted, so a segment can sit in the
/// retransmission queue and in the outbound queue at the same time without
/// copying its bytes.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Segment {
    pub header: Header,
    pub payload: Rc<[u8]>,
}

impl Segment {
    /// Create a segment from a header and payload.
    pub fn new(header: Header, payload: &[u8]) -> Segment {
        Segment {
            header,
            payload: Rc::from(payload),
        }
    }

    /// Create a segment without payload.
    pub fn empty(header: Header) -> Segment {
        Segment::new(header, &[])
    }

    /// Return the number of sequence numbers this segment occupies.
    pub fn length_in_sequence_space(&self) -> usize {
        self.payload.len() + self.header.syn() as usize + self.header.fin() as usize
    }

    /// Parse a TCP packet carried between `src_addr` and `dst_addr`.
    ///
    /// Options are skipped. A packet with a zero port, or (when checksums
    /// are verified) a bad checksum, is rejected.
    pub fn parse<T: AsRef<[u8]> + ?Sized>(
        packet: &Packet<&T>,
        src_addr: &Ipv4Address,
        dst_addr: &Ipv4Address,
        checksum_caps: &ChecksumCapabilities,
    ) -> Result<Segment> {
        packet.check_len()?;

        if packet.src_port() == 0 || packet.dst_port() == 0 {
            return Err(Error);
        }
        if checksum_caps.tcp.rx() && !packet.verify_checksum(src_addr, dst_addr) {
            return Err(Error);
        }

        let header = Header {
            src_port: packet.src_port(),
            dst_port: packet.dst_port(),
            seqno: packet.seq_number(),
            ackno: packet.ack_number(),
            flags: packet.flags(),
            window: packet.window_len(),
            urgent: packet.urgent_at(),
            checksum: packet.checksum(),
        };
        Ok(Segment::new(header, packet.payload()))
    }

    /// Return the length of a packet that will be emitted from this segment.
    pub fn buffer_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Emit this segment into a TCP packet of exactly [buffer_len] octets.
    ///
    /// [buffer_len]: #method.buffer_len
    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]>>(
        &self,
        packet: &mut Packet<T>,
        src_addr: &Ipv4Address,
        dst_addr: &Ipv4Address,
        checksum_caps: &ChecksumCapabilities,
    ) {
        let header = &self.header;
        packet.set_src_port(header.src_port);
        packet.set_dst_port(header.dst_port);
        packet.set_seq_number(header.seqno);
        packet.set_ack_number(header.ackno);
        packet.set_header_len(HEADER_LEN as u8);
        packet.set_flags(header.flags);
        packet.set_window_len(header.window);
        packet.set_urgent_at(header.urgent);
        packet.payload_mut()[..self.payload.len()].copy_from_slice(&self.payload);

        if checksum_caps.tcp.tx() {
            packet.fill_checksum(src_addr, dst_addr)
        } else {
            // make sure we get a consistently zeroed checksum,
            // since implementations might rely on it
            packet.set_checksum(0);
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let header = &self.header;
        write!(f, "TCP src={} dst={}", header.src_port, header.dst_port)?;
        if header.syn() {
            write!(f, " syn")?;
        }
        if header.fin() {
            write!(f, " fin")?;
        }
        if header.rst() {
            write!(f, " rst")?;
        }
        write!(f, " seq={}", header.seqno)?;
        if header.ack() {
            write!(f, " ack={}", header.ackno)?;
        }
        write!(f, " win={} len={}", header.window, self.payload.len())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rand::Rand;

    const SRC_ADDR: Ipv4Address = Ipv4Address::new(10, 0, 0, 1);
    const DST_ADDR: Ipv4Address = Ipv4Address::new(10, 0, 0, 2);
    const BIG: u64 = 1 << 32;

    static PACKET_BYTES: [u8; 28] = [
        0xbf, 0x00, 0x00, 0x50, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x60, 0x12, 0x01,
        0x23, 0x7a, 0x77, 0x00, 0x00, 0x02, 0x04, 0x05, 0xb4, 0xaa, 0x00, 0x00, 0xff,
    ];

    static PAYLOAD_BYTES: [u8; 4] = [0xaa, 0x00, 0x00, 0xff];

    #[test]
    fn test_wrap() {
        assert_eq!(SeqNumber::wrap(3 * BIG, SeqNumber(0)), SeqNumber(0));
        assert_eq!(SeqNumber::wrap(3 * BIG + 17, SeqNumber(15)), SeqNumber(32));
        assert_eq!(SeqNumber::wrap(7 * BIG - 2, SeqNumber(15)), SeqNumber(13));
    }

    #[test]
    fn test_unwrap() {
        // Unwrap the first byte after ISN
        assert_eq!(SeqNumber(1).unwrap(SeqNumber(0), 0), 1);
        // Unwrap the first byte after the first wrap
        assert_eq!(SeqNumber(1).unwrap(SeqNumber(0), u32::MAX as u64), BIG + 1);
        // Unwrap the last byte before the third wrap
        assert_eq!(
            SeqNumber(u32::MAX - 1).unwrap(SeqNumber(0), 3 * BIG),
            3 * BIG - 2
        );
        assert_eq!(
            SeqNumber(u32::MAX - 10).unwrap(SeqNumber(0), 3 * BIG),
            3 * BIG - 11
        );
        // Non-zero ISN
        assert_eq!(
            SeqNumber(u32::MAX).unwrap(SeqNumber(10), 3 * BIG),
            3 * BIG - 11
        );
        assert_eq!(SeqNumber(u32::MAX).unwrap(SeqNumber(0), 0), u32::MAX as u64);
        assert_eq!(SeqNumber(16).unwrap(SeqNumber(16), 0), 0);
        assert_eq!(SeqNumber(15).unwrap(SeqNumber(16), 0), u32::MAX as u64);
        assert_eq!(
            SeqNumber(0).unwrap(SeqNumber(i32::MAX as u32), 0),
            i32::MAX as u64 + 2
        );
        assert_eq!(
            SeqNumber(u32::MAX).unwrap(SeqNumber(i32::MAX as u32), 0),
            1 << 31
        );
        assert_eq!(
            SeqNumber(u32::MAX).unwrap(SeqNumber(1 << 31), 0),
            (u32::MAX >> 1) as u64
        );
    }

    #[test]
    fn test_unwrap_roundtrip() {
        let mut rand = Rand::new(0x5eed);
        for _ in 0..1000 {
            let isn = SeqNumber(rand.rand_u32());
            let n = ((rand.rand_u32() as u64) << 20) | rand.rand_u32() as u64;
            assert_eq!(SeqNumber::wrap(n, isn).unwrap(isn, n), n);
            assert_eq!(SeqNumber::wrap(n + 1, isn).unwrap(isn, n), n + 1);
            assert_eq!(SeqNumber::wrap(n.saturating_sub(1), isn).unwrap(isn, n), n.saturating_sub(1));
        }
    }

    #[test]
    fn test_unwrap_closest_to_checkpoint() {
        let mut rand = Rand::new(42);
        for _ in 0..1000 {
            let isn = SeqNumber(rand.rand_u32());
            let seqno = SeqNumber(rand.rand_u32());
            let checkpoint = BIG + (((rand.rand_u32() as u64) << 16) | rand.rand_u32() as u64);
            let abs = seqno.unwrap(isn, checkpoint);
            assert!(abs >= checkpoint - (1 << 31));
            assert!(abs < checkpoint + (1 << 31));
            assert_eq!(SeqNumber::wrap(abs, isn), seqno);
        }
    }

    #[test]
    fn test_unwrap_never_negative() {
        let mut rand = Rand::new(7);
        for _ in 0..1000 {
            let isn = SeqNumber(rand.rand_u32());
            let seqno = SeqNumber(rand.rand_u32());
            let checkpoint = (rand.rand_u32() >> 2) as u64;
            let abs = seqno.unwrap(isn, checkpoint);
            assert!(abs < BIG);
            assert_eq!(SeqNumber::wrap(abs, isn), seqno);
        }
    }

    #[test]
    fn test_seq_arithmetic() {
        assert_eq!(SeqNumber(u32::MAX) + 2, SeqNumber(1));
        assert_eq!(SeqNumber(1) - SeqNumber(u32::MAX), 2);
        assert_eq!(SeqNumber(u32::MAX) - SeqNumber(1), -2);
    }

    #[test]
    fn test_deconstruct() {
        let packet = Packet::new_checked(&PACKET_BYTES[..]).unwrap();
        assert_eq!(packet.src_port(), 48896);
        assert_eq!(packet.dst_port(), 80);
        assert_eq!(packet.seq_number(), SeqNumber(0x01234567));
        assert_eq!(packet.ack_number(), SeqNumber(0x89abcdef));
        assert_eq!(packet.header_len(), 24);
        assert_eq!(packet.flags(), Flags::SYN | Flags::ACK);
        assert_eq!(packet.window_len(), 0x0123);
        assert_eq!(packet.urgent_at(), 0);
        assert_eq!(packet.payload(), &PAYLOAD_BYTES[..]);
        assert!(packet.verify_checksum(&SRC_ADDR, &DST_ADDR));
    }

    #[test]
    fn test_parse_skips_options() {
        let packet = Packet::new_unchecked(&PACKET_BYTES[..]);
        let segment =
            Segment::parse(&packet, &SRC_ADDR, &DST_ADDR, &ChecksumCapabilities::default())
                .unwrap();
        assert!(segment.header.syn());
        assert!(segment.header.ack());
        assert!(!segment.header.fin());
        assert_eq!(&segment.payload[..], &PAYLOAD_BYTES[..]);
        assert_eq!(segment.length_in_sequence_space(), 5);
    }

    #[test]
    fn test_emit_then_parse() {
        let segment = Segment::new(
            Header {
                src_port: 1234,
                dst_port: 80,
                seqno: SeqNumber(100),
                ackno: SeqNumber(200),
                flags: Flags::ACK | Flags::FIN,
                window: 4096,
                ..Header::default()
            },
            b"hello",
        );
        let mut bytes = std::vec![0xa5; segment.buffer_len()];
        let mut packet = Packet::new_unchecked(&mut bytes[..]);
        segment.emit(
            &mut packet,
            &SRC_ADDR,
            &DST_ADDR,
            &ChecksumCapabilities::default(),
        );

        let packet = Packet::new_checked(&bytes[..]).unwrap();
        let parsed =
            Segment::parse(&packet, &SRC_ADDR, &DST_ADDR, &ChecksumCapabilities::default())
                .unwrap();
        assert_eq!(parsed.header.flags, Flags::ACK | Flags::FIN);
        assert_eq!(parsed.header.seqno, SeqNumber(100));
        assert_eq!(parsed.header.ackno, SeqNumber(200));
        assert_eq!(parsed.header.window, 4096);
        assert_eq!(&parsed.payload[..], b"hello");
        assert_eq!(parsed.length_in_sequence_space(), 6);
    }

    #[test]
    fn test_bad_checksum() {
        let mut bytes = PACKET_BYTES;
        bytes[27] ^= 0x01;
        let packet = Packet::new_unchecked(&bytes[..]);
        assert_eq!(
            Segment::parse(&packet, &SRC_ADDR, &DST_ADDR, &ChecksumCapabilities::default()),
            Err(Error)
        );
        assert!(
            Segment::parse(&packet, &SRC_ADDR, &DST_ADDR, &ChecksumCapabilities::ignored())
                .is_ok()
        );
        // The pseudo header covers the addresses too.
        let packet = Packet::new_unchecked(&PACKET_BYTES[..]);
        assert!(!packet.verify_checksum(&DST_ADDR, &DST_ADDR));
    }

    #[test]
    fn test_truncated() {
        assert_eq!(Packet::new_checked(&PACKET_BYTES[..19]).err(), Some(Error));
        let mut bytes = PACKET_BYTES;
        bytes[12] = 0xf0;
        assert_eq!(Packet::new_checked(&bytes[..]).err(), Some(Error));
        bytes[12] = 0x40;
        assert_eq!(Packet::new_checked(&bytes[..]).err(), Some(Error));
    }
}
