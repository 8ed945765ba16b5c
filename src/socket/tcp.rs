// Heads up! Before working on this file you should read, at least, RFC 793 and
// the parts of RFC 1122 that discuss TCP.

use alloc::collections::VecDeque;
use alloc::vec;
use core::fmt::Display;
use core::{cmp, fmt};

use managed::ManagedSlice;

use crate::config::{
    TCP_DEFAULT_CAPACITY, TCP_DEFAULT_RT_TIMEOUT_MS, TCP_MAX_PAYLOAD_SIZE, TCP_MAX_RETX_ATTEMPTS,
};
use crate::rand::Rand;
use crate::storage::ByteStream;
use crate::time::Duration;
use crate::wire::{TcpFlags, TcpSegment, TcpSeqNumber};

macro_rules! tcp_trace {
    ($($arg:expr),* $(,)?) => (net_log!(trace, $($arg),*));
}

mod adapter;
mod receiver;
mod sender;
mod timer;

pub use self::adapter::Ipv4Adapter;
pub use self::receiver::{Receiver, ReceiverState};
pub use self::sender::{Sender, SenderState};
pub use self::timer::RetransmissionTimer;

/// Error returned by [`Connection::connect`]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConnectError {
    InvalidState,
}

impl Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ConnectError::InvalidState => write!(f, "invalid state"),
        }
    }
}

impl core::error::Error for ConnectError {}

/// Error returned by [`Connection::write`]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SendError {
    InvalidState,
}

impl Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SendError::InvalidState => write!(f, "invalid state"),
        }
    }
}

impl core::error::Error for SendError {}

/// The state of a TCP connection, according to [RFC 793].
///
/// The state is not stored; it is derived from the states of the two halves
/// of the connection. `Reset` stands for a connection torn down by a reset,
/// sent or received.
///
/// [RFC 793]: https://tools.ietf.org/html/rfc793
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum State {
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
    Reset,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            State::Closed => write!(f, "CLOSED"),
            State::Listen => write!(f, "LISTEN"),
            State::SynSent => write!(f, "SYN-SENT"),
            State::SynReceived => write!(f, "SYN-RECEIVED"),
            State::Established => write!(f, "ESTABLISHED"),
            State::FinWait1 => write!(f, "FIN-WAIT-1"),
            State::FinWait2 => write!(f, "FIN-WAIT-2"),
            State::CloseWait => write!(f, "CLOSE-WAIT"),
            State::Closing => write!(f, "CLOSING"),
            State::LastAck => write!(f, "LAST-ACK"),
            State::TimeWait => write!(f, "TIME-WAIT"),
            State::Reset => write!(f, "RESET"),
        }
    }
}

/// Parameters of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Capacity of the inbound stream, which bounds the advertised window.
    pub recv_capacity: usize,
    /// Capacity of the outbound stream.
    pub send_capacity: usize,
    /// Initial retransmission timeout.
    pub rt_timeout: Duration,
    /// Consecutive retransmissions tolerated before the connection is aborted.
    pub max_retx_attempts: u32,
    /// Largest payload put in a single segment.
    pub max_payload_size: usize,
    /// Initial sequence number to use instead of a random one.
    pub fixed_isn: Option<TcpSeqNumber>,
    /// Seed for the initial sequence number when none is fixed.
    pub random_seed: u64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            recv_capacity: TCP_DEFAULT_CAPACITY,
            send_capacity: TCP_DEFAULT_CAPACITY,
            rt_timeout: Duration::from_millis(TCP_DEFAULT_RT_TIMEOUT_MS),
            max_retx_attempts: TCP_MAX_RETX_ATTEMPTS,
            max_payload_size: TCP_MAX_PAYLOAD_SIZE,
            fixed_isn: None,
            random_seed: 0,
        }
    }
}

/// A TCP connection.
///
/// A connection is a pair of byte streams joined by the protocol: the
/// application writes into the outbound stream and reads from the inbound
/// one, while the driver hands it segments from the peer, collects the
/// segments it produces, and tells it how much time has passed.
///
/// Every segment leaving the connection carries the current acknowledgement
/// number and window of the inbound half.
#[derive(Debug)]
pub struct Connection<'a> {
    sender: Sender<'a>,
    receiver: Receiver<'a>,
    segments_out: VecDeque<TcpSegment>,
    rt_timeout: Duration,
    max_retx_attempts: u32,
    active: bool,
    established: bool,
    /// Wait for stray retransmissions once both streams finished.
    linger_after_streams_finish: bool,
    time_since_last_segment_received: Duration,
    last_state: State,
}

impl<'a> Connection<'a> {
    /// Create a connection using the given buffers for its inbound and
    /// outbound streams.
    ///
    /// The capacities in `config` are ignored; the buffer lengths are used.
    pub fn new<T>(config: Config, rx_buffer: T, tx_buffer: T) -> Connection<'a>
    where
        T: Into<ManagedSlice<'a, u8>>,
    {
        let isn = match config.fixed_isn {
            Some(isn) => isn,
            None => TcpSeqNumber(Rand::new(config.random_seed).rand_u32()),
        };

        Connection {
            sender: Sender::new(
                ByteStream::new(tx_buffer),
                isn,
                config.rt_timeout,
                config.max_payload_size,
            ),
            receiver: Receiver::new(ByteStream::new(rx_buffer)),
            segments_out: VecDeque::new(),
            rt_timeout: config.rt_timeout,
            max_retx_attempts: config.max_retx_attempts,
            active: true,
            established: false,
            linger_after_streams_finish: true,
            time_since_last_segment_received: Duration::ZERO,
            last_state: State::Listen,
        }
    }

    /// Create a connection with heap buffers sized by `config`.
    pub fn with_config(config: Config) -> Connection<'static> {
        Connection::new(
            config,
            vec![0; config.recv_capacity],
            vec![0; config.send_capacity],
        )
    }

    /// Start the three-way handshake by sending a SYN.
    ///
    /// This function returns an error if the connection already sent
    /// anything, or is no longer active.
    pub fn connect(&mut self) -> Result<(), ConnectError> {
        if !self.active || self.sender.next_seqno_absolute() != 0 {
            return Err(ConnectError::InvalidState);
        }

        self.sender.fill_window();
        self.flush();
        self.update_state();
        Ok(())
    }

    /// Write as much of `data` into the outbound stream as fits, and send
    /// what the peer's window allows. Returns the number of bytes accepted.
    ///
    /// This function returns an error if the outbound stream was ended, or
    /// if the connection is no longer usable.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, SendError> {
        let stream = self.sender.stream_in();
        if !self.active || stream.input_ended() || stream.error() {
            return Err(SendError::InvalidState);
        }

        let written = self.sender.stream_in_mut().write(data);
        // Data written before connecting waits for the handshake.
        if self.sender.next_seqno_absolute() != 0 {
            self.sender.fill_window();
            self.flush();
        }
        self.update_state();
        Ok(written)
    }

    /// Shut down the outbound stream. A FIN follows the data still buffered.
    pub fn end_input_stream(&mut self) {
        self.sender.stream_in_mut().end_input();
        if self.active && self.sender.next_seqno_absolute() != 0 {
            self.sender.fill_window();
            self.flush();
            self.test_end();
        }
        self.update_state();
    }

    /// Process a segment from the peer.
    pub fn segment_received(&mut self, segment: &TcpSegment) {
        if !self.active {
            return;
        }

        let header = &segment.header;
        let listening =
            self.receiver.ackno().is_none() && self.sender.next_seqno_absolute() == 0;
        if listening && !header.syn() {
            net_debug!("listening, ignoring {}", segment);
            return;
        }

        if header.rst() {
            net_debug!("received RST");
            self.sender.stream_in_mut().set_error();
            self.receiver.stream_out_mut().set_error();
            self.sender.segments_out().clear();
            self.segments_out.clear();
            self.active = false;
            self.update_state();
            return;
        }

        self.time_since_last_segment_received = Duration::ZERO;
        self.receiver.segment_received(segment);

        if header.syn() && self.sender.next_seqno_absolute() == 0 {
            // Passive open: answer with our own SYN.
            self.sender.fill_window();
        }
        if header.ack() {
            self.established = true;
            self.sender.ack_received(header.ackno, header.window);
            // A window update may let queued data out.
            if self.sender.next_seqno_absolute() != 0 {
                self.sender.fill_window();
            }
        }

        let keep_alive = match self.receiver.ackno() {
            Some(ackno) => segment.length_in_sequence_space() == 0 && header.seqno + 1 == ackno,
            None => false,
        };
        if (segment.length_in_sequence_space() > 0 || keep_alive)
            && self.sender.segments_out().is_empty()
            && self.receiver.ackno().is_some()
        {
            self.sender.send_empty_segment();
        }

        self.flush();
        self.test_end();
        self.update_state();
    }

    /// Let `delta` of time pass.
    ///
    /// Expired segments are retransmitted; once the retransmission limit is
    /// exceeded the connection is aborted.
    pub fn tick(&mut self, delta: Duration) {
        if !self.active {
            return;
        }

        self.time_since_last_segment_received += delta;
        self.sender.tick(delta);
        if self.sender.consecutive_retransmissions() > self.max_retx_attempts {
            net_warn!(
                "giving up after {} retransmissions",
                self.sender.consecutive_retransmissions()
            );
            self.abort();
            return;
        }

        self.flush();
        self.test_end();
        self.update_state();
    }

    /// Tear the connection down at once: both streams fail, and a single RST
    /// is queued for the peer.
    pub fn abort(&mut self) {
        if !self.active {
            return;
        }

        self.sender.stream_in_mut().set_error();
        self.receiver.stream_out_mut().set_error();
        self.sender.send_reset();
        self.flush();
        self.active = false;
        self.update_state();
    }

    /// Move the sender's segments to the outbound queue, stamped with the
    /// acknowledgement number and window of the inbound half.
    fn flush(&mut self) {
        let ackno = self.receiver.ackno();
        let window = cmp::min(self.receiver.window_size(), u16::MAX as usize) as u16;
        while let Some(mut segment) = self.sender.segments_out().pop_front() {
            if let Some(ackno) = ackno {
                segment.header.flags |= TcpFlags::ACK;
                segment.header.ackno = ackno;
            }
            segment.header.window = window;
            tcp_trace!("sending {}", segment);
            self.segments_out.push_back(segment);
        }
    }

    fn test_end(&mut self) {
        let stream_in = self.sender.stream_in();
        let inbound_ended =
            self.receiver.unassembled_bytes() == 0 && self.receiver.stream_out().input_ended();
        let outbound_ended = stream_in.eof()
            && self.sender.next_seqno_absolute() == stream_in.bytes_written() + 2
            && self.sender.bytes_in_flight() == 0;

        if inbound_ended && !stream_in.eof() {
            // The peer finished first; it does the waiting.
            self.linger_after_streams_finish = false;
        }

        if inbound_ended && outbound_ended {
            if !self.linger_after_streams_finish {
                self.active = false;
            } else if self.time_since_last_segment_received >= self.rt_timeout * 10 {
                tcp_trace!("linger period over");
                self.active = false;
            }
        }
    }

    fn update_state(&mut self) {
        let state = self.state();
        if state != self.last_state {
            net_debug!("state={}=>{}", self.last_state, state);
            self.last_state = state;
        }
    }

    /// Return the connection state, derived from both halves.
    pub fn state(&self) -> State {
        let linger = self.linger_after_streams_finish;
        match (self.sender.state(), self.receiver.state()) {
            (SenderState::Error, _) | (_, ReceiverState::Error) => State::Reset,
            _ if !self.active => State::Closed,
            (SenderState::Closed, _) => State::Listen,
            (_, ReceiverState::Listen) => State::SynSent,
            (SenderState::SynSent, _) => State::SynReceived,
            (SenderState::SynAcked, ReceiverState::SynReceived) => State::Established,
            (SenderState::SynAcked, ReceiverState::FinReceived) => State::CloseWait,
            (SenderState::FinSent, ReceiverState::SynReceived) => State::FinWait1,
            (SenderState::FinAcked, ReceiverState::SynReceived) => State::FinWait2,
            (SenderState::FinSent, ReceiverState::FinReceived) if linger => State::Closing,
            (SenderState::FinSent, ReceiverState::FinReceived) => State::LastAck,
            (SenderState::FinAcked, ReceiverState::FinReceived) => State::TimeWait,
        }
    }

    /// Query whether the connection is still alive.
    ///
    /// A connection becomes inactive after a clean shutdown, a reset, or an
    /// abort; it then ignores all input.
    pub fn active(&self) -> bool {
        self.active
    }

    /// Query whether the peer has acknowledged anything.
    pub fn established(&self) -> bool {
        self.established
    }

    /// Return the number of bytes that can still be written.
    pub fn remaining_outbound_capacity(&self) -> usize {
        self.sender.stream_in().remaining_capacity()
    }

    pub fn bytes_in_flight(&self) -> u64 {
        self.sender.bytes_in_flight()
    }

    pub fn unassembled_bytes(&self) -> usize {
        self.receiver.unassembled_bytes()
    }

    pub fn consecutive_retransmissions(&self) -> u32 {
        self.sender.consecutive_retransmissions()
    }

    pub fn time_since_last_segment_received(&self) -> Duration {
        self.time_since_last_segment_received
    }

    /// Return the stream of bytes received from the peer.
    pub fn inbound_stream(&self) -> &ByteStream<'a> {
        self.receiver.stream_out()
    }

    /// Return the stream of bytes written for the peer.
    pub fn outbound_stream(&self) -> &ByteStream<'a> {
        self.sender.stream_in()
    }

    /// Read received bytes into `data`, and return how many were read.
    pub fn read_slice(&mut self, data: &mut [u8]) -> usize {
        self.receiver.stream_out_mut().read_slice(data)
    }

    /// Segments ready for the wire, oldest first.
    pub fn segments_out(&mut self) -> &mut VecDeque<TcpSegment> {
        &mut self.segments_out
    }

    /// Pass queued segments to `emit`, oldest first.
    ///
    /// If `emit` fails, the segment stays queued and the error is returned.
    pub fn dispatch<F, E>(&mut self, mut emit: F) -> Result<(), E>
    where
        F: FnMut(&TcpSegment) -> Result<(), E>,
    {
        while let Some(segment) = self.segments_out.front() {
            emit(segment)?;
            self.segments_out.pop_front();
        }
        Ok(())
    }
}

impl Default for Connection<'static> {
    fn default() -> Self {
        Connection::with_config(Config::default())
    }
}

impl Connection<'_> {
    /// Reset a connection that is being discarded while still active.
    fn shutdown_unclean(&mut self) {
        if self.active {
            net_warn!("unclean shutdown of TCP connection");
            self.abort();
        }
    }
}

impl Drop for Connection<'_> {
    fn drop(&mut self) {
        self.shutdown_unclean();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::TcpHeader;
    use std::vec::Vec;

    const ISN: TcpSeqNumber = TcpSeqNumber(10_000);
    const PEER_ISN: TcpSeqNumber = TcpSeqNumber(50_000);
    const PEER_WINDOW: u16 = 4000;
    const RTO: Duration = Duration::from_millis(1000);

    fn config() -> Config {
        Config {
            fixed_isn: Some(ISN),
            rt_timeout: RTO,
            ..Config::default()
        }
    }

    fn segment(
        seqno: TcpSeqNumber,
        ackno: Option<TcpSeqNumber>,
        flags: TcpFlags,
        payload: &[u8],
    ) -> TcpSegment {
        let mut header = TcpHeader {
            seqno,
            flags,
            window: PEER_WINDOW,
            ..TcpHeader::default()
        };
        if let Some(ackno) = ackno {
            header.flags |= TcpFlags::ACK;
            header.ackno = ackno;
        }
        TcpSegment::new(header, payload)
    }

    fn pop(c: &mut Connection) -> TcpSegment {
        c.segments_out().pop_front().expect("no segment")
    }

    fn assert_ack(segment: &TcpSegment, seqno: TcpSeqNumber, ackno: TcpSeqNumber) {
        assert_eq!(segment.header.flags, TcpFlags::ACK);
        assert!(segment.payload.is_empty());
        assert_eq!(segment.header.seqno, seqno);
        assert_eq!(segment.header.ackno, ackno);
    }

    /// A connection that completed an active open.
    fn established(config: Config) -> Connection<'static> {
        let mut c = Connection::with_config(config);
        c.connect().unwrap();
        pop(&mut c);
        c.segment_received(&segment(
            PEER_ISN,
            Some(ISN + 1),
            TcpFlags::SYN,
            b"",
        ));
        pop(&mut c);
        assert_eq!(c.state(), State::Established);
        c
    }

    #[test]
    fn test_connect_sends_syn() {
        let mut c = Connection::with_config(config());
        assert_eq!(c.state(), State::Listen);
        assert_eq!(c.connect(), Ok(()));
        assert_eq!(c.segments_out().len(), 1);

        let syn = pop(&mut c);
        assert_eq!(syn.header.flags, TcpFlags::SYN);
        assert_eq!(syn.header.seqno, ISN);
        assert!(syn.payload.is_empty());
        assert_eq!(syn.header.window, 64000);
        assert_eq!(c.state(), State::SynSent);
        assert_eq!(c.bytes_in_flight(), 1);
    }

    #[test]
    fn test_connect_twice() {
        let mut c = Connection::with_config(config());
        c.connect().unwrap();
        assert_eq!(c.connect(), Err(ConnectError::InvalidState));
    }

    #[test]
    fn test_random_isn_follows_seed() {
        let config = Config {
            random_seed: 42,
            ..Config::default()
        };
        let mut a = Connection::with_config(config);
        let mut b = Connection::with_config(config);
        a.connect().unwrap();
        b.connect().unwrap();
        assert_eq!(pop(&mut a).header.seqno, pop(&mut b).header.seqno);
    }

    #[test]
    fn test_active_open() {
        let mut c = Connection::with_config(config());
        c.connect().unwrap();
        pop(&mut c);
        assert!(!c.established());

        c.segment_received(&segment(
            PEER_ISN,
            Some(ISN + 1),
            TcpFlags::SYN,
            b"",
        ));
        assert!(c.established());
        assert_eq!(c.segments_out().len(), 1);
        let ack = pop(&mut c);
        assert_ack(&ack, ISN + 1, PEER_ISN + 1);
        assert_eq!(ack.header.window, 64000);
        assert_eq!(c.state(), State::Established);
        assert_eq!(c.bytes_in_flight(), 0);
    }

    #[test]
    fn test_passive_open() {
        let mut c = Connection::with_config(config());
        c.segment_received(&segment(PEER_ISN, None, TcpFlags::SYN, b""));
        let syn_ack = pop(&mut c);
        assert_eq!(syn_ack.header.flags, TcpFlags::SYN | TcpFlags::ACK);
        assert_eq!(syn_ack.header.seqno, ISN);
        assert_eq!(syn_ack.header.ackno, PEER_ISN + 1);
        assert!(c.segments_out().is_empty());
        assert_eq!(c.state(), State::SynReceived);

        c.segment_received(&segment(
            PEER_ISN + 1,
            Some(ISN + 1),
            TcpFlags::empty(),
            b"",
        ));
        assert!(c.segments_out().is_empty());
        assert_eq!(c.state(), State::Established);
    }

    #[test]
    fn test_listen_ignores_non_syn() {
        let mut c = Connection::with_config(config());
        c.segment_received(&segment(PEER_ISN, Some(ISN), TcpFlags::empty(), b"data"));
        c.segment_received(&segment(PEER_ISN, None, TcpFlags::RST, b""));
        c.segment_received(&segment(PEER_ISN, None, TcpFlags::FIN, b""));
        assert!(c.segments_out().is_empty());
        assert!(c.active());
        assert_eq!(c.state(), State::Listen);
    }

    #[test]
    fn test_write_splits_into_segments() {
        let mut c = established(Config {
            max_payload_size: 500,
            ..config()
        });
        assert_eq!(c.write(&[0x42; 1000]), Ok(1000));
        assert_eq!(c.segments_out().len(), 2);

        let first = pop(&mut c);
        let second = pop(&mut c);
        assert_eq!(first.header.seqno, ISN + 1);
        assert_eq!(second.header.seqno, ISN + 501);
        assert_eq!(first.payload.len() + second.payload.len(), 1000);
        assert!(first.header.ack() && second.header.ack());
        assert_eq!(c.bytes_in_flight(), 1000);

        c.segment_received(&segment(
            PEER_ISN + 1,
            Some(ISN + 1001),
            TcpFlags::empty(),
            b"",
        ));
        assert_eq!(c.bytes_in_flight(), 0);
        assert!(c.segments_out().is_empty());
    }

    #[test]
    fn test_write_limited_by_capacity() {
        let mut c = established(Config {
            send_capacity: 10,
            ..config()
        });
        assert_eq!(c.write(b"0123456789abc"), Ok(10));
        // Segmented at once, so the stream has room again.
        assert_eq!(c.remaining_outbound_capacity(), 10);
        assert_eq!(pop(&mut c).payload.len(), 10);
    }

    #[test]
    fn test_write_empty_sends_nothing() {
        let mut c = Connection::with_config(config());
        assert_eq!(c.write(b""), Ok(0));
        assert!(c.segments_out().is_empty());
        assert_eq!(c.state(), State::Listen);

        let mut c = established(config());
        assert_eq!(c.write(b""), Ok(0));
        assert!(c.segments_out().is_empty());
    }

    #[test]
    fn test_write_before_connect_waits() {
        let mut c = Connection::with_config(config());
        assert_eq!(c.write(b"early"), Ok(5));
        assert!(c.segments_out().is_empty());

        c.connect().unwrap();
        pop(&mut c);
        c.segment_received(&segment(
            PEER_ISN,
            Some(ISN + 1),
            TcpFlags::SYN,
            b"",
        ));
        let data = pop(&mut c);
        assert_eq!(&data.payload[..], b"early");
        assert_eq!(data.header.seqno, ISN + 1);
        assert!(c.segments_out().is_empty());
    }

    #[test]
    fn test_write_after_end() {
        let mut c = established(config());
        c.end_input_stream();
        assert_eq!(c.write(b"late"), Err(SendError::InvalidState));
    }

    #[test]
    fn test_receive_data() {
        let mut c = established(config());
        c.segment_received(&segment(
            PEER_ISN + 1,
            Some(ISN + 1),
            TcpFlags::empty(),
            b"hello",
        ));
        let ack = pop(&mut c);
        assert_ack(&ack, ISN + 1, PEER_ISN + 6);
        assert_eq!(ack.header.window, 64000 - 5);

        let mut buf = [0; 16];
        assert_eq!(c.read_slice(&mut buf), 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(c.inbound_stream().bytes_read(), 5);
    }

    #[test]
    fn test_out_of_order_data_is_acked() {
        let mut c = established(config());
        c.segment_received(&segment(
            PEER_ISN + 4,
            Some(ISN + 1),
            TcpFlags::empty(),
            b"lo",
        ));
        assert_ack(&pop(&mut c), ISN + 1, PEER_ISN + 1);
        assert_eq!(c.unassembled_bytes(), 2);

        c.segment_received(&segment(
            PEER_ISN + 1,
            Some(ISN + 1),
            TcpFlags::empty(),
            b"hel",
        ));
        assert_ack(&pop(&mut c), ISN + 1, PEER_ISN + 6);
        assert_eq!(c.unassembled_bytes(), 0);
    }

    #[test]
    fn test_window_saturates() {
        let mut c = Connection::with_config(Config {
            recv_capacity: 100_000,
            ..config()
        });
        c.connect().unwrap();
        assert_eq!(pop(&mut c).header.window, u16::MAX);
    }

    #[test]
    fn test_syn_retransmission() {
        let mut c = Connection::with_config(config());
        c.connect().unwrap();
        pop(&mut c);

        c.tick(RTO - Duration::from_millis(1));
        assert!(c.segments_out().is_empty());
        c.tick(Duration::from_millis(1));
        let syn = pop(&mut c);
        assert!(syn.header.syn());
        assert_eq!(syn.header.seqno, ISN);
        assert_eq!(c.consecutive_retransmissions(), 1);
    }

    #[test]
    fn test_data_retransmission() {
        let mut c = established(config());
        c.write(b"abc").unwrap();
        pop(&mut c);

        c.tick(RTO);
        let retransmitted = pop(&mut c);
        assert_eq!(&retransmitted.payload[..], b"abc");
        assert_eq!(retransmitted.header.ackno, PEER_ISN + 1);

        c.segment_received(&segment(
            PEER_ISN + 1,
            Some(ISN + 4),
            TcpFlags::empty(),
            b"",
        ));
        assert_eq!(c.consecutive_retransmissions(), 0);
        c.tick(RTO * 10);
        assert!(c.segments_out().is_empty());
    }

    #[test]
    fn test_abort_after_max_retransmissions() {
        let mut c = Connection::with_config(Config {
            max_retx_attempts: 2,
            ..config()
        });
        c.connect().unwrap();
        pop(&mut c);

        c.tick(RTO);
        assert!(pop(&mut c).header.syn());
        c.tick(RTO * 2);
        assert!(pop(&mut c).header.syn());
        assert!(c.active());

        c.tick(RTO * 4);
        assert!(!c.active());
        assert_eq!(c.segments_out().len(), 1);
        let rst = pop(&mut c);
        assert!(rst.header.rst());
        assert_eq!(rst.header.seqno, ISN + 1);
        assert!(c.inbound_stream().error());
        assert!(c.outbound_stream().error());
        assert_eq!(c.state(), State::Reset);
    }

    #[test]
    fn test_rst_received() {
        let mut c = established(config());
        c.write(b"pending").unwrap();
        c.segment_received(&segment(PEER_ISN + 1, None, TcpFlags::RST, b""));
        assert!(!c.active());
        assert!(c.segments_out().is_empty());
        assert!(c.inbound_stream().error());
        assert!(c.outbound_stream().error());
        assert_eq!(c.state(), State::Reset);

        // Nothing happens afterwards.
        c.tick(RTO * 10);
        c.segment_received(&segment(PEER_ISN + 1, None, TcpFlags::empty(), b"x"));
        assert!(c.segments_out().is_empty());
        assert_eq!(c.write(b"x"), Err(SendError::InvalidState));
    }

    #[test]
    fn test_abort() {
        let mut c = established(config());
        c.abort();
        let rst = pop(&mut c);
        assert_eq!(rst.header.flags, TcpFlags::RST | TcpFlags::ACK);
        assert_eq!(rst.header.ackno, PEER_ISN + 1);
        assert!(!c.active());

        c.abort();
        assert!(c.segments_out().is_empty());
    }

    #[test]
    fn test_unclean_shutdown_of_inactive_connection() {
        let mut c = established(config());
        c.segment_received(&segment(PEER_ISN + 1, None, TcpFlags::RST, b""));
        assert!(!c.active());

        c.shutdown_unclean();
        assert!(c.segments_out().is_empty());
        assert_eq!(c.state(), State::Reset);
        drop(c);
    }

    #[test]
    fn test_unclean_shutdown_resets_like_abort() {
        let mut aborted = established(config());
        let mut discarded = established(config());
        for c in [&mut aborted, &mut discarded] {
            c.write(b"unsent").unwrap();
            c.segments_out().clear();
        }

        aborted.abort();
        discarded.shutdown_unclean();
        assert!(!discarded.active());
        assert_eq!(discarded.state(), State::Reset);
        assert!(discarded.inbound_stream().error());
        assert!(discarded.outbound_stream().error());
        let rst: Vec<_> = discarded.segments_out().drain(..).collect();
        assert_eq!(rst.len(), 1);
        assert!(rst[0].header.flags.contains(TcpFlags::RST));
        assert_eq!(rst, aborted.segments_out().drain(..).collect::<Vec<_>>());
    }

    #[test]
    fn test_keep_alive() {
        let mut c = established(config());
        c.segment_received(&segment(PEER_ISN, Some(ISN + 1), TcpFlags::empty(), b""));
        assert_ack(&pop(&mut c), ISN + 1, PEER_ISN + 1);

        // An ordinary bare acknowledgement gets no answer.
        c.segment_received(&segment(
            PEER_ISN + 1,
            Some(ISN + 1),
            TcpFlags::empty(),
            b"",
        ));
        assert!(c.segments_out().is_empty());
    }

    #[test]
    fn test_active_close_lingers() {
        let mut c = established(config());
        c.end_input_stream();
        let fin = pop(&mut c);
        assert!(fin.header.fin());
        assert_eq!(fin.header.seqno, ISN + 1);
        assert_eq!(c.state(), State::FinWait1);

        c.segment_received(&segment(
            PEER_ISN + 1,
            Some(ISN + 2),
            TcpFlags::empty(),
            b"",
        ));
        assert!(c.segments_out().is_empty());
        assert_eq!(c.state(), State::FinWait2);

        c.segment_received(&segment(PEER_ISN + 1, Some(ISN + 2), TcpFlags::FIN, b""));
        assert_ack(&pop(&mut c), ISN + 2, PEER_ISN + 2);
        assert_eq!(c.state(), State::TimeWait);
        assert!(c.active());

        c.tick(RTO * 10 - Duration::from_millis(1));
        assert!(c.active());
        c.tick(Duration::from_millis(1));
        assert!(!c.active());
        assert_eq!(c.state(), State::Closed);
        assert!(c.segments_out().is_empty());
    }

    #[test]
    fn test_passive_close() {
        let mut c = established(config());
        c.segment_received(&segment(PEER_ISN + 1, Some(ISN + 1), TcpFlags::FIN, b""));
        assert_ack(&pop(&mut c), ISN + 1, PEER_ISN + 2);
        assert_eq!(c.state(), State::CloseWait);
        assert!(c.inbound_stream().eof());

        c.end_input_stream();
        let fin = pop(&mut c);
        assert!(fin.header.fin());
        assert_eq!(c.state(), State::LastAck);

        c.segment_received(&segment(
            PEER_ISN + 2,
            Some(ISN + 2),
            TcpFlags::empty(),
            b"",
        ));
        assert!(!c.active());
        assert_eq!(c.state(), State::Closed);
    }

    #[test]
    fn test_simultaneous_close() {
        let mut c = established(config());
        c.end_input_stream();
        pop(&mut c);

        // The peer's FIN crosses ours.
        c.segment_received(&segment(PEER_ISN + 1, Some(ISN + 1), TcpFlags::FIN, b""));
        assert_ack(&pop(&mut c), ISN + 2, PEER_ISN + 2);
        assert_eq!(c.state(), State::Closing);

        c.segment_received(&segment(
            PEER_ISN + 2,
            Some(ISN + 2),
            TcpFlags::empty(),
            b"",
        ));
        assert_eq!(c.state(), State::TimeWait);
    }

    #[test]
    fn test_dispatch() {
        let mut c = established(config());
        c.write(b"ab").unwrap();
        c.write(b"cd").unwrap();

        assert_eq!(c.dispatch(|_| Err(())), Err(()));
        assert_eq!(c.segments_out().len(), 2);

        let mut sent = Vec::new();
        c.dispatch(|segment| {
            sent.push(segment.clone());
            Ok::<(), ()>(())
        })
        .unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(&sent[0].payload[..], b"ab");
        assert_eq!(&sent[1].payload[..], b"cd");
        assert!(c.segments_out().is_empty());
    }

    #[test]
    fn test_borrowed_buffers() {
        let mut rx = [0u8; 64];
        let mut tx = [0u8; 64];
        let mut c = Connection::new(config(), &mut rx[..], &mut tx[..]);
        c.connect().unwrap();
        assert_eq!(pop(&mut c).header.window, 64);
        assert_eq!(c.remaining_outbound_capacity(), 64);
        c.abort();
    }

    #[test]
    fn test_state_display() {
        assert_eq!(std::format!("{}", State::FinWait1), "FIN-WAIT-1");
        assert_eq!(std::format!("{}", State::Reset), "RESET");
    }
}
